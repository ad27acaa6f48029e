use std::time::{Duration, Instant};

use crate::catalog::RecordStore;
use crate::error::Cancel;
use crate::policy::DeletePolicy;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Collaborators shared by every step of a request. Owned by the caller.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a Store,
    pub records: &'a dyn RecordStore,
    pub policy: &'a dyn DeletePolicy,
    pub sink: &'a dyn ProgressSink,
}

impl Context<'_> {
    pub fn report(&self, message: impl Into<String>) {
        self.sink.event(ProgressEvent {
            message: message.into(),
            elapsed: None,
        });
    }
}

/// A fixed-length sequence of steps producing one response.
///
/// Steps are only ever invoked through a [`Driver`], which guarantees they
/// run once each, in increasing index order, and never after a cancellation.
pub trait Request {
    type Response;

    fn name(&self) -> &'static str;
    fn step_count(&self) -> usize;
    fn step_name(&self, index: usize) -> &'static str;
    fn step(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel>;
    fn response(self) -> Self::Response;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Ready { next: usize },
    Cancelled { at: usize },
}

pub struct Driver<R: Request> {
    request: R,
    state: DriverState,
}

impl<R: Request> Driver<R> {
    pub fn new(request: R) -> Self {
        Self {
            request,
            state: DriverState::Ready { next: 0 },
        }
    }

    pub fn step_count(&self) -> usize {
        self.request.step_count()
    }

    pub fn step(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel> {
        let count = self.request.step_count();
        if index >= count {
            return Err(Cancel::UnknownStep { index, count });
        }
        let expected = match self.state {
            DriverState::Ready { next } => next,
            DriverState::Cancelled { at } => at,
        };
        if index != expected || matches!(self.state, DriverState::Cancelled { .. }) {
            return Err(Cancel::BadStep { index, expected });
        }

        let phase = self.request.step_name(index);
        let start = Instant::now();
        ctx.report(format!("phase={phase}; {} step {}/{count}", self.request.name(), index + 1));
        match self.request.step(ctx, index) {
            Ok(()) => {
                self.state = DriverState::Ready { next: index + 1 };
                ctx.sink.event(ProgressEvent {
                    message: format!("phase={phase}; done"),
                    elapsed: Some(start.elapsed()),
                });
                Ok(())
            }
            Err(cancel) => {
                tracing::debug!(
                    request = self.request.name(),
                    phase,
                    code = %cancel.reason_code(),
                    "request cancelled"
                );
                self.state = DriverState::Cancelled { at: index };
                Err(cancel)
            }
        }
    }

    /// Runs every remaining step and returns the response, stopping at the
    /// first cancellation.
    pub fn run(mut self, ctx: &Context<'_>) -> Result<R::Response, Cancel> {
        let count = self.request.step_count();
        let DriverState::Ready { next } = self.state else {
            return Err(Cancel::BadStep {
                index: count,
                expected: count,
            });
        };
        for index in next..count {
            self.step(ctx, index)?;
        }
        Ok(self.request.response())
    }
}
