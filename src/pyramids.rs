use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ImageId, PixelsId};
use crate::error::{Cancel, ImgbinError};
use crate::pixels::PixelBufferFactory;
use crate::request::{Context, Request};
use crate::store::PYRAMID_SUFFIX;

const LOCK_MARKER_SUFFIXES: [&str; 2] = [".tmp", ".pyr_lock"];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub suffix: String,
    pub limit: usize,
    pub check_empty_file: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            suffix: PYRAMID_SUFFIX.to_string(),
            limit: 500,
            check_empty_file: true,
        }
    }
}

impl ScanOptions {
    /// An empty suffix matches raw pixel files and backups as well.
    pub fn validate(&self) -> Result<(), ImgbinError> {
        if self.suffix.is_empty() {
            return Err(ImgbinError::InvalidScanOptions(
                "pyramid suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome<T> {
    pub found: Vec<T>,
    /// Candidates whose name did not parse or which the resolver rejected.
    pub skipped: usize,
    /// Empty candidates with a lock marker next to them.
    pub in_progress: usize,
}

impl<T> Default for ScanOutcome<T> {
    fn default() -> Self {
        Self {
            found: Vec::new(),
            skipped: 0,
            in_progress: 0,
        }
    }
}

/// Depth-first walk collecting files named `<number><suffix>`.
pub struct PyramidScanner<'a> {
    options: &'a ScanOptions,
}

impl<'a> PyramidScanner<'a> {
    pub fn new(options: &'a ScanOptions) -> Self {
        Self { options }
    }

    /// Walks `root` and hands the numeric prefix of every candidate to
    /// `resolve`. Unreadable directories contribute nothing. The result never
    /// holds more than `limit` entries. Options that fail
    /// [`ScanOptions::validate`] yield an empty outcome.
    pub fn scan<T, F>(&self, root: &Utf8Path, mut resolve: F) -> ScanOutcome<T>
    where
        F: FnMut(u64) -> Option<T>,
    {
        let mut outcome = ScanOutcome::default();
        if let Err(err) = self.options.validate() {
            tracing::warn!(error = %err, "pyramid scan not started");
            return outcome;
        }
        if self.options.limit > 0 {
            self.walk(root, &mut resolve, &mut outcome);
        }
        outcome
    }

    fn walk<T, F>(&self, dir: &Utf8Path, resolve: &mut F, outcome: &mut ScanOutcome<T>)
    where
        F: FnMut(u64) -> Option<T>,
    {
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(%dir, error = %err, "skipping unreadable directory");
                return;
            }
        };

        for entry in entries.flatten() {
            if outcome.found.len() >= self.options.limit {
                return;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                self.walk(&path, resolve, outcome);
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            if !name.ends_with(&self.options.suffix) {
                continue;
            }
            let Ok(meta) = fs::metadata(path.as_std_path()) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            if self.options.check_empty_file && meta.len() == 0 && has_lock_marker(dir, name) {
                tracing::debug!(%path, "pyramid still being written");
                outcome.in_progress += 1;
                continue;
            }
            match numeric_prefix(name).and_then(&mut *resolve) {
                Some(value) => outcome.found.push(value),
                None => {
                    tracing::debug!(%path, "pyramid candidate not resolved");
                    outcome.skipped += 1;
                }
            }
        }
    }
}

fn has_lock_marker(dir: &Utf8Path, name: &str) -> bool {
    LOCK_MARKER_SUFFIXES
        .iter()
        .any(|suffix| dir.join(format!(".{name}{suffix}")).as_std_path().exists())
}

fn numeric_prefix(name: &str) -> Option<u64> {
    name.split('_').next()?.parse().ok()
}

/// Lists images whose pixels have a pyramid on disk.
#[derive(Debug, Clone, Default)]
pub struct FindPyramids {
    pub scan: ScanOptions,
    pub little_endian: Option<bool>,
    pub imported_after: Option<DateTime<Utc>>,
    response: FindPyramidsResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FindPyramidsResponse {
    pub pyramid_files: Vec<ImageId>,
    pub skipped: usize,
    pub in_progress: usize,
}

impl FindPyramids {
    pub fn new(
        scan: ScanOptions,
        little_endian: Option<bool>,
        imported_after: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            scan,
            little_endian,
            imported_after,
            response: FindPyramidsResponse::default(),
        }
    }

    fn accept(&self, ctx: &Context<'_>, pixels: PixelsId) -> Option<ImageId> {
        let record = match ctx.records.pixels(pixels) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(%pixels, error = %err, "pixels lookup failed");
                return None;
            }
        };
        if let Some(after) = self.imported_after {
            if record.imported_at <= after {
                return None;
            }
        }
        if let Some(little_endian) = self.little_endian {
            let buffer = match PixelBufferFactory::open(ctx.store, pixels) {
                Ok(buffer) => buffer,
                Err(err) => {
                    tracing::debug!(%pixels, error = %err, "cannot open pixel buffer");
                    return None;
                }
            };
            if buffer.byte_order().is_little_endian() != little_endian {
                return None;
            }
        }
        Some(record.image)
    }
}

impl Request for FindPyramids {
    type Response = FindPyramidsResponse;

    fn name(&self) -> &'static str {
        "find-pyramids"
    }

    fn step_count(&self) -> usize {
        1
    }

    fn step_name(&self, _index: usize) -> &'static str {
        "Scan"
    }

    fn step(&mut self, ctx: &Context<'_>, _index: usize) -> Result<(), Cancel> {
        let root = ctx.store.pixels_dir();
        ctx.report(format!("scanning {root}"));
        let outcome = PyramidScanner::new(&self.scan)
            .scan(&root, |prefix| self.accept(ctx, PixelsId::new(prefix)));
        tracing::info!(
            found = outcome.found.len(),
            skipped = outcome.skipped,
            in_progress = outcome.in_progress,
            "pyramid scan finished"
        );
        self.response = FindPyramidsResponse {
            pyramid_files: outcome.found,
            skipped: outcome.skipped,
            in_progress: outcome.in_progress,
        };
        Ok(())
    }

    fn response(self) -> FindPyramidsResponse {
        self.response
    }
}
