use std::io;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{ImageId, Operation};

#[derive(Debug, Error, Diagnostic)]
pub enum ImgbinError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid timestamp (expected RFC 3339): {0}")]
    InvalidTimestamp(String),

    #[error("missing config file imgbin.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid scan options: {0}")]
    InvalidScanOptions(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cancelled(#[from] Cancel),
}

/// Failures raised by a record store.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("failed to read catalog {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("catalog is inconsistent: {0}")]
    Inconsistent(String),
}

/// Terminal failure of a multi-step request.
///
/// Every variant maps to a stable reason code (see [`Cancel::reason_code`]) that
/// callers match on; the display text is for humans only.
#[derive(Debug, Error, Diagnostic)]
pub enum Cancel {
    #[error("image {0} does not exist")]
    NoImage(ImageId),

    #[error("record lookup failed for image {image}")]
    LookupFailed {
        image: ImageId,
        #[source]
        source: StoreError,
    },

    #[error("failed to load fileset for image {image}")]
    FilesetLoad {
        image: ImageId,
        #[source]
        source: StoreError,
    },

    #[error("{0} operation requires a fileset")]
    RequiresFileset(Operation),

    #[error("current user may not delete {op} binaries of image {image}")]
    DeleteDisallowed { op: Operation, image: ImageId },

    #[error("{op} file could not be changed: {path}")]
    DeleteFalse { op: Operation, path: Utf8PathBuf },

    #[error("failed to read original metadata from {path}")]
    ReaderFailure {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("step {index} is outside of the {count} declared steps")]
    UnknownStep { index: usize, count: usize },

    #[error("step {index} invoked out of order (expected {expected})")]
    BadStep { index: usize, expected: usize },
}

impl Cancel {
    pub fn reason_code(&self) -> String {
        match self {
            Cancel::NoImage(_) | Cancel::LookupFailed { .. } => "no-image".to_string(),
            Cancel::FilesetLoad { .. } => "fileset-load-err".to_string(),
            Cancel::RequiresFileset(op) => format!("{op}-requires-fileset"),
            Cancel::DeleteDisallowed { op, .. } => format!("{op}-delete-disallowed"),
            Cancel::DeleteFalse { op, .. } => format!("{op}-delete-false"),
            Cancel::ReaderFailure { .. } => "bf-reader-failure".to_string(),
            Cancel::UnknownStep { .. } => "unknown-step".to_string(),
            Cancel::BadStep { .. } => "bad-step".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_carry_operation_prefix() {
        assert_eq!(
            Cancel::RequiresFileset(Operation::Pixels).reason_code(),
            "pixels-requires-fileset"
        );
        let err = Cancel::DeleteDisallowed {
            op: Operation::Pyramid,
            image: ImageId::new(3),
        };
        assert_eq!(err.reason_code(), "pyramid-delete-disallowed");
        assert_eq!(Cancel::NoImage(ImageId::new(1)).reason_code(), "no-image");
    }
}
