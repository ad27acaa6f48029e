use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImgbinError;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ImgbinError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                parse_id(value).map(Self)
            }
        }
    };
}

record_id!(
    /// Identifier of a stored image.
    ImageId
);
record_id!(
    /// Identifier of the pixel set backing an image; names the files under `Pixels/`.
    PixelsId
);
record_id!(
    /// Identifier of an original (archived or imported) file; names the files under `Files/`.
    FileId
);
record_id!(ThumbnailId);
record_id!(FilesetId);
record_id!(UserId);
record_id!(GroupId);

fn parse_id(value: &str) -> Result<u64, ImgbinError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ImgbinError::InvalidId(value.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| ImgbinError::InvalidId(value.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn is_little_endian(self) -> bool {
        matches!(self, ByteOrder::Little)
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Big => write!(f, "big"),
            ByteOrder::Little => write!(f, "little"),
        }
    }
}

/// Mutating operations on image binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Pixels,
    Pyramid,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Pixels => write!(f, "pixels"),
            Operation::Pyramid => write!(f, "pyramid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPermissions {
    #[default]
    Private,
    ReadOnly,
    ReadAnnotate,
    ReadWrite,
}
