use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;

use crate::domain::{FileId, PixelsId, ThumbnailId};
use crate::error::ImgbinError;

pub const PYRAMID_SUFFIX: &str = "_pyramid";
pub const BACKUP_SUFFIX: &str = "_bak";

/// Path resolution for the binary repository.
///
/// Binaries live under `Pixels/`, `Thumbnails/` and `Files/`, each spread over
/// `Dir-NNN` subdirectories so that no directory holds more than a thousand
/// entries.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, ImgbinError> {
        if let Ok(dir) = std::env::var("IMGBIN_DATA_DIR") {
            if !dir.trim().is_empty() {
                return Ok(Self::new_with_root(Utf8PathBuf::from(dir.trim())));
            }
        }
        Ok(Self::new_with_root(default_data_dir()?))
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn pixels_dir(&self) -> Utf8PathBuf {
        self.root.join("Pixels")
    }

    pub fn pixels_path(&self, id: PixelsId) -> Utf8PathBuf {
        hierarchy_path(&self.pixels_dir(), id.get())
    }

    pub fn pyramid_path(&self, id: PixelsId) -> Utf8PathBuf {
        with_suffix(&self.pixels_path(id), PYRAMID_SUFFIX)
    }

    pub fn backup_path(&self, id: PixelsId) -> Utf8PathBuf {
        with_suffix(&self.pixels_path(id), BACKUP_SUFFIX)
    }

    pub fn thumbnail_path(&self, id: ThumbnailId) -> Utf8PathBuf {
        hierarchy_path(&self.root.join("Thumbnails"), id.get())
    }

    pub fn file_path(&self, id: FileId) -> Utf8PathBuf {
        hierarchy_path(&self.root.join("Files"), id.get())
    }

    pub fn probe(path: &Utf8Path) -> ArtifactInfo {
        match fs::metadata(path.as_std_path()) {
            Ok(meta) if meta.is_file() => ArtifactInfo {
                path: path.to_owned(),
                present: true,
                size: Some(meta.len()),
            },
            _ => ArtifactInfo {
                path: path.to_owned(),
                present: false,
                size: None,
            },
        }
    }

    /// Removes a binary. `false` means the file system refused.
    pub fn remove_artifact(path: &Utf8Path) -> bool {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%path, error = %err, "failed to remove binary");
                false
            }
        }
    }

    pub fn rename_artifact(from: &Utf8Path, to: &Utf8Path) -> bool {
        match fs::rename(from.as_std_path(), to.as_std_path()) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%from, %to, error = %err, "failed to rename binary");
                false
            }
        }
    }
}

/// Existence and size of one binary on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub path: Utf8PathBuf,
    pub present: bool,
    pub size: Option<u64>,
}

impl ArtifactInfo {
    pub fn size_or_zero(&self) -> u64 {
        self.size.unwrap_or(0)
    }
}

fn default_data_dir() -> Result<Utf8PathBuf, ImgbinError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("imgbin")).ok())
        .ok_or_else(|| ImgbinError::Filesystem("unable to resolve data directory".to_string()))
}

fn hierarchy_path(prefix: &Utf8Path, id: u64) -> Utf8PathBuf {
    let mut segments = Vec::new();
    let mut remaining = id;
    while remaining > 999 {
        remaining /= 1000;
        if remaining > 0 {
            segments.push(format!("Dir-{:03}", remaining % 1000));
        }
    }
    let mut path = prefix.to_owned();
    for segment in segments.iter().rev() {
        path.push(segment);
    }
    path.push(id.to_string());
    path
}

fn with_suffix(path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}{suffix}"))
}
