use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    FileId, FilesetId, GroupId, GroupPermissions, ImageId, PixelsId, ThumbnailId, UserId,
};
use crate::error::StoreError;

/// Read access to image records. Implementations own their connection or
/// in-memory state; callers hand a reference into each request.
pub trait RecordStore: Send + Sync {
    fn image(&self, id: ImageId) -> Result<Option<ImageRecord>, StoreError>;
    fn pixels(&self, id: PixelsId) -> Result<Option<PixelsRecord>, StoreError>;
    fn fileset_of(&self, image: ImageId) -> Result<Option<FilesetRecord>, StoreError>;
    fn original_file(&self, id: FileId) -> Result<Option<OriginalFileRecord>, StoreError>;
    fn group(&self, id: GroupId) -> Result<Option<GroupRecord>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    #[serde(default)]
    pub name: String,
    pub pixels: PixelsId,
    pub owner: UserId,
    pub group: GroupId,
    pub imported_at: DateTime<Utc>,
    #[serde(default)]
    pub fileset: Option<FilesetId>,
    /// Files linked to the pixels of pre-fileset imports.
    #[serde(default)]
    pub archived_files: Vec<FileId>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelsRecord {
    pub id: PixelsId,
    pub image: ImageId,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesetRecord {
    pub id: FilesetId,
    #[serde(default)]
    pub entries: Vec<FilesetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesetEntry {
    pub file: FileId,
    /// Images (series) that read this file.
    #[serde(default)]
    pub images: Vec<ImageId>,
    #[serde(default)]
    pub companion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalFileRecord {
    pub id: FileId,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    #[serde(default)]
    pub permissions: GroupPermissions,
    #[serde(default)]
    pub leaders: Vec<UserId>,
    #[serde(default)]
    pub members: Vec<UserId>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub filesets: Vec<FilesetRecord>,
    #[serde(default)]
    pub files: Vec<OriginalFileRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
}

/// Record store backed by a JSON catalog loaded into memory.
#[derive(Debug, Default)]
pub struct CatalogStore {
    images: HashMap<ImageId, ImageRecord>,
    pixels: HashMap<PixelsId, ImageId>,
    filesets: HashMap<FilesetId, FilesetRecord>,
    files: HashMap<FileId, OriginalFileRecord>,
    groups: HashMap<GroupId, GroupRecord>,
}

impl CatalogStore {
    pub fn load(path: &Utf8Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|source| StoreError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let catalog: CatalogFile =
            serde_json::from_str(content).map_err(|err| StoreError::Parse(err.to_string()))?;
        Self::from_catalog(catalog)
    }

    pub fn from_catalog(catalog: CatalogFile) -> Result<Self, StoreError> {
        let mut store = Self::default();
        for image in catalog.images {
            if let Some(previous) = store.pixels.insert(image.pixels, image.id) {
                return Err(StoreError::Inconsistent(format!(
                    "pixels {} shared by images {previous} and {}",
                    image.pixels, image.id
                )));
            }
            store.images.insert(image.id, image);
        }
        store.filesets = catalog
            .filesets
            .into_iter()
            .map(|fileset| (fileset.id, fileset))
            .collect();
        store.files = catalog.files.into_iter().map(|file| (file.id, file)).collect();
        store.groups = catalog
            .groups
            .into_iter()
            .map(|group| (group.id, group))
            .collect();
        tracing::debug!(
            images = store.images.len(),
            filesets = store.filesets.len(),
            files = store.files.len(),
            "catalog loaded"
        );
        Ok(store)
    }
}

impl RecordStore for CatalogStore {
    fn image(&self, id: ImageId) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.images.get(&id).cloned())
    }

    fn pixels(&self, id: PixelsId) -> Result<Option<PixelsRecord>, StoreError> {
        Ok(self
            .pixels
            .get(&id)
            .and_then(|image| self.images.get(image))
            .map(|image| PixelsRecord {
                id,
                image: image.id,
                imported_at: image.imported_at,
            }))
    }

    fn fileset_of(&self, image: ImageId) -> Result<Option<FilesetRecord>, StoreError> {
        let Some(fileset) = self.images.get(&image).and_then(|record| record.fileset) else {
            return Ok(None);
        };
        self.filesets
            .get(&fileset)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "image {image} references missing fileset {fileset}"
                ))
            })
    }

    fn original_file(&self, id: FileId) -> Result<Option<OriginalFileRecord>, StoreError> {
        Ok(self.files.get(&id).cloned())
    }

    fn group(&self, id: GroupId) -> Result<Option<GroupRecord>, StoreError> {
        Ok(self.groups.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const CATALOG: &str = r#"{
        "images": [
            {"id": 1, "pixels": 11, "owner": 5, "group": 3,
             "imported_at": "2024-01-02T03:04:05Z", "fileset": 9}
        ],
        "filesets": [{"id": 9, "entries": [{"file": 20, "images": [1]}]}]
    }"#;

    #[test]
    fn resolves_pixels_to_image() {
        let store = CatalogStore::from_json(CATALOG).unwrap();
        let pixels = store.pixels(PixelsId::new(11)).unwrap().unwrap();
        assert_eq!(pixels.image, ImageId::new(1));
        assert!(store.pixels(PixelsId::new(12)).unwrap().is_none());
    }

    #[test]
    fn fileset_lookup() {
        let store = CatalogStore::from_json(CATALOG).unwrap();
        let fileset = store.fileset_of(ImageId::new(1)).unwrap().unwrap();
        assert_eq!(fileset.entries.len(), 1);
        assert!(store.fileset_of(ImageId::new(2)).unwrap().is_none());
    }

    #[test]
    fn dangling_fileset_is_an_error() {
        let store = CatalogStore::from_json(
            r#"{"images": [{"id": 1, "pixels": 1, "owner": 1, "group": 1,
                "imported_at": "2024-01-01T00:00:00Z", "fileset": 4}]}"#,
        )
        .unwrap();
        let err = store.fileset_of(ImageId::new(1)).unwrap_err();
        assert_matches!(err, StoreError::Inconsistent(_));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = CatalogStore::from_json("{").unwrap_err();
        assert_matches!(err, StoreError::Parse(_));
    }
}
