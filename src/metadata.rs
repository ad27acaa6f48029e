use std::fs;
use std::sync::OnceLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;

use crate::domain::{FileId, ImageId};
use crate::error::{Cancel, StoreError};
use crate::request::{Context, Request};

pub const ORIGINAL_METADATA_NAME: &str = "original_metadata.txt";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OriginalMetadataResponse {
    pub source: Option<FileId>,
    pub global_metadata: Vec<(String, String)>,
    pub series_metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Global,
    Series,
}

/// Parses the `[GlobalMetadata]` and `[SeriesMetadata]` sections of an
/// original metadata dump. Lines outside those sections are ignored, as are
/// lines without `=`.
pub fn parse_original_metadata(content: &str) -> (Vec<(String, String)>, Vec<(String, String)>) {
    static PAIR: OnceLock<Regex> = OnceLock::new();
    let pair = PAIR.get_or_init(|| Regex::new(r"^\s*([^=]*?)\s*=\s*(.*?)\s*$").unwrap());

    let mut global = Vec::new();
    let mut series = Vec::new();
    let mut section = Section::None;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = match trimmed {
                "[GlobalMetadata]" => Section::Global,
                "[SeriesMetadata]" => Section::Series,
                _ => Section::None,
            };
            continue;
        }
        let Some(captures) = pair.captures(line) else {
            continue;
        };
        let entry = (captures[1].to_string(), captures[2].to_string());
        match section {
            Section::Global => global.push(entry),
            Section::Series => series.push(entry),
            Section::None => {}
        }
    }
    (global, series)
}

/// Reads the original metadata stored alongside an image.
#[derive(Debug, Clone)]
pub struct OriginalMetadata {
    image: ImageId,
    response: OriginalMetadataResponse,
}

impl OriginalMetadata {
    pub fn new(image: ImageId) -> Self {
        Self {
            image,
            response: OriginalMetadataResponse::default(),
        }
    }

    fn metadata_file(&self, ctx: &Context<'_>) -> Result<Option<FileId>, Cancel> {
        let lookup = |source: StoreError| Cancel::LookupFailed {
            image: self.image,
            source,
        };
        let image = ctx
            .records
            .image(self.image)
            .map_err(lookup)?
            .ok_or(Cancel::NoImage(self.image))?;
        let fileset = ctx
            .records
            .fileset_of(image.id)
            .map_err(|source| Cancel::FilesetLoad {
                image: image.id,
                source,
            })?;
        let mut candidates: Vec<FileId> = fileset
            .map(|fileset| fileset.entries.into_iter().map(|entry| entry.file).collect())
            .unwrap_or_default();
        candidates.extend(image.archived_files);

        for id in candidates {
            let file = ctx.records.original_file(id).map_err(lookup)?;
            if file.is_some_and(|file| file.name == ORIGINAL_METADATA_NAME) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

impl Request for OriginalMetadata {
    type Response = OriginalMetadataResponse;

    fn name(&self) -> &'static str {
        "original-metadata"
    }

    fn step_count(&self) -> usize {
        1
    }

    fn step_name(&self, _index: usize) -> &'static str {
        "ReadMetadata"
    }

    fn step(&mut self, ctx: &Context<'_>, _index: usize) -> Result<(), Cancel> {
        let Some(file) = self.metadata_file(ctx)? else {
            tracing::debug!(image = %self.image, "no original metadata file");
            return Ok(());
        };
        let path: Utf8PathBuf = ctx.store.file_path(file);
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|source| Cancel::ReaderFailure { path, source })?;
        let (global, series) = parse_original_metadata(&content);
        self.response = OriginalMetadataResponse {
            source: Some(file),
            global_metadata: global,
            series_metadata: series,
        };
        Ok(())
    }

    fn response(self) -> OriginalMetadataResponse {
        self.response
    }
}
