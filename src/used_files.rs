use serde::Serialize;

use crate::domain::{FileId, ImageId};
use crate::error::Cancel;
use crate::request::{Context, Request};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsedFilesResponse {
    pub binary_files_this_series: Vec<FileId>,
    pub companion_files_this_series: Vec<FileId>,
    pub binary_files_other_series: Vec<FileId>,
    pub companion_files_other_series: Vec<FileId>,
    /// Files attached to images imported before filesets existed.
    pub archived_files: Vec<FileId>,
}

/// Lists the original files an image was imported from.
#[derive(Debug, Clone)]
pub struct UsedFiles {
    image: ImageId,
    response: UsedFilesResponse,
}

impl UsedFiles {
    pub fn new(image: ImageId) -> Self {
        Self {
            image,
            response: UsedFilesResponse::default(),
        }
    }
}

impl Request for UsedFiles {
    type Response = UsedFilesResponse;

    fn name(&self) -> &'static str {
        "used-files"
    }

    fn step_count(&self) -> usize {
        1
    }

    fn step_name(&self, _index: usize) -> &'static str {
        "ListFiles"
    }

    fn step(&mut self, ctx: &Context<'_>, _index: usize) -> Result<(), Cancel> {
        let image = ctx
            .records
            .image(self.image)
            .map_err(|source| Cancel::LookupFailed {
                image: self.image,
                source,
            })?
            .ok_or(Cancel::NoImage(self.image))?;
        let fileset = ctx
            .records
            .fileset_of(image.id)
            .map_err(|source| Cancel::FilesetLoad {
                image: image.id,
                source,
            })?;

        let Some(fileset) = fileset else {
            self.response.archived_files = image.archived_files;
            return Ok(());
        };
        for entry in fileset.entries {
            let this_series = entry.images.contains(&image.id);
            let target = match (this_series, entry.companion) {
                (true, false) => &mut self.response.binary_files_this_series,
                (true, true) => &mut self.response.companion_files_this_series,
                (false, false) => &mut self.response.binary_files_other_series,
                (false, true) => &mut self.response.companion_files_other_series,
            };
            target.push(entry.file);
        }
        Ok(())
    }

    fn response(self) -> UsedFilesResponse {
        self.response
    }
}
