use camino::Utf8Path;
use serde::Serialize;

use crate::catalog::ImageRecord;
use crate::domain::{FileId, FilesetId, ImageId, Operation};
use crate::error::Cancel;
use crate::request::{Context, Request};
use crate::store::{ArtifactInfo, Store};

/// Phases of [`ManageImageBinaries`], in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoadImage,
    LoadArchivedFiles,
    LocateBinaries,
    LoadFileset,
    TogglePixels,
    DeletePyramid,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::LoadImage,
        Phase::LoadArchivedFiles,
        Phase::LocateBinaries,
        Phase::LoadFileset,
        Phase::TogglePixels,
        Phase::DeletePyramid,
    ];

    pub fn from_index(index: usize) -> Option<Phase> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::LoadImage => "LoadImage",
            Phase::LoadArchivedFiles => "LoadArchivedFiles",
            Phase::LocateBinaries => "LocateBinaries",
            Phase::LoadFileset => "LoadFileset",
            Phase::TogglePixels => "TogglePixels",
            Phase::DeletePyramid => "DeletePyramid",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageBinariesResponse {
    pub image: Option<ImageId>,
    pub fileset: Option<FilesetId>,
    pub archived_files: Vec<FileId>,
    pub archived_size: u64,
    pub pixels_present: bool,
    /// Size of the pixel file, or of its backup when only the backup exists.
    pub pixel_size: u64,
    pub pyramid_present: bool,
    pub pyramid_size: u64,
    pub backup_present: bool,
    pub thumbnail_size: u64,
}

/// Reports on, and optionally changes, the binaries stored for one image.
///
/// `toggle_pixels` moves the pixel file to its backup name (or back again);
/// `delete_pyramid` removes the pyramid. Both require the image to belong to
/// a fileset and the delete policy to allow it. A cancellation does not undo
/// changes made by earlier phases.
///
/// Phases run strictly in order, also when [`Request::step`] is called
/// without a [`Driver`](crate::request::Driver).
#[derive(Debug, Clone)]
pub struct ManageImageBinaries {
    image: ImageId,
    toggle_pixels: bool,
    delete_pyramid: bool,
    record: Option<ImageRecord>,
    completed: usize,
    response: ImageBinariesResponse,
}

impl ManageImageBinaries {
    pub fn new(image: ImageId, toggle_pixels: bool, delete_pyramid: bool) -> Self {
        Self {
            image,
            toggle_pixels,
            delete_pyramid,
            record: None,
            completed: 0,
            response: ImageBinariesResponse::default(),
        }
    }

    /// Read-only variant: every phase runs, nothing on disk changes.
    pub fn report(image: ImageId) -> Self {
        Self::new(image, false, false)
    }

    fn record(&self, index: usize) -> Result<&ImageRecord, Cancel> {
        self.record
            .as_ref()
            .ok_or(Cancel::BadStep {
                index,
                expected: self.completed,
            })
    }

    fn load_image(&mut self, ctx: &Context<'_>) -> Result<(), Cancel> {
        let record = ctx
            .records
            .image(self.image)
            .map_err(|source| Cancel::LookupFailed {
                image: self.image,
                source,
            })?
            .ok_or(Cancel::NoImage(self.image))?;
        self.response.image = Some(record.id);
        self.record = Some(record);
        Ok(())
    }

    fn load_archived_files(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel> {
        let record = self.record(index)?;
        let mut files = Vec::new();
        let mut size = 0;
        for id in &record.archived_files {
            let file = ctx
                .records
                .original_file(*id)
                .map_err(|source| Cancel::LookupFailed {
                    image: record.id,
                    source,
                })?;
            if let Some(file) = file {
                size += file.size;
                files.push(file.id);
            }
        }
        self.response.archived_files = files;
        self.response.archived_size = size;
        Ok(())
    }

    fn locate_binaries(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel> {
        let record = self.record(index)?;
        let binaries = Binaries::locate(ctx.store, record);
        binaries.apply(&mut self.response);
        Ok(())
    }

    fn load_fileset(&mut self, ctx: &Context<'_>) -> Result<(), Cancel> {
        let fileset = ctx
            .records
            .fileset_of(self.image)
            .map_err(|source| Cancel::FilesetLoad {
                image: self.image,
                source,
            })?;
        self.response.fileset = fileset.map(|fileset| fileset.id);
        Ok(())
    }

    fn authorize(&self, ctx: &Context<'_>, op: Operation, index: usize) -> Result<(), Cancel> {
        if self.response.fileset.is_none() {
            return Err(Cancel::RequiresFileset(op));
        }
        let record = self.record(index)?;
        let group = ctx
            .records
            .group(record.group)
            .map_err(|source| Cancel::LookupFailed {
                image: record.id,
                source,
            })?;
        if !ctx.policy.can_delete(record, group.as_ref()) {
            return Err(Cancel::DeleteDisallowed {
                op,
                image: record.id,
            });
        }
        Ok(())
    }

    fn toggle_pixel_file(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel> {
        self.authorize(ctx, Operation::Pixels, index)?;
        let record = self.record(index)?;
        let pixels = ctx.store.pixels_path(record.pixels);
        let backup = ctx.store.backup_path(record.pixels);
        if Store::probe(&pixels).present {
            if Store::probe(&backup).present {
                tracing::warn!(%pixels, %backup, "backup already exists");
                return Err(Cancel::DeleteFalse {
                    op: Operation::Pixels,
                    path: backup,
                });
            }
            ctx.report(format!("moving {pixels} to backup"));
            rename(Operation::Pixels, &pixels, &backup)?;
        } else if Store::probe(&backup).present {
            ctx.report(format!("restoring {pixels} from backup"));
            rename(Operation::Pixels, &backup, &pixels)?;
        }
        let binaries = Binaries::locate(ctx.store, record);
        binaries.apply(&mut self.response);
        Ok(())
    }

    fn remove_pyramid(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel> {
        self.authorize(ctx, Operation::Pyramid, index)?;
        let record = self.record(index)?;
        let pyramid = ctx.store.pyramid_path(record.pixels);
        if Store::probe(&pyramid).present {
            ctx.report(format!("deleting {pyramid}"));
            if !Store::remove_artifact(&pyramid) {
                return Err(Cancel::DeleteFalse {
                    op: Operation::Pyramid,
                    path: pyramid,
                });
            }
            tracing::info!(image = %record.id, path = %pyramid, "pyramid deleted");
        }
        let binaries = Binaries::locate(ctx.store, record);
        binaries.apply(&mut self.response);
        Ok(())
    }
}

fn rename(op: Operation, from: &Utf8Path, to: &Utf8Path) -> Result<(), Cancel> {
    if !Store::rename_artifact(from, to) {
        return Err(Cancel::DeleteFalse {
            op,
            path: from.to_owned(),
        });
    }
    tracing::info!(%from, %to, "binary renamed");
    Ok(())
}

impl Request for ManageImageBinaries {
    type Response = ImageBinariesResponse;

    fn name(&self) -> &'static str {
        "manage-image-binaries"
    }

    fn step_count(&self) -> usize {
        Phase::ALL.len()
    }

    fn step_name(&self, index: usize) -> &'static str {
        Phase::from_index(index).map_or("Unknown", Phase::name)
    }

    fn step(&mut self, ctx: &Context<'_>, index: usize) -> Result<(), Cancel> {
        let phase = Phase::from_index(index).ok_or(Cancel::UnknownStep {
            index,
            count: Phase::ALL.len(),
        })?;
        if index != self.completed {
            return Err(Cancel::BadStep {
                index,
                expected: self.completed,
            });
        }
        match phase {
            Phase::LoadImage => self.load_image(ctx),
            Phase::LoadArchivedFiles => self.load_archived_files(ctx, index),
            Phase::LocateBinaries => self.locate_binaries(ctx, index),
            Phase::LoadFileset => self.load_fileset(ctx),
            Phase::TogglePixels if self.toggle_pixels => self.toggle_pixel_file(ctx, index),
            Phase::DeletePyramid if self.delete_pyramid => self.remove_pyramid(ctx, index),
            Phase::TogglePixels | Phase::DeletePyramid => Ok(()),
        }?;
        self.completed += 1;
        Ok(())
    }

    fn response(self) -> ImageBinariesResponse {
        self.response
    }
}

struct Binaries {
    pixels: ArtifactInfo,
    pyramid: ArtifactInfo,
    backup: ArtifactInfo,
    thumbnails: Vec<ArtifactInfo>,
}

impl Binaries {
    fn locate(store: &Store, record: &ImageRecord) -> Self {
        Self {
            pixels: Store::probe(&store.pixels_path(record.pixels)),
            pyramid: Store::probe(&store.pyramid_path(record.pixels)),
            backup: Store::probe(&store.backup_path(record.pixels)),
            thumbnails: record
                .thumbnails
                .iter()
                .map(|id| Store::probe(&store.thumbnail_path(*id)))
                .collect(),
        }
    }

    fn apply(&self, response: &mut ImageBinariesResponse) {
        response.pixels_present = self.pixels.present;
        response.pixel_size = if self.pixels.present {
            self.pixels.size_or_zero()
        } else {
            self.backup.size_or_zero()
        };
        response.pyramid_present = self.pyramid.present;
        response.pyramid_size = self.pyramid.size_or_zero();
        response.backup_present = self.backup.present;
        response.thumbnail_size = self.thumbnails.iter().map(ArtifactInfo::size_or_zero).sum();
    }
}
