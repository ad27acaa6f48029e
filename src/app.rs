use chrono::{DateTime, Utc};

use crate::binaries::{ImageBinariesResponse, ManageImageBinaries};
use crate::catalog::RecordStore;
use crate::domain::ImageId;
use crate::error::Cancel;
use crate::metadata::{OriginalMetadata, OriginalMetadataResponse};
use crate::policy::DeletePolicy;
use crate::pyramids::{FindPyramids, FindPyramidsResponse, ScanOptions};
use crate::request::{Context, Driver, ProgressSink, Request};
use crate::store::Store;
use crate::used_files::{UsedFiles, UsedFilesResponse};

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub scan: ScanOptions,
    pub little_endian: Option<bool>,
    pub imported_after: Option<DateTime<Utc>>,
}

/// Entry point tying the binary repository, the record store and the delete
/// policy together. Every call runs one request to completion.
pub struct App<R: RecordStore, P: DeletePolicy> {
    store: Store,
    records: R,
    policy: P,
}

impl<R: RecordStore, P: DeletePolicy> App<R, P> {
    pub fn new(store: Store, records: R, policy: P) -> Self {
        Self {
            store,
            records,
            policy,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn find_pyramids(
        &self,
        options: FindOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FindPyramidsResponse, Cancel> {
        let request = FindPyramids::new(options.scan, options.little_endian, options.imported_after);
        self.run(request, sink)
    }

    pub fn image_binaries(
        &self,
        image: ImageId,
        sink: &dyn ProgressSink,
    ) -> Result<ImageBinariesResponse, Cancel> {
        self.run(ManageImageBinaries::report(image), sink)
    }

    pub fn manage_binaries(
        &self,
        image: ImageId,
        toggle_pixels: bool,
        delete_pyramid: bool,
        sink: &dyn ProgressSink,
    ) -> Result<ImageBinariesResponse, Cancel> {
        self.run(
            ManageImageBinaries::new(image, toggle_pixels, delete_pyramid),
            sink,
        )
    }

    pub fn used_files(
        &self,
        image: ImageId,
        sink: &dyn ProgressSink,
    ) -> Result<UsedFilesResponse, Cancel> {
        self.run(UsedFiles::new(image), sink)
    }

    pub fn original_metadata(
        &self,
        image: ImageId,
        sink: &dyn ProgressSink,
    ) -> Result<OriginalMetadataResponse, Cancel> {
        self.run(OriginalMetadata::new(image), sink)
    }

    fn run<Q: Request>(&self, request: Q, sink: &dyn ProgressSink) -> Result<Q::Response, Cancel> {
        let ctx = Context {
            store: &self.store,
            records: &self.records,
            policy: &self.policy,
            sink,
        };
        Driver::new(request).run(&ctx)
    }
}
