use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;

use imgbin::app::App;
use imgbin::binaries::ManageImageBinaries;
use imgbin::catalog::{
    CatalogFile, CatalogStore, FilesetEntry, FilesetRecord, GroupRecord, ImageRecord,
    OriginalFileRecord,
};
use imgbin::domain::{
    FileId, FilesetId, GroupId, GroupPermissions, ImageId, PixelsId, ThumbnailId, UserId,
};
use imgbin::error::Cancel;
use imgbin::output::JsonOutput;
use imgbin::policy::SessionPolicy;
use imgbin::request::{Context, Driver, Request};
use imgbin::store::Store;

const OWNER: UserId = UserId::new(10);
const STRANGER: UserId = UserId::new(99);

struct Repo {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Repo {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, root }
    }

    fn store(&self) -> Store {
        Store::new_with_root(self.root.clone())
    }

    fn app(&self, user: UserId) -> App<CatalogStore, SessionPolicy> {
        App::new(
            self.store(),
            CatalogStore::from_catalog(catalog()).unwrap(),
            SessionPolicy::new(user, false),
        )
    }
}

fn write(path: &Utf8Path, size: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path()).unwrap();
    }
    fs::write(path.as_std_path(), vec![0u8; size]).unwrap();
}

fn image(id: u64, fileset: Option<u64>) -> ImageRecord {
    ImageRecord {
        id: ImageId::new(id),
        name: format!("image-{id}"),
        pixels: PixelsId::new(id + 100),
        owner: OWNER,
        group: GroupId::new(1),
        imported_at: Utc::now(),
        fileset: fileset.map(FilesetId::new),
        archived_files: vec![FileId::new(500), FileId::new(501)],
        thumbnails: vec![ThumbnailId::new(id + 200)],
    }
}

/// Image 1 belongs to fileset 7, image 2 is a pre-fileset import.
fn catalog() -> CatalogFile {
    CatalogFile {
        images: vec![image(1, Some(7)), image(2, None)],
        filesets: vec![FilesetRecord {
            id: FilesetId::new(7),
            entries: vec![FilesetEntry {
                file: FileId::new(600),
                images: vec![ImageId::new(1)],
                companion: false,
            }],
        }],
        files: vec![
            OriginalFileRecord {
                id: FileId::new(500),
                name: "a.tif".to_string(),
                size: 40,
            },
            OriginalFileRecord {
                id: FileId::new(501),
                name: "a.xml".to_string(),
                size: 2,
            },
        ],
        groups: vec![GroupRecord {
            id: GroupId::new(1),
            permissions: GroupPermissions::ReadOnly,
            leaders: Vec::new(),
            members: vec![OWNER, STRANGER],
        }],
    }
}

#[test]
fn reports_sizes_of_all_binaries() {
    let repo = Repo::new();
    let store = repo.store();
    write(&store.pixels_path(PixelsId::new(101)), 1000);
    write(&store.pyramid_path(PixelsId::new(101)), 300);
    write(&store.thumbnail_path(ThumbnailId::new(201)), 12);

    let result = repo
        .app(OWNER)
        .image_binaries(ImageId::new(1), &JsonOutput)
        .unwrap();
    assert_eq!(result.image, Some(ImageId::new(1)));
    assert_eq!(result.fileset, Some(FilesetId::new(7)));
    assert!(result.pixels_present);
    assert_eq!(result.pixel_size, 1000);
    assert!(result.pyramid_present);
    assert_eq!(result.pyramid_size, 300);
    assert!(!result.backup_present);
    assert_eq!(result.thumbnail_size, 12);
    assert_eq!(result.archived_files, vec![FileId::new(500), FileId::new(501)]);
    assert_eq!(result.archived_size, 42);
}

#[test]
fn backup_size_reported_when_pixels_missing() {
    let repo = Repo::new();
    write(&repo.store().backup_path(PixelsId::new(101)), 500);

    let result = repo
        .app(OWNER)
        .image_binaries(ImageId::new(1), &JsonOutput)
        .unwrap();
    assert!(!result.pixels_present);
    assert_eq!(result.pixel_size, 500);
    assert!(result.backup_present);
}

#[test]
fn read_only_report_is_repeatable() {
    let repo = Repo::new();
    let store = repo.store();
    write(&store.pixels_path(PixelsId::new(101)), 64);
    write(&store.pyramid_path(PixelsId::new(101)), 32);

    let app = repo.app(OWNER);
    let first = app.image_binaries(ImageId::new(1), &JsonOutput).unwrap();
    let second = app.image_binaries(ImageId::new(1), &JsonOutput).unwrap();
    assert_eq!(first, second);
}

#[test]
fn unknown_image_is_cancelled() {
    let repo = Repo::new();
    let err = repo
        .app(OWNER)
        .image_binaries(ImageId::new(42), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, Cancel::NoImage(_));
    assert_eq!(err.reason_code(), "no-image");
}

#[test]
fn toggle_requires_fileset() {
    let repo = Repo::new();
    let pixels = repo.store().pixels_path(PixelsId::new(102));
    write(&pixels, 10);

    let err = repo
        .app(OWNER)
        .manage_binaries(ImageId::new(2), true, false, &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "pixels-requires-fileset");
    assert!(pixels.as_std_path().exists());
}

#[test]
fn toggle_refused_without_permission() {
    let repo = Repo::new();
    let pixels = repo.store().pixels_path(PixelsId::new(101));
    write(&pixels, 10);

    let err = repo
        .app(STRANGER)
        .manage_binaries(ImageId::new(1), true, false, &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "pixels-delete-disallowed");
    assert!(pixels.as_std_path().exists());
}

#[test]
fn toggle_moves_pixels_to_backup_and_back() {
    let repo = Repo::new();
    let store = repo.store();
    let pixels = store.pixels_path(PixelsId::new(101));
    write(&pixels, 77);
    let app = repo.app(OWNER);

    let result = app
        .manage_binaries(ImageId::new(1), true, false, &JsonOutput)
        .unwrap();
    assert!(!result.pixels_present);
    assert!(result.backup_present);
    assert_eq!(result.pixel_size, 77);
    assert!(!pixels.as_std_path().exists());

    let result = app
        .manage_binaries(ImageId::new(1), true, false, &JsonOutput)
        .unwrap();
    assert!(result.pixels_present);
    assert!(!result.backup_present);
    assert!(pixels.as_std_path().exists());
}

#[test]
fn failed_rename_is_reported() {
    let repo = Repo::new();
    let store = repo.store();
    write(&store.pixels_path(PixelsId::new(101)), 5);
    let backup = store.backup_path(PixelsId::new(101));
    write(&backup.join("occupied"), 1);

    let err = repo
        .app(OWNER)
        .manage_binaries(ImageId::new(1), true, false, &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "pixels-delete-false");
}

#[test]
fn toggle_keeps_existing_backup() {
    let repo = Repo::new();
    let store = repo.store();
    let pixels = store.pixels_path(PixelsId::new(101));
    let backup = store.backup_path(PixelsId::new(101));
    write(&pixels, 5);
    write(&backup, 9);

    let err = repo
        .app(OWNER)
        .manage_binaries(ImageId::new(1), true, false, &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "pixels-delete-false");
    assert_eq!(fs::metadata(pixels.as_std_path()).unwrap().len(), 5);
    assert_eq!(fs::metadata(backup.as_std_path()).unwrap().len(), 9);
}

#[test]
fn delete_pyramid_removes_file() {
    let repo = Repo::new();
    let store = repo.store();
    let pyramid = store.pyramid_path(PixelsId::new(101));
    write(&store.pixels_path(PixelsId::new(101)), 8);
    write(&pyramid, 300);

    let result = repo
        .app(OWNER)
        .manage_binaries(ImageId::new(1), false, true, &JsonOutput)
        .unwrap();
    assert!(!result.pyramid_present);
    assert_eq!(result.pyramid_size, 0);
    assert!(result.pixels_present);
    assert!(!pyramid.as_std_path().exists());
}

#[test]
fn delete_missing_pyramid_is_a_no_op() {
    let repo = Repo::new();
    let result = repo
        .app(OWNER)
        .manage_binaries(ImageId::new(1), false, true, &JsonOutput)
        .unwrap();
    assert!(!result.pyramid_present);
}

#[test]
fn delete_pyramid_checks_fileset_and_permission() {
    let repo = Repo::new();
    let store = repo.store();
    write(&store.pyramid_path(PixelsId::new(102)), 3);
    write(&store.pyramid_path(PixelsId::new(101)), 3);

    let err = repo
        .app(OWNER)
        .manage_binaries(ImageId::new(2), false, true, &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "pyramid-requires-fileset");

    let err = repo
        .app(STRANGER)
        .manage_binaries(ImageId::new(1), false, true, &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "pyramid-delete-disallowed");
    assert!(store.pyramid_path(PixelsId::new(101)).as_std_path().exists());
}

#[test]
fn dangling_fileset_fails_to_load() {
    let repo = Repo::new();
    let mut catalog = catalog();
    catalog.filesets.clear();
    let app = App::new(
        repo.store(),
        CatalogStore::from_catalog(catalog).unwrap(),
        SessionPolicy::new(OWNER, false),
    );
    let err = app
        .image_binaries(ImageId::new(1), &JsonOutput)
        .unwrap_err();
    assert_eq!(err.reason_code(), "fileset-load-err");
}

#[test]
fn driver_rejects_out_of_order_steps() {
    let repo = Repo::new();
    let store = repo.store();
    let records = CatalogStore::from_catalog(catalog()).unwrap();
    let policy = SessionPolicy::new(OWNER, false);
    let ctx = Context {
        store: &store,
        records: &records,
        policy: &policy,
        sink: &JsonOutput,
    };

    let mut driver = Driver::new(ManageImageBinaries::report(ImageId::new(1)));
    assert_eq!(driver.step_count(), 6);
    assert_eq!(driver.step(&ctx, 2).unwrap_err().reason_code(), "bad-step");
    assert_eq!(driver.step(&ctx, 6).unwrap_err().reason_code(), "unknown-step");
    driver.step(&ctx, 0).unwrap();
    driver.step(&ctx, 1).unwrap();
}

#[test]
fn request_reports_expected_phase_without_driver() {
    let repo = Repo::new();
    let store = repo.store();
    write(&store.pixels_path(PixelsId::new(101)), 4);
    let records = CatalogStore::from_catalog(catalog()).unwrap();
    let policy = SessionPolicy::new(OWNER, false);
    let ctx = Context {
        store: &store,
        records: &records,
        policy: &policy,
        sink: &JsonOutput,
    };

    let mut request = ManageImageBinaries::new(ImageId::new(1), true, false);
    let err = request.step(&ctx, 4).unwrap_err();
    assert_matches!(err, Cancel::BadStep { index: 4, expected: 0 });

    request.step(&ctx, 0).unwrap();
    request.step(&ctx, 1).unwrap();
    let err = request.step(&ctx, 4).unwrap_err();
    assert_matches!(err, Cancel::BadStep { index: 4, expected: 2 });
    assert!(store.pixels_path(PixelsId::new(101)).as_std_path().exists());
}
