use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::error::ImgbinError;
use crate::pyramids::ScanOptions;
use crate::store::PYRAMID_SUFFIX;

pub const CONFIG_FILE_NAME: &str = "imgbin.json";
pub const DEFAULT_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    /// Root of the binary repository. Falls back to `IMGBIN_DATA_DIR`, then
    /// the platform data directory.
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Catalog JSON; relative paths resolve against the repository root.
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub pyramids: Option<PyramidSettings>,
    #[serde(default)]
    pub session: Option<SessionSettings>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PyramidSettings {
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub check_empty_file: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub admin: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Option<Utf8PathBuf>,
    pub catalog: Utf8PathBuf,
    pub scan: ScanOptions,
    pub user: UserId,
    pub admin: bool,
}

impl ResolvedConfig {
    /// Catalog location for a repository rooted at `root`; relative catalog
    /// paths resolve against the repository root.
    pub fn catalog_path(&self, root: &Utf8Path) -> Utf8PathBuf {
        if self.catalog.is_relative() {
            root.join(&self.catalog)
        } else {
            self.catalog.clone()
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ImgbinError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(ImgbinError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| ImgbinError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ImgbinError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ImgbinError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let data_dir = config.data_dir.map(Utf8PathBuf::from);

        let catalog = Utf8PathBuf::from(config.catalog.as_deref().unwrap_or("catalog.json"));

        let pyramids = config.pyramids.unwrap_or_default();
        let scan = ScanOptions {
            suffix: pyramids
                .suffix
                .unwrap_or_else(|| PYRAMID_SUFFIX.to_string()),
            limit: pyramids.limit.unwrap_or(DEFAULT_LIMIT),
            check_empty_file: pyramids.check_empty_file.unwrap_or(true),
        };
        scan.validate()
            .map_err(|err| ImgbinError::ConfigParse(format!("pyramids: {err}")))?;

        let session = config.session.unwrap_or_default();
        Ok(ResolvedConfig {
            schema_version,
            data_dir,
            catalog,
            scan,
            user: session.user.unwrap_or(UserId::new(0)),
            admin: session.admin.unwrap_or(false),
        })
    }
}
