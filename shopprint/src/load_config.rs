//! `load_config` module: builds the runtime [`CliConfig`] from an optional YAML file and
//! the process environment.
//!
//! Sources are applied in order, later ones winning:
//! 1. the YAML file given with `--config` (every key optional)
//! 2. environment variables (`main` loads `.env` into the environment beforehand)
//!
//! Paths still unset afterwards default to folders under the home directory.
//!
//! The credential and store are only checked when a command needs the order API,
//! see [`CliConfig::api`]. Offline commands (`files add`, `config …`) work without them.

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use shopprint_core::aggregate::LabelPolicy;
use shopprint_core::config::{
    store_base_url, ApiConfig, DocumentConfig, PathsConfig, PipelineConfig, VariantConfig,
    DEFAULT_API_VERSION,
};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_ACCESS_TOKEN: &str = "ADMIN_API_KEY";
pub const ENV_STORE_NAME: &str = "STORE_NAME";
pub const ENV_SHOP_URL: &str = "SHOP_URL";
pub const ENV_API_VERSION: &str = "API_VERSION";
pub const ENV_ASSET_PATH: &str = "ASSET_PATH";
pub const ENV_FILES_PATH: &str = "FILES_PATH";
pub const ENV_PDF_DIR: &str = "PDF_DIR";

#[derive(Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api: FileApi,
    paths: FilePaths,
    variants: VariantConfig,
    label_policy: LabelPolicy,
    document: DocumentConfig,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct FileApi {
    store_name: Option<String>,
    shop_url: Option<String>,
    api_version: Option<String>,
    access_token: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct FilePaths {
    asset_root: Option<PathBuf>,
    staging_root: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

/// Fully resolved settings for one CLI invocation.
#[derive(Clone)]
pub struct CliConfig {
    /// Admin base url, from `SHOP_URL` or derived from `STORE_NAME`.
    pub base_url: Option<String>,
    pub api_version: String,
    access_token: Option<String>,
    pub paths: PathsConfig,
    pub variants: VariantConfig,
    pub label_policy: LabelPolicy,
    pub document: DocumentConfig,
}

impl fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("paths", &self.paths)
            .field("variants", &self.variants)
            .field("label_policy", &self.label_policy)
            .field("document", &self.document)
            .finish()
    }
}

impl CliConfig {
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// API settings, failing with a hint when the credential or the store is missing.
    pub fn api(&self) -> Result<ApiConfig> {
        let access_token = self.access_token.clone().ok_or_else(|| {
            anyhow!(
                "{ENV_ACCESS_TOKEN} is not set; run `shopprint config set {ENV_ACCESS_TOKEN} <token>`"
            )
        })?;
        let base_url = self.base_url.clone().ok_or_else(|| {
            anyhow!(
                "{ENV_STORE_NAME} is not set; run `shopprint config set {ENV_STORE_NAME} <store>`"
            )
        })?;
        Ok(ApiConfig {
            base_url,
            api_version: self.api_version.clone(),
            access_token,
        })
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            api: self.api()?,
            paths: self.paths.clone(),
            variants: self.variants.clone(),
            label_policy: self.label_policy,
            document: self.document.clone(),
        };
        config.trace_loaded();
        Ok(config)
    }
}

/// Loads the optional YAML config file and applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let file = match path {
        Some(path) => read_config_file(path)?,
        None => {
            info!("No config file given; using environment only");
            FileConfig::default()
        }
    };

    let base_url = env_value(ENV_SHOP_URL)
        .or_else(|| env_value(ENV_STORE_NAME).map(|s| store_base_url(&s)))
        .or(file.api.shop_url)
        .or_else(|| file.api.store_name.map(|s| store_base_url(&s)));
    let api_version = env_value(ENV_API_VERSION)
        .or(file.api.api_version)
        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
    let access_token = env_value(ENV_ACCESS_TOKEN).or(file.api.access_token);

    let paths = PathsConfig {
        asset_root: resolve_path(ENV_ASSET_PATH, file.paths.asset_root, &["assets"])?,
        staging_root: resolve_path(ENV_FILES_PATH, file.paths.staging_root, &["files"])?,
        output_dir: resolve_path(ENV_PDF_DIR, file.paths.output_dir, &["Documents", "prints"])?,
    };

    let config = CliConfig {
        base_url,
        api_version,
        access_token,
        paths,
        variants: file.variants,
        label_policy: file.label_policy,
        document: file.document,
    };
    info!(
        base_url = ?config.base_url,
        credential_set = config.has_access_token(),
        asset_root = %config.paths.asset_root.display(),
        "Configuration resolved"
    );
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path, e));
        }
    };

    match serde_yaml::from_str::<Option<FileConfig>>(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Non-empty environment value.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_path(key: &str, from_file: Option<PathBuf>, default: &[&str]) -> Result<PathBuf> {
    if let Some(value) = env_value(key) {
        return Ok(expand_home(&value));
    }
    if let Some(path) = from_file {
        return Ok(path);
    }
    let mut path = home_dir().with_context(|| format!("{key} is not set"))?;
    path.extend(default);
    Ok(path)
}

fn home_dir() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|bd| bd.home_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// `~/x` → `<home>/x`; anything else unchanged.
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => match home_dir() {
            Ok(home) => home.join(rest),
            Err(_) => PathBuf::from(value),
        },
        None => PathBuf::from(value),
    }
}
