use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::aggregate::LabelPolicy;

pub const DEFAULT_API_VERSION: &str = "2024-04";
pub const DEFAULT_DOCUMENT_PREFIX: &str = "ph";

/// Everything one pipeline run needs, built once by the caller and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub variants: VariantConfig,
    #[serde(default)]
    pub label_policy: LabelPolicy,
    #[serde(default)]
    pub document: DocumentConfig,
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.api.base_url,
            api_version = %self.api.api_version,
            asset_root = %self.paths.asset_root.display(),
            staging_root = %self.paths.staging_root.display(),
            output_dir = %self.paths.output_dir.display(),
            label_policy = ?self.label_policy,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

/// Remote order API location and credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// e.g. `https://my-store.myshopify.com/admin`
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub access_token: String,
}

/// Admin base url of a hosted store: `https://<store>.myshopify.com/admin`.
pub fn store_base_url(store_name: &str) -> String {
    format!("https://{}.myshopify.com/admin", store_name.trim())
}

impl ApiConfig {
    pub fn for_store(store_name: &str, api_version: &str, access_token: &str) -> Self {
        Self {
            base_url: store_base_url(store_name),
            api_version: api_version.to_string(),
            access_token: access_token.to_string(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

/// Filesystem locations read and written by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Read-only tree laid out as `<asset_root>/<variant>/<identifier>.jpg`.
    pub asset_root: PathBuf,
    /// Rebuilt on every organize run, one subfolder per canonical variant.
    pub staging_root: PathBuf,
    /// Where documents are created and appended.
    pub output_dir: PathBuf,
}

/// Free-text label handling for the variant resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Label → canonical token, e.g. `Small → 5x7`.
    #[serde(default = "default_synonyms")]
    pub synonyms: BTreeMap<String, String>,
    /// Labels of non-product line items, always skipped.
    #[serde(default = "default_skip")]
    pub skip: Vec<String>,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            synonyms: default_synonyms(),
            skip: default_skip(),
        }
    }
}

fn default_synonyms() -> BTreeMap<String, String> {
    [("Small", "5x7"), ("Medium", "8x10"), ("Large", "11x14")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_skip() -> Vec<String> {
    // rush-fee add-on sold as its own variant
    vec!["$1.98".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_DOCUMENT_PREFIX.to_string()
}
