//! Locating pre-rendered print images for aggregated items, and staging copies of them.
//!
//! Assets live at `<asset_root>/<variant>/<identifier>.jpg`. Resolution never fails per
//! item: absent files become [`AssetRecord::Missing`], labels that cannot be mapped to a
//! print size are listed in [`ResolvedAssets::unmapped`], and excluded labels are counted
//! in [`ResolvedAssets::skipped`].

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aggregate::AggregatedItem;
use crate::variant::{CanonicalVariant, Resolution, VariantResolver};

pub const IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRecord {
    Found {
        identifier: String,
        variant: CanonicalVariant,
        path: PathBuf,
        /// Number of physical prints; the same image is used this many times.
        copies: u64,
    },
    Missing {
        identifier: String,
    },
}

/// An item whose label maps to no print size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedItem {
    pub identifier: String,
    pub variant_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAssets {
    /// One record per resolvable item, in input order.
    pub records: Vec<AssetRecord>,
    pub unmapped: Vec<UnmappedItem>,
    pub skipped: usize,
}

impl ResolvedAssets {
    /// `(path, copies)` pairs for every found asset, ready for document assembly.
    pub fn images(&self) -> Vec<(PathBuf, u64)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                AssetRecord::Found { path, copies, .. } => Some((path.clone(), *copies)),
                AssetRecord::Missing { .. } => None,
            })
            .collect()
    }

    /// Identifiers without an asset, in input order.
    pub fn missing(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match r {
                AssetRecord::Missing { identifier } => Some(identifier.clone()),
                AssetRecord::Found { .. } => None,
            })
            .collect()
    }

    pub fn found_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, AssetRecord::Found { .. }))
            .count()
    }
}

/// Expected location of an asset, whether or not it exists.
pub fn asset_path(asset_root: &Path, variant: CanonicalVariant, identifier: &str) -> PathBuf {
    asset_root
        .join(variant.as_str())
        .join(format!("{identifier}.{IMAGE_EXTENSION}"))
}

pub struct AssetResolver<'a> {
    variants: &'a VariantResolver,
}

impl<'a> AssetResolver<'a> {
    pub fn new(variants: &'a VariantResolver) -> Self {
        Self { variants }
    }

    pub fn resolve(&self, items: &[AggregatedItem], asset_root: &Path) -> ResolvedAssets {
        let mut out = ResolvedAssets::default();

        for item in items {
            let variant = match self.variants.resolve(&item.variant_label) {
                Resolution::Canonical(v) => v,
                Resolution::Skip => {
                    debug!(
                        identifier = %item.identifier,
                        label = %item.variant_label,
                        "Skipping excluded variant"
                    );
                    out.skipped += 1;
                    continue;
                }
                Resolution::Unmapped(label) => {
                    warn!(
                        identifier = %item.identifier,
                        label = %label,
                        "Invalid variant title; item dropped"
                    );
                    out.unmapped.push(UnmappedItem {
                        identifier: item.identifier.clone(),
                        variant_label: label,
                    });
                    continue;
                }
            };

            let path = asset_path(asset_root, variant, &item.identifier);
            if path.is_file() {
                debug!(path = %path.display(), copies = item.quantity, "Found asset");
                out.records.push(AssetRecord::Found {
                    identifier: item.identifier.clone(),
                    variant,
                    path,
                    copies: item.quantity,
                });
            } else {
                warn!(path = %path.display(), "Image file not found");
                out.records.push(AssetRecord::Missing {
                    identifier: item.identifier.clone(),
                });
            }
        }

        info!(
            found = out.found_count(),
            missing = out.records.len() - out.found_count(),
            unmapped = out.unmapped.len(),
            skipped = out.skipped,
            "Resolved assets"
        );
        out
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("could not prepare staging folder {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct CopyFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: std::io::Error,
}

#[derive(Debug, Default)]
pub struct OrganizeReport {
    pub copied: Vec<PathBuf>,
    pub failures: Vec<CopyFailure>,
}

/// File names for `copies` prints of one identifier: `id.jpg`, or `id_1.jpg … id_n.jpg`.
pub fn staged_file_names(identifier: &str, copies: u64) -> Vec<String> {
    if copies == 1 {
        return vec![format!("{identifier}.{IMAGE_EXTENSION}")];
    }
    (1..=copies)
        .map(|i| format!("{identifier}_{i}.{IMAGE_EXTENSION}"))
        .collect()
}

/// Rebuild `<staging_root>/<variant>/` for every print size and copy each found asset
/// into it once per ordered print.
///
/// Existing staging folders are deleted first. A failed copy is logged and recorded in
/// the report; it does not stop the remaining copies. Failing to rebuild a folder aborts.
pub fn organize(
    records: &[AssetRecord],
    staging_root: &Path,
) -> Result<OrganizeReport, AssetError> {
    for variant in CanonicalVariant::ALL {
        let folder = staging_root.join(variant.as_str());
        if folder.exists() {
            info!(path = %folder.display(), "Cleaning up existing files");
            fs::remove_dir_all(&folder).map_err(|source| AssetError::Staging {
                path: folder.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&folder).map_err(|source| AssetError::Staging {
            path: folder.clone(),
            source,
        })?;
        debug!(path = %folder.display(), "Created staging folder");
    }

    let mut report = OrganizeReport::default();
    for record in records {
        let AssetRecord::Found {
            identifier,
            variant,
            path,
            copies,
        } = record
        else {
            continue;
        };
        let folder = staging_root.join(variant.as_str());
        for name in staged_file_names(identifier, *copies) {
            let destination = folder.join(name);
            match fs::copy(path, &destination) {
                Ok(_) => {
                    debug!(from = %path.display(), to = %destination.display(), "Copied asset");
                    report.copied.push(destination);
                }
                Err(e) => {
                    error!(
                        error = ?e,
                        from = %path.display(),
                        to = %destination.display(),
                        "Failed to copy image"
                    );
                    report.failures.push(CopyFailure {
                        source: path.clone(),
                        destination,
                        error: e,
                    });
                }
            }
        }
    }

    info!(
        copied = report.copied.len(),
        failed = report.failures.len(),
        staging_root = %staging_root.display(),
        "Organized assets by variant"
    );
    Ok(report)
}
