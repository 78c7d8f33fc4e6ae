//! High-level pipeline: fetch → aggregate → resolve assets → assemble document.
//!
//! Each entry point runs the stages strictly in sequence and returns a complete report or
//! a [`PipelineError`]. Per-item problems (missing assets, unmapped labels, failed copies)
//! are data in the reports. A run aborts only when:
//!   - the order API failed before a single order arrived,
//!   - aggregation rejected conflicting labels (only under [`LabelPolicy::Reject`]),
//!   - there is nothing to assemble, or the output/staging location is unusable.
//!
//! Runs must not overlap: the output directory and the "most recent document" choice
//! are unguarded shared state.
//!
//! [`LabelPolicy::Reject`]: crate::aggregate::LabelPolicy::Reject

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::aggregate::{AggregateError, AggregatedItem, OrderAggregator};
use crate::assets::{self, AssetError, AssetResolver, CopyFailure, UnmappedItem};
use crate::config::{DocumentConfig, PathsConfig, PipelineConfig};
use crate::contract::{FetchError, OrderSource};
use crate::document::{DocumentAssembler, DocumentError};
use crate::download::{FetchReport, OrderFetcher, StopReason};
use crate::variant::{CanonicalVariant, VariantResolver};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching open orders failed: {0}")]
    Network(#[source] FetchError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Assets(#[from] AssetError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("no {variant} asset for {identifier}")]
    MissingAsset {
        identifier: String,
        variant: CanonicalVariant,
    },
}

/// How the fetch went, without the order payloads.
#[derive(Debug)]
pub struct FetchSummary {
    pub total_open: u64,
    pub orders_fetched: usize,
    pub page_requests: usize,
    pub stop: StopReason,
    /// A failure that cut pagination short after some pages arrived.
    pub warning: Option<FetchError>,
}

impl FetchSummary {
    fn from_report(report: FetchReport) -> Self {
        Self {
            total_open: report.total_open,
            orders_fetched: report.orders.len(),
            page_requests: report.page_requests,
            stop: report.stop,
            warning: report.warning,
        }
    }
}

/// A written document and the identifiers that could not be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyResult {
    pub document: PathBuf,
    pub missing: Vec<String>,
}

#[derive(Debug)]
pub struct OpenItems {
    pub items: Vec<AggregatedItem>,
    pub fetch: FetchSummary,
}

#[derive(Debug)]
pub struct PrintReport {
    /// `None` when there were no open orders at all.
    pub assembly: Option<AssemblyResult>,
    pub unmapped: Vec<UnmappedItem>,
    pub skipped: usize,
    pub fetch: FetchSummary,
}

#[derive(Debug)]
pub struct OrganizeSummary {
    pub staging_root: PathBuf,
    pub copied: Vec<PathBuf>,
    pub copy_failures: Vec<CopyFailure>,
    pub missing: Vec<String>,
    pub unmapped: Vec<UnmappedItem>,
    pub fetch: FetchSummary,
}

/// Fetch and aggregate open orders.
pub async fn collect_open_items<S>(
    source: &S,
    config: &PipelineConfig,
) -> Result<OpenItems, PipelineError>
where
    S: OrderSource + ?Sized,
{
    let mut report = OrderFetcher::new(source).fetch_open_orders().await;
    if report.failed_before_first_page() {
        if let Some(e) = report.warning.take() {
            error!(error = %e, "No orders fetched");
            return Err(PipelineError::Network(e));
        }
    }
    if let Some(w) = &report.warning {
        warn!(warning = %w, fetched = report.orders.len(), "Continuing with a partial order set");
    }

    let items = OrderAggregator::new(config.label_policy).aggregate(&report.orders)?;
    Ok(OpenItems {
        items,
        fetch: FetchSummary::from_report(report),
    })
}

/// Fetch open orders and assemble one document from every asset found.
pub async fn print_open_orders<S>(
    source: &S,
    config: &PipelineConfig,
) -> Result<PrintReport, PipelineError>
where
    S: OrderSource + ?Sized,
{
    info!("[PIPELINE] Starting print run");
    let open = collect_open_items(source, config).await?;
    if open.fetch.stop == StopReason::NoOpenOrders {
        info!("[PIPELINE] No open orders; nothing to print");
        return Ok(PrintReport {
            assembly: None,
            unmapped: Vec::new(),
            skipped: 0,
            fetch: open.fetch,
        });
    }

    let variants = VariantResolver::new(&config.variants);
    let resolved = AssetResolver::new(&variants).resolve(&open.items, &config.paths.asset_root);

    let assembler = DocumentAssembler::new(&config.paths.output_dir, &config.document);
    let document = assembler.create_document(&resolved.images())?;
    info!(path = %document.display(), "[PIPELINE] Print run complete");

    Ok(PrintReport {
        assembly: Some(AssemblyResult {
            document,
            missing: resolved.missing(),
        }),
        unmapped: resolved.unmapped,
        skipped: resolved.skipped,
        fetch: open.fetch,
    })
}

/// Fetch open orders and rebuild the staging folders with one file per print.
///
/// `staging_root` overrides the configured staging root.
pub async fn organize_open_orders<S>(
    source: &S,
    config: &PipelineConfig,
    staging_root: Option<&Path>,
) -> Result<OrganizeSummary, PipelineError>
where
    S: OrderSource + ?Sized,
{
    let staging_root = staging_root
        .unwrap_or(config.paths.staging_root.as_path())
        .to_path_buf();
    info!(staging_root = %staging_root.display(), "[PIPELINE] Starting organize run");
    let open = collect_open_items(source, config).await?;

    let variants = VariantResolver::new(&config.variants);
    let resolved = AssetResolver::new(&variants).resolve(&open.items, &config.paths.asset_root);
    let report = assets::organize(&resolved.records, &staging_root)?;

    Ok(OrganizeSummary {
        staging_root,
        copied: report.copied,
        copy_failures: report.failures,
        missing: resolved.missing(),
        unmapped: resolved.unmapped,
        fetch: open.fetch,
    })
}

/// Append `quantity` pages of one identifier's asset to the most recent document.
///
/// Works from local files only; no order API access is needed.
pub fn add_item(
    paths: &PathsConfig,
    document: &DocumentConfig,
    identifier: &str,
    variant: CanonicalVariant,
    quantity: u64,
) -> Result<AssemblyResult, PipelineError> {
    let path = assets::asset_path(&paths.asset_root, variant, identifier);
    if !path.is_file() {
        warn!(path = %path.display(), "No asset for requested item");
        return Err(PipelineError::MissingAsset {
            identifier: identifier.to_string(),
            variant,
        });
    }

    let assembler = DocumentAssembler::new(&paths.output_dir, document);
    let document = assembler.append_images(&[(path, quantity)])?;
    info!(identifier, %variant, quantity, path = %document.display(), "Order item added");
    Ok(AssemblyResult {
        document,
        missing: Vec::new(),
    })
}
