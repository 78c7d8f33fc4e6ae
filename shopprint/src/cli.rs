//!
//! This module implements the CLI interface for shopprint: command parsing, argument
//! validation and the async entrypoint [`run`].
//!
//! All pipeline logic (fetching, aggregation, asset resolution, PDF assembly) lives in
//! the [`shopprint-core`] crate. This module maps commands onto it and prints results.
//!
//! ## How To Use
//! - For command-line users: use the installed `shopprint` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`shopprint-core`]: ../../shopprint_core/

use crate::env_file::{EnvFile, CONFIG_KEYS};
use crate::load_config::{load_config, CliConfig};
use crate::render;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use shopprint_core::download::ShopifyClient;
use shopprint_core::pipeline;
use shopprint_core::variant::{CanonicalVariant, UnknownVariant};
use std::path::PathBuf;

/// CLI for shopprint: turn open store orders into print-ready files.
#[derive(Parser)]
#[clap(
    name = "shopprint",
    version,
    about = "Build print-ready PDFs and staging folders from open store orders"
)]
pub struct Cli {
    /// Optional YAML config file; environment variables override its values
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List open orders
    #[clap(subcommand)]
    Orders(OrdersCommand),
    /// Generate PDFs and organize print files
    #[clap(subcommand)]
    Files(FilesCommand),
    /// Show or edit settings stored in the .env file
    Config(ConfigArgs),
}

#[derive(Subcommand)]
pub enum OrdersCommand {
    /// Show open order items aggregated per SKU
    List,
}

#[derive(Subcommand)]
pub enum FilesCommand {
    /// Generate a PDF from open orders
    Pdf,
    /// Add an order item to the latest PDF
    Add {
        /// Item SKU
        #[clap(long)]
        sku: String,
        /// Print size, e.g. 8x10
        #[clap(long, value_parser = parse_variant)]
        variant: CanonicalVariant,
        /// Number of copies to add
        #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
        quantity: u64,
    },
    /// Rebuild the per-size staging folders from open orders
    Organize {
        /// Alternative staging root instead of FILES_PATH
        #[clap(long)]
        staging: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Env file to read and edit
    #[clap(long, default_value = ".env", global = true)]
    pub env_file: PathBuf,

    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration values
    Show,
    /// Set a configuration value
    Set {
        /// One of ADMIN_API_KEY, ASSET_PATH, FILES_PATH, PDF_DIR, STORE_NAME
        key: String,
        value: String,
    },
    /// Remove a configuration value
    Unset { key: String },
}

fn parse_variant(s: &str) -> Result<CanonicalVariant, String> {
    s.parse().map_err(|e: UnknownVariant| {
        let choices: Vec<&str> = CanonicalVariant::ALL.iter().map(|v| v.as_str()).collect();
        format!("{e}; expected one of {}", choices.join(", "))
    })
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Config(args) => run_config(args),
        Commands::Orders(cmd) => {
            let config = load_config(cli.config.as_deref())?;
            match cmd {
                OrdersCommand::List => list_orders(&config).await,
            }
        }
        Commands::Files(cmd) => {
            let config = load_config(cli.config.as_deref())?;
            match cmd {
                FilesCommand::Pdf => generate_pdf(&config).await,
                FilesCommand::Add {
                    sku,
                    variant,
                    quantity,
                } => add_item(&config, &sku, variant, quantity),
                FilesCommand::Organize { staging } => organize(&config, staging).await,
            }
        }
    }
}

async fn list_orders(config: &CliConfig) -> Result<()> {
    tracing::info!(command = "orders list", "Listing open orders");
    let pipeline_config = config.pipeline_config()?;
    let client = ShopifyClient::new(&pipeline_config.api)?;
    let open = pipeline::collect_open_items(&client, &pipeline_config)
        .await
        .context("Failed to list open orders")?;

    print!("{}", render::fetch_notice(&open.fetch));
    println!(
        "Found {} open orders with {} items\n",
        open.fetch.orders_fetched,
        open.items.len()
    );
    if !open.items.is_empty() {
        print!("{}", render::items_table(&open.items));
    }
    Ok(())
}

async fn generate_pdf(config: &CliConfig) -> Result<()> {
    tracing::info!(command = "files pdf", "Generating PDF from open orders");
    let pipeline_config = config.pipeline_config()?;
    let client = ShopifyClient::new(&pipeline_config.api)?;
    let report = match pipeline::print_open_orders(&client, &pipeline_config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(command = "files pdf", error = %e, "PDF generation failed");
            return Err(anyhow::Error::new(e).context("Failed to generate PDF"));
        }
    };

    print!("{}", render::fetch_notice(&report.fetch));
    let Some(assembly) = report.assembly else {
        println!("No open orders; nothing to print.");
        return Ok(());
    };
    println!("PDF generated: {}", assembly.document.display());
    print!(
        "{}",
        render::missing_list(&pipeline_config.paths.asset_root, &assembly.missing)
    );
    print!("{}", render::unmapped_list(&report.unmapped));
    Ok(())
}

fn add_item(config: &CliConfig, sku: &str, variant: CanonicalVariant, quantity: u64) -> Result<()> {
    tracing::info!(command = "files add", sku, %variant, quantity, "Adding order item");
    let result = pipeline::add_item(&config.paths, &config.document, sku, variant, quantity)
        .context("Failed to add order item")?;
    println!("Order item added. Updated PDF: {}", result.document.display());
    Ok(())
}

async fn organize(config: &CliConfig, staging: Option<PathBuf>) -> Result<()> {
    tracing::info!(command = "files organize", "Organizing print files");
    let pipeline_config = config.pipeline_config()?;
    let client = ShopifyClient::new(&pipeline_config.api)?;
    let summary = pipeline::organize_open_orders(&client, &pipeline_config, staging.as_deref())
        .await
        .context("Failed to organize print files")?;

    print!("{}", render::fetch_notice(&summary.fetch));
    println!(
        "Staged {} files in {}",
        summary.copied.len(),
        summary.staging_root.display()
    );
    for failure in &summary.copy_failures {
        println!(
            "Could not copy {} to {}: {}",
            failure.source.display(),
            failure.destination.display(),
            failure.error
        );
    }
    print!(
        "{}",
        render::missing_list(&pipeline_config.paths.asset_root, &summary.missing)
    );
    print!("{}", render::unmapped_list(&summary.unmapped));
    Ok(())
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let env_file = EnvFile::new(&args.env_file);
    match args.action {
        ConfigAction::Show => {
            tracing::info!(
                command = "config show",
                path = %env_file.path().display(),
                "Showing configuration"
            );
            println!("Current configuration ({})", env_file.path().display());
            print!("{}", render::config_table(&env_file.show()?));
        }
        ConfigAction::Set { key, value } => {
            env_file.set(&key, &value)?;
            println!("Set {} in {}", key.to_uppercase(), env_file.path().display());
        }
        ConfigAction::Unset { key } => {
            if env_file.unset(&key)? {
                println!("Unset {}", key.to_uppercase());
            } else {
                println!(
                    "{} was not set (valid keys: {})",
                    key.to_uppercase(),
                    CONFIG_KEYS.join(", ")
                );
            }
        }
    }
    Ok(())
}
