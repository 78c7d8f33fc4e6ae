//! # contract: wire records and the order-source seam
//!
//! Raw order records as the order API returns them, and the [`OrderSource`] trait that
//! the fetcher paginates over. The production implementation lives in
//! [`crate::download::ShopifyClient`]; tests use the generated `MockOrderSource`.
//!
//! Records here are deliberately loose (every line-item field optional): validation
//! happens in [`crate::aggregate`], where incomplete line items are dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Largest page the order API serves.
pub const PAGE_LIMIT: usize = 250;

/// One order as returned by the listing endpoint. Only the fields the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub line_items: Vec<RawLineItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub variant_title: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl RawLineItem {
    pub fn new(sku: &str, variant_title: &str, quantity: i64) -> Self {
        Self {
            sku: Some(sku.to_string()),
            variant_title: Some(variant_title.to_string()),
            quantity: Some(quantity),
        }
    }
}

/// A single page of the order listing plus the cursor for the page after it, if advertised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<RawOrder>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid API configuration: {0}")]
    InvalidConfig(String),
}

/// Read access to open, unfulfilled orders.
///
/// Implementors perform exactly one request per call. Pagination state belongs to the
/// caller ([`crate::download::OrderFetcher`]), which is what keeps the loop bounded.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Total number of open, unfulfilled orders.
    async fn count_open_orders(&self) -> Result<u64, FetchError>;

    /// Fetch one page. `None` requests the first page; otherwise the cursor from the
    /// previous page's `next_cursor`.
    async fn fetch_page(&self, cursor: Option<String>) -> Result<OrderPage, FetchError>;
}
