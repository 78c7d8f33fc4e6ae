//! Fetching open orders: the reqwest-backed [`ShopifyClient`] and the paginating [`OrderFetcher`].

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::LINK;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::contract::{FetchError, OrderPage, OrderSource, RawOrder, PAGE_LIMIT};

/// Filters shared by the count and the first listing request.
const OPEN_ORDER_FILTERS: [(&str, &str); 3] = [
    ("status", "open"),
    ("fulfillment_status", "unfulfilled"),
    ("financial_status", "paid"),
];

/// Order API client. One HTTP request per trait call, no retries.
pub struct ShopifyClient {
    http: Client,
    api_root: String,
    access_token: String,
}

impl ShopifyClient {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        if config.access_token.trim().is_empty() {
            return Err(FetchError::InvalidConfig("access token is empty".into()));
        }
        let base = config.base_url.trim_end_matches('/');
        Url::parse(base).map_err(|e| {
            FetchError::InvalidConfig(format!("base url '{}' is not a valid url: {e}", base))
        })?;
        let http = Client::builder()
            .user_agent(concat!("shopprint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::InvalidConfig(format!("http client: {e}")))?;
        info!(base_url = base, api_version = %config.api_version, "Initialised order API client");
        Ok(Self {
            http,
            api_root: format!("{}/api/{}", base, config.api_version),
            access_token: config.access_token.clone(),
        })
    }

    async fn get_json<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(T, Option<String>), FetchError>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!(url, ?query, "Sending order API request");
        let response = self
            .http
            .get(url)
            .header("X-Shopify-Access-Token", &self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, url, "Order API request failed");
                FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url, "Order API returned error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let link = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = response.json::<T>().await.map_err(|e| {
            error!(error = ?e, url, "Failed to decode order API response");
            FetchError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok((body, link))
    }
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    orders: Vec<RawOrder>,
}

#[async_trait]
impl OrderSource for ShopifyClient {
    async fn count_open_orders(&self) -> Result<u64, FetchError> {
        let url = format!("{}/orders/count.json", self.api_root);
        let query: Vec<(&str, String)> = OPEN_ORDER_FILTERS
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect();
        let (body, _) = self.get_json::<CountResponse>(&url, &query).await?;
        info!(count = body.count, "Fetched open order count");
        Ok(body.count)
    }

    async fn fetch_page(&self, cursor: Option<String>) -> Result<OrderPage, FetchError> {
        let url = format!("{}/orders.json", self.api_root);
        // Follow-up pages reject filter params; the cursor already encodes them.
        let mut query: Vec<(&str, String)> = vec![("limit", PAGE_LIMIT.to_string())];
        match &cursor {
            Some(token) => query.push(("page_info", token.clone())),
            None => query.extend(OPEN_ORDER_FILTERS.iter().map(|(k, v)| (*k, v.to_string()))),
        }
        let (body, link) = self.get_json::<OrdersResponse>(&url, &query).await?;
        let next_cursor = link.as_deref().and_then(parse_next_cursor);
        info!(
            orders = body.orders.len(),
            has_next = next_cursor.is_some(),
            "Fetched order page"
        );
        Ok(OrderPage {
            orders: body.orders,
            next_cursor,
        })
    }
}

fn link_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<([^>]*)>\s*;\s*rel\s*=\s*"?([A-Za-z]+)"?"#)
            .expect("link header regex is valid")
    })
}

/// Extract the `page_info` cursor of the `rel="next"` entry of a `Link` header.
///
/// Returns `None` when there is no next entry, or when its URL or query is malformed.
pub fn parse_next_cursor(header: &str) -> Option<String> {
    let next_url = link_entry_regex()
        .captures_iter(header)
        .find(|caps| caps[2].eq_ignore_ascii_case("next"))
        .map(|caps| caps[1].to_string())?;
    let url = match Url::parse(&next_url) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, link = %next_url, "Unparseable next link in Link header");
            return None;
        }
    };
    url.query_pairs()
        .find(|(k, _)| k == "page_info")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoOpenOrders,
    /// Fetched at least as many orders as the count endpoint reported.
    Complete,
    /// The last page advertised no next page (short stop if below the total).
    NoNextPage,
    /// Already issued `ceil(total / PAGE_LIMIT)` page requests.
    PageBudgetExhausted,
    /// The server handed back a cursor that was already requested.
    RepeatedCursor,
    /// A request failed; see [`FetchReport::warning`].
    Failed,
}

/// Everything one fetch produced. Failures are carried as a warning next to the pages
/// that did arrive, never as an `Err`.
#[derive(Debug)]
pub struct FetchReport {
    pub orders: Vec<RawOrder>,
    pub total_open: u64,
    pub page_requests: usize,
    pub stop: StopReason,
    pub warning: Option<FetchError>,
}

impl FetchReport {
    fn new() -> Self {
        Self {
            orders: Vec::new(),
            total_open: 0,
            page_requests: 0,
            stop: StopReason::NoOpenOrders,
            warning: None,
        }
    }

    /// True when a failure meant no order data arrived at all.
    pub fn failed_before_first_page(&self) -> bool {
        self.warning.is_some() && self.orders.is_empty()
    }
}

/// Paginates an [`OrderSource`] until the count is reached or the server stops
/// advertising further pages.
pub struct OrderFetcher<'a, S: OrderSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: OrderSource + ?Sized> OrderFetcher<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub async fn fetch_open_orders(&self) -> FetchReport {
        let mut report = FetchReport::new();

        report.total_open = match self.source.count_open_orders().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Counting open orders failed; nothing fetched");
                report.stop = StopReason::Failed;
                report.warning = Some(e);
                return report;
            }
        };
        if report.total_open == 0 {
            info!("No open orders");
            return report;
        }

        let max_pages = report.total_open.div_ceil(PAGE_LIMIT as u64) as usize;
        let mut requested: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;

        report.stop = loop {
            report.page_requests += 1;
            let page = match self.source.fetch_page(cursor.clone()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        error = %e,
                        fetched = report.orders.len(),
                        "Order page request failed; keeping pages fetched so far"
                    );
                    report.warning = Some(e);
                    break StopReason::Failed;
                }
            };
            report.orders.extend(page.orders);

            if report.orders.len() as u64 >= report.total_open {
                break StopReason::Complete;
            }
            let Some(next) = page.next_cursor else {
                warn!(
                    fetched = report.orders.len(),
                    total = report.total_open,
                    "No next page advertised before reaching the open order count"
                );
                break StopReason::NoNextPage;
            };
            if !requested.insert(next.clone()) {
                warn!(cursor = %next, "Server repeated a page cursor; stopping");
                break StopReason::RepeatedCursor;
            }
            if report.page_requests >= max_pages {
                warn!(max_pages, "Page budget exhausted before reaching the open order count");
                break StopReason::PageBudgetExhausted;
            }
            cursor = Some(next);
        };

        info!(
            orders = report.orders.len(),
            total = report.total_open,
            pages = report.page_requests,
            stop = ?report.stop,
            "Finished fetching open orders"
        );
        report
    }
}
