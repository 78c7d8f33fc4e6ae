//! Exercises the reqwest client against an in-process axum server that mimics the
//! order API, including the `Link` header used for cursor pagination.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use shopprint_core::config::ApiConfig;
use shopprint_core::contract::{FetchError, OrderSource};
use shopprint_core::download::{OrderFetcher, ShopifyClient, StopReason};

const TOKEN: &str = "test-token";

fn authorised(headers: &HeaderMap) -> bool {
    headers
        .get("X-Shopify-Access-Token")
        .and_then(|v| v.to_str().ok())
        == Some(TOKEN)
}

fn has_open_filters(q: &HashMap<String, String>) -> bool {
    q.get("status").map(String::as_str) == Some("open")
        && q.get("fulfillment_status").map(String::as_str) == Some("unfulfilled")
        && q.get("financial_status").map(String::as_str) == Some("paid")
}

fn order(sku: &str, variant: &str, qty: i64) -> serde_json::Value {
    json!({
        "id": 1,
        "name": format!("#{sku}"),
        "line_items": [{ "sku": sku, "variant_title": variant, "quantity": qty, "price": "12.00" }]
    })
}

async fn count(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorised(&headers) {
        let body = Json(json!({ "errors": "Invalid API key" }));
        return (StatusCode::UNAUTHORIZED, body).into_response();
    }
    if !has_open_filters(&q) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    // above one page's worth so the fetcher is allowed a second request
    Json(json!({ "count": 300 })).into_response()
}

async fn list(
    State(base): State<String>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !authorised(&headers) || q.get("limit").map(String::as_str) != Some("250") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let orders_url = format!("{base}/admin/api/2024-04/orders.json");
    match q.get("page_info").map(String::as_str) {
        None if has_open_filters(&q) => (
            [(
                header::LINK,
                format!(r#"<{orders_url}?limit=250&page_info=p2>; rel="next""#),
            )],
            Json(json!({ "orders": [order("A", "Small", 1), order("B", "8x10", 2)] })),
        )
            .into_response(),
        // follow-up requests must carry only limit and page_info
        Some("p2") if !q.contains_key("status") => (
            [(
                header::LINK,
                format!(r#"<{orders_url}?limit=250&page_info=p1>; rel="previous""#),
            )],
            Json(json!({ "orders": [order("C", "Large", 3)] })),
        )
            .into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn spawn_order_api() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new()
        .route("/admin/api/2024-04/orders/count.json", get(count))
        .route("/admin/api/2024-04/orders.json", get(list))
        .with_state(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn api_config(base: &str, token: &str) -> ApiConfig {
    ApiConfig {
        base_url: format!("{base}/admin"),
        api_version: "2024-04".into(),
        access_token: token.into(),
    }
}

#[tokio::test]
async fn test_client_pages_through_link_header() {
    let base = spawn_order_api().await;
    let client = ShopifyClient::new(&api_config(&base, TOKEN)).unwrap();

    let report = OrderFetcher::new(&client).fetch_open_orders().await;

    assert!(report.warning.is_none(), "unexpected warning: {:?}", report.warning);
    assert_eq!(report.total_open, 300);
    assert_eq!(report.page_requests, 2);
    assert_eq!(report.stop, StopReason::NoNextPage);
    let skus: Vec<_> = report
        .orders
        .iter()
        .flat_map(|o| o.line_items.iter())
        .filter_map(|li| li.sku.clone())
        .collect();
    assert_eq!(skus, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_first_page_exposes_next_cursor() {
    let base = spawn_order_api().await;
    let client = ShopifyClient::new(&api_config(&base, TOKEN)).unwrap();

    let first = client.fetch_page(None).await.unwrap();
    assert_eq!(first.orders.len(), 2);
    assert_eq!(first.next_cursor.as_deref(), Some("p2"));

    let second = client.fetch_page(first.next_cursor).await.unwrap();
    assert_eq!(second.orders.len(), 1);
    assert_eq!(second.next_cursor, None);
}

#[tokio::test]
async fn test_rejected_credential_surfaces_status_error() {
    let base = spawn_order_api().await;
    let client = ShopifyClient::new(&api_config(&base, "wrong")).unwrap();

    let err = client.count_open_orders().await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 401, .. }), "got {err:?}");

    let report = OrderFetcher::new(&client).fetch_open_orders().await;
    assert!(report.failed_before_first_page());
}

#[tokio::test]
async fn test_unreachable_host_is_a_network_error() {
    let client = ShopifyClient::new(&api_config("http://127.0.0.1:1", TOKEN)).unwrap();
    let err = client.count_open_orders().await.unwrap_err();
    assert!(matches!(err, FetchError::Network { .. }), "got {err:?}");
}

#[test]
fn test_empty_token_is_rejected() {
    let err = ShopifyClient::new(&api_config("https://shop.example", " ")).err().unwrap();
    assert!(matches!(err, FetchError::InvalidConfig(_)));
}
