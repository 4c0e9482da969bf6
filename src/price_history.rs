use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Url;
use tracing::{debug, error};

use crate::config::{identity, STOREFRONT_REFERER};
use crate::error::{AppError, Result};
use crate::types::{PriceHistoryDocument, ProductId, TimeRange};

/// Source of price history for a product. Failures surface as `None`.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn fetch_price_history(
        &self,
        product_id: &ProductId,
        range: TimeRange,
    ) -> Option<PriceHistoryDocument>;
}

/// Client for the `/price/history/{id}/detailed` endpoint. One attempt per
/// call, bounded by the configured timeout.
pub struct PriceHistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl PriceHistoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        // The upstream rejects requests that don't look browser-originated.
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(identity::USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(REFERER, HeaderValue::from_static(STOREFRONT_REFERER));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn history_url(&self, product_id: &ProductId, range: TimeRange) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            AppError::Config(format!("invalid price history url {:?}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("price history url {:?} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["price", "history", product_id.as_str(), "detailed"]);
        url.query_pairs_mut().clear().append_pair("range", range.as_str());
        Ok(url)
    }

    async fn try_fetch(&self, product_id: &ProductId, range: TimeRange) -> Result<PriceHistoryDocument> {
        let url = self.history_url(product_id, range)?;
        debug!("Fetching price history: {url}");
        let doc = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<PriceHistoryDocument>()
            .await?;
        Ok(doc)
    }
}

#[async_trait]
impl PriceHistorySource for PriceHistoryClient {
    async fn fetch_price_history(
        &self,
        product_id: &ProductId,
        range: TimeRange,
    ) -> Option<PriceHistoryDocument> {
        match self.try_fetch(product_id, range).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                error!("Failed to fetch price history for product {product_id}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap as AxumHeaders, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct RangeQuery {
        range: String,
    }

    async fn detailed(
        Path(id): Path<String>,
        Query(q): Query<RangeQuery>,
        headers: AxumHeaders,
    ) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
        let browser_like = headers.get("user-agent").is_some_and(|v| v.to_str().unwrap_or("").starts_with("Mozilla/"))
            && headers.get("referer").is_some()
            && headers.get("accept").is_some_and(|v| v == "application/json");
        if !browser_like {
            return Err(StatusCode::FORBIDDEN);
        }
        match id.as_str() {
            "500" => Err(StatusCode::INTERNAL_SERVER_ERROR),
            _ => Ok(Json(json!({
                "count": 1,
                "result": [{
                    "skuId": format!("{id}-1"),
                    "variant": "Normal",
                    "range": q.range,
                    "buckets": [{"marketPrice": "249.99", "bucketStartDate": "2025-01-01"}]
                }]
            }))),
        }
    }

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/price/history/:id/detailed", get(detailed))
            .route("/broken/price/history/:id/detailed", get(|| async { "<html>nope</html>" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[test]
    fn url_carries_id_and_range() {
        let client = PriceHistoryClient::new("https://infinite-api.tcgplayer.com", Duration::from_secs(1)).unwrap();
        let url = client.history_url(&ProductId::new("619672"), TimeRange::SemiAnnual).unwrap();
        assert_eq!(
            url.as_str(),
            "https://infinite-api.tcgplayer.com/price/history/619672/detailed?range=semi-annual"
        );
    }

    #[test]
    fn url_escapes_odd_ids() {
        let client = PriceHistoryClient::new("https://infinite-api.tcgplayer.com/", Duration::from_secs(1)).unwrap();
        let url = client.history_url(&ProductId::new("1/../2?x"), TimeRange::Month).unwrap();
        assert_eq!(url.path(), "/price/history/1%2F..%2F2%3Fx/detailed");
        assert_eq!(url.query(), Some("range=month"));
    }

    #[tokio::test]
    async fn success_passes_document_through() {
        let base = spawn_upstream().await;
        let client = PriceHistoryClient::new(base, Duration::from_secs(5)).unwrap();
        let doc = client
            .fetch_price_history(&ProductId::new("619672"), TimeRange::Annual)
            .await
            .expect("document");
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["result"][0]["skuId"], "619672-1");
        assert_eq!(doc["result"][0]["range"], "annual");
    }

    #[tokio::test]
    async fn non_success_status_is_none() {
        let base = spawn_upstream().await;
        let client = PriceHistoryClient::new(base, Duration::from_secs(5)).unwrap();
        assert!(client
            .fetch_price_history(&ProductId::new("500"), TimeRange::Quarter)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn non_json_body_is_none() {
        let base = spawn_upstream().await;
        let client = PriceHistoryClient::new(format!("{base}/broken"), Duration::from_secs(5)).unwrap();
        assert!(client
            .fetch_price_history(&ProductId::new("1"), TimeRange::Quarter)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_none() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = PriceHistoryClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(client
            .fetch_price_history(&ProductId::new("1"), TimeRange::Quarter)
            .await
            .is_none());
    }
}
