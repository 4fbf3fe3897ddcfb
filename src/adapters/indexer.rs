//! Injective-style indexer REST adapter
//!
//! Implements `BlockchainClient` over the indexer's HTTP API. Transport
//! failures, rate limits and 5xx responses map to `Transient`; order
//! rejections map to `Rejected` and bypass the circuit breaker.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::adapters::BlockchainClient;
use crate::domain::{ExecutionResult, MarketState, Order, PricePoint};
use crate::error::{HelmsmanError, Result};

/// REST client for an Injective-style spot market indexer.
///
/// # Security
/// The signing key authorizes order submission. It is held in a zeroizing
/// wrapper, excluded from `Debug` output, and never persisted or logged.
pub struct IndexerClient {
    http: reqwest::Client,
    base_url: String,
    signing_key: Zeroizing<String>,
}

impl IndexerClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        signing_key: Zeroizing<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| HelmsmanError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signing_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl std::fmt::Debug for IndexerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerClient")
            .field("base_url", &self.base_url)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl BlockchainClient for IndexerClient {
    async fn get_market_state(&self, market_id: &str) -> Result<MarketState> {
        let url = self.url(&format!("/api/v1/spot/markets/{market_id}"));
        debug!(market_id, "fetching market state");

        let resp = self.http.get(&url).send().await?;
        let resp = ensure_success(resp).await?;
        let api: ApiMarketState = resp.json().await?;
        api.try_into()
    }

    async fn get_price_history(
        &self,
        market_id: &str,
        lookback: Duration,
    ) -> Result<Vec<PricePoint>> {
        let url = self.url(&format!("/api/v1/spot/markets/{market_id}/history"));
        let resp = self
            .http
            .get(&url)
            .query(&[("lookback_secs", lookback.as_secs())])
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let api: Vec<ApiPricePoint> = resp.json().await?;
        api.into_iter().map(ApiPricePoint::try_into).collect()
    }

    async fn submit_order(&self, order: &Order) -> Result<ExecutionResult> {
        let url = self.url("/api/v1/spot/orders");
        let body = ApiOrderRequest {
            market_id: &order.market_id,
            side: order.side.as_str(),
            quantity: order.quantity,
            price: order.limit_price,
            stop_price: order.stop_price,
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.signing_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let receipt: ApiOrderReceipt = resp.json().await?;
            return Ok(receipt.into());
        }

        let detail = resp.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(HelmsmanError::Transient(format!(
                "order submission {status}: {detail}"
            )))
        } else {
            // The venue understood the order and said no
            Err(HelmsmanError::Rejected(format!(
                "order rejected ({status}): {detail}"
            )))
        }
    }
}

/// Classify non-2xx responses on read endpoints
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let detail = resp.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(HelmsmanError::Transient(format!("{status}: {detail}")))
    } else {
        Err(HelmsmanError::InvalidMarketData(format!(
            "{status}: {detail}"
        )))
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct ApiMarketState {
    market_id: String,
    best_bid: Decimal,
    best_ask: Decimal,
    last_price: Decimal,
    volume_24h: Decimal,
    updated_at: i64,
}

impl TryFrom<ApiMarketState> for MarketState {
    type Error = HelmsmanError;

    fn try_from(api: ApiMarketState) -> Result<Self> {
        Ok(MarketState {
            market_id: api.market_id,
            best_bid: api.best_bid,
            best_ask: api.best_ask,
            last_price: api.last_price,
            volume_24h: api.volume_24h,
            timestamp: parse_unix(api.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiPricePoint {
    timestamp: i64,
    price: Decimal,
    volume: Decimal,
}

impl TryFrom<ApiPricePoint> for PricePoint {
    type Error = HelmsmanError;

    fn try_from(api: ApiPricePoint) -> Result<Self> {
        Ok(PricePoint {
            timestamp: parse_unix(api.timestamp)?,
            price: api.price,
            volume: api.volume,
        })
    }
}

#[derive(Debug, Serialize)]
struct ApiOrderRequest<'a> {
    market_id: &'a str,
    side: &'a str,
    quantity: Decimal,
    price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ApiOrderReceipt {
    order_hash: String,
    filled_quantity: Decimal,
    fill_price: Decimal,
    #[serde(default)]
    fee: Decimal,
    timestamp: i64,
}

impl From<ApiOrderReceipt> for ExecutionResult {
    fn from(api: ApiOrderReceipt) -> Self {
        ExecutionResult {
            order_hash: api.order_hash,
            filled_quantity: api.filled_quantity,
            fill_price: api.fill_price,
            fee: api.fee,
            timestamp: parse_unix(api.timestamp).unwrap_or_else(|_| Utc::now()),
        }
    }
}

fn parse_unix(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| HelmsmanError::InvalidMarketData(format!("bad timestamp {secs}")))
}
