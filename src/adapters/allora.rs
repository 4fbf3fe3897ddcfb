//! Allora-style prediction service adapter
//!
//! Implements `Predictor` over the inference API. A 422 from the service
//! means the model declined to forecast at useful confidence; that maps to
//! `LowConfidence` and is not a circuit breaker failure.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::Predictor;
use crate::domain::{Direction, Prediction};
use crate::error::{HelmsmanError, Result};

pub struct AlloraClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
}

impl AlloraClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| HelmsmanError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: model_id.into(),
        })
    }
}

impl std::fmt::Debug for AlloraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloraClient")
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Predictor for AlloraClient {
    async fn get_prediction(&self, market_id: &str, horizon: Duration) -> Result<Prediction> {
        let url = format!("{}/v1/predict/{}", self.base_url, self.model_id);
        debug!(market_id, horizon_secs = horizon.as_secs(), "fetching prediction");

        let horizon_secs = horizon.as_secs().to_string();
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("market_id", market_id), ("horizon_secs", horizon_secs.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let detail = resp.text().await.unwrap_or_default();
            return Err(HelmsmanError::LowConfidence(detail));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Err(HelmsmanError::Transient(format!("{status}: {detail}")))
            } else {
                Err(HelmsmanError::InvalidMarketData(format!(
                    "{status}: {detail}"
                )))
            };
        }

        let api: ApiPrediction = resp.json().await?;
        api.into_prediction(market_id)
    }
}

#[derive(Debug, Deserialize)]
struct ApiPrediction {
    direction: String,
    predicted_price: Decimal,
    confidence: Decimal,
    interval_low: Decimal,
    interval_high: Decimal,
}

impl ApiPrediction {
    fn into_prediction(self, market_id: &str) -> Result<Prediction> {
        let direction = match self.direction.as_str() {
            "up" => Direction::Up,
            "down" => Direction::Down,
            other => {
                return Err(HelmsmanError::InvalidMarketData(format!(
                    "unknown prediction direction: {other}"
                )))
            }
        };

        Ok(Prediction {
            market_id: market_id.to_string(),
            direction,
            predicted_price: self.predicted_price,
            confidence: self.confidence,
            interval_low: self.interval_low,
            interval_high: self.interval_high,
            timestamp: Utc::now(),
        })
    }
}
