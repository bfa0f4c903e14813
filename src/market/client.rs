//! Exchange REST collaborator.
//!
//! The engine only needs three public queries: the market listing, funding
//! history and the next funding rate. They sit behind [`ExchangeClient`] so
//! tests can swap in [`MockExchangeClient`](super::mock::MockExchangeClient).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::types::{FundingStats, MarketInfo, MarketList};
use crate::config::Config;
use crate::error::ExchangeError;
use crate::metrics;

/// Market data queries the engine issues against the exchange.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// All listed markets grouped by kind.
    async fn fetch_market_list(&self) -> Result<MarketList, ExchangeError>;

    /// Settled hourly funding rates for `market` between `start` and `end`,
    /// oldest first.
    async fn fetch_funding_rate_history(
        &self,
        market: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Decimal>, ExchangeError>;

    /// Predicted rate for the upcoming funding interval.
    async fn fetch_next_funding_stats(&self, market: &str) -> Result<FundingStats, ExchangeError>;
}

/// `{success, result}` wrapper around every REST response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    result: Option<T>,
    error: Option<String>,
}

/// One settled funding payment.
#[derive(Debug, Clone, Deserialize)]
struct FundingRateRow {
    rate: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
}

/// reqwest-backed [`ExchangeClient`].
#[derive(Debug, Clone)]
pub struct RestExchangeClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// REST base URL.
    base_url: String,
    /// API key sent with every request, when configured.
    api_key: Option<String>,
    /// Subaccount header, when configured.
    subaccount: Option<String>,
}

impl RestExchangeClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(2))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: config.exchange_rest_url.trim_end_matches('/').to_string(),
            api_key: config.exchange_api_key.clone(),
            subaccount: config.exchange_subaccount.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let start = Instant::now();
        let result = self.get_inner(path, query).await;
        metrics::record_http_latency(start, endpoint);
        if result.is_err() {
            metrics::inc_exchange_query_failures(endpoint);
        }
        result
    }

    async fn get_inner<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("FTX-KEY", key);
        }
        if let Some(sub) = &self.subaccount {
            request = request.header("FTX-SUBACCOUNT", sub);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ExchangeError::Status {
                endpoint: path.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        parse_envelope(path, &body)
    }
}

/// Unwrap a `{success, result}` body.
fn parse_envelope<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ExchangeError> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| ExchangeError::Parse {
        endpoint: path.to_string(),
        reason: e.to_string(),
    })?;

    if !envelope.success {
        return Err(ExchangeError::Rejected {
            endpoint: path.to_string(),
            reason: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    envelope.result.ok_or_else(|| ExchangeError::Parse {
        endpoint: path.to_string(),
        reason: "missing result".to_string(),
    })
}

#[async_trait]
impl ExchangeClient for RestExchangeClient {
    #[instrument(skip(self))]
    async fn fetch_market_list(&self) -> Result<MarketList, ExchangeError> {
        let markets: Vec<MarketInfo> = self.get("markets", "/api/markets", &[]).await?;
        let list = MarketList::from_markets(markets);
        debug!(
            perpetuals = list.perpetuals.len(),
            quarterlies = list.quarterlies.len(),
            spots = list.spots.len(),
            "Fetched market list"
        );
        Ok(list)
    }

    #[instrument(skip(self), fields(market = %market))]
    async fn fetch_funding_rate_history(
        &self,
        market: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Decimal>, ExchangeError> {
        let query = [
            ("start_time", start.unix_timestamp().to_string()),
            ("end_time", end.unix_timestamp().to_string()),
            ("future", market.to_string()),
        ];
        let mut rows: Vec<FundingRateRow> =
            self.get("funding_rates", "/api/funding_rates", &query).await?;

        // the exchange lists newest first
        rows.sort_by_key(|r| r.time);
        debug!(count = rows.len(), "Fetched funding history");
        Ok(rows.into_iter().map(|r| r.rate).collect())
    }

    #[instrument(skip(self), fields(market = %market))]
    async fn fetch_next_funding_stats(&self, market: &str) -> Result<FundingStats, ExchangeError> {
        let path = format!("/api/futures/{market}/stats");
        self.get("future_stats", &path, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn envelope_success_yields_result() {
        let body = r#"{"success":true,"result":{"nextFundingRate":0.0001}}"#;

        let stats: FundingStats = parse_envelope("/api/futures/BTC-PERP/stats", body).unwrap();

        assert_eq!(stats.next_funding_rate, dec!(0.0001));
    }

    #[test]
    fn envelope_failure_is_rejected() {
        let body = r#"{"success":false,"error":"No such future"}"#;

        let err = parse_envelope::<FundingStats>("/api/futures/NOPE-PERP/stats", body).unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::Rejected { ref reason, .. } if reason == "No such future"
        ));
    }

    #[test]
    fn envelope_garbage_is_a_parse_error() {
        let err = parse_envelope::<FundingStats>("/api/markets", "<html>").unwrap_err();

        assert!(matches!(err, ExchangeError::Parse { .. }));
    }

    #[test]
    fn funding_rows_sort_chronologically() {
        let body = r#"{"success":true,"result":[
            {"future":"BTC-PERP","rate":0.0002,"time":"2021-03-01T02:00:00+00:00"},
            {"future":"BTC-PERP","rate":0.0001,"time":"2021-03-01T01:00:00+00:00"}
        ]}"#;

        let mut rows: Vec<FundingRateRow> = parse_envelope("/api/funding_rates", body).unwrap();
        rows.sort_by_key(|r| r.time);

        assert_eq!(rows[0].rate, dec!(0.0001));
        assert_eq!(rows[1].rate, dec!(0.0002));
    }
}
