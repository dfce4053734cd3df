//! HTTP market-data provider for Yahoo-style chart endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::ProviderError;
use crate::provider::MarketDataProvider;
use crate::types::DailyBar;

#[derive(Clone)]
pub struct HttpChartProvider {
    http: Client,
    url: String,
}

impl HttpChartProvider {
    pub fn new(url: String) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent("signals/0.1")
            .build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for HttpChartProvider {
    #[instrument(skip(self), fields(ticker = %ticker), level = "debug")]
    async fn fetch(
        &self,
        ticker: &str,
        lookback_days: u32,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(i64::from(lookback_days));
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.url,
            ticker,
            start.timestamp(),
            end.timestamp()
        );

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => return Err(ProviderError::UnknownTicker(ticker.to_string())),
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                return Err(ProviderError::Unavailable(format!("status {s}")));
            }
            _ => {}
        }

        let envelope: ChartEnvelope = resp.error_for_status()?.json().await?;
        let bars = parse_chart(ticker, envelope)?;

        debug!(rows = bars.len(), "chart history fetched");

        Ok(bars)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteSeries>,
}

/// Columns may contain nulls for halted or partial sessions.
#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn parse_chart(ticker: &str, envelope: ChartEnvelope) -> Result<Vec<DailyBar>, ProviderError> {
    if let Some(err) = envelope.chart.error {
        return if err.code.eq_ignore_ascii_case("Not Found") {
            Err(ProviderError::UnknownTicker(ticker.to_string()))
        } else {
            Err(ProviderError::InvalidResponse(format!(
                "{}: {}",
                err.code, err.description
            )))
        };
    }

    let result = envelope
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
        .ok_or_else(|| ProviderError::InvalidResponse("empty chart result".into()))?;

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let col = |c: &Vec<Option<f64>>| c.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            col(&quote.open),
            col(&quote.high),
            col(&quote.low),
            col(&quote.close),
            col(&quote.volume),
        ) else {
            continue;
        };
        let Some(at) = DateTime::<Utc>::from_timestamp(*ts, 0) else {
            continue;
        };

        bars.push(DailyBar {
            date: at.date_naive(),
            open,
            high,
            low,
            close,
            volume,
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
