use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use common::ConfigError;
use engine::{AttentionConfig, SentimentConfig, SignalConfig, TickerConfig};
use market::{CacheConfig, FeatureConfig};

pub const DEFAULT_PROVIDER_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // =========================
    // Text processing
    // =========================
    /// Ticker acceptance threshold, blacklist/whitelist and malformed-input limits.
    pub tickers: TickerConfig,

    /// Lexicon overlay path and negation/saturation tuning.
    pub sentiment: SentimentConfig,

    /// Number of blocking workers used for extraction and scoring.
    ///
    /// Zero means one per available CPU.
    pub scoring_workers: usize,

    // =========================
    // Attention
    // =========================
    /// Trailing window that mentions count towards velocity and momentum.
    pub attention: AttentionConfig,

    // =========================
    // Market data
    // =========================
    /// Base URL of the daily chart endpoint.
    pub provider_url: String,

    /// Lookback and abnormal-volume multiple used to derive price features.
    pub features: FeatureConfig,

    /// TTL and stale-grace multiple of the provider cache.
    ///
    /// Purpose:
    /// - one provider call per ticker per TTL, however many tickers overlap
    /// - ride out short provider outages with slightly stale data
    pub cache: CacheConfig,

    // =========================
    // Scoring
    // =========================
    /// Normalisation bounds, weights, BUY/SELL thresholds, minimum mentions.
    pub signal: SignalConfig,

    /// Emit JSON logs instead of human-readable ones.
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tickers: TickerConfig::default(),
            sentiment: SentimentConfig::default(),
            scoring_workers: 0,
            attention: AttentionConfig::default(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            features: FeatureConfig::default(),
            cache: CacheConfig::default(),
            signal: SignalConfig::default(),
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with `SIGNALS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Applies environment overrides through `lookup`.
    pub fn overlay_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = parse(&lookup, "SIGNALS_MIN_CONFIDENCE")? {
            self.tickers.min_confidence = v;
        }
        if let Some(v) = parse(&lookup, "SIGNALS_WINDOW_HOURS")? {
            self.attention.window_hours = v;
        }
        if let Some(v) = parse(&lookup, "SIGNALS_MIN_MENTIONS")? {
            self.signal.min_mentions = v;
        }
        if let Some(v) = parse(&lookup, "SIGNALS_CACHE_TTL_SECS")? {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = parse(&lookup, "SIGNALS_BUY_THRESHOLD")? {
            self.signal.buy_threshold = v;
        }
        if let Some(v) = parse(&lookup, "SIGNALS_SELL_THRESHOLD")? {
            self.signal.sell_threshold = v;
        }
        if let Some(url) = lookup("SIGNALS_PROVIDER_URL") {
            self.provider_url = url;
        }
        if let Some(path) = lookup("SIGNALS_LEXICON_PATH") {
            self.sentiment.lexicon_path = Some(path.into());
        }
        if let Some(env) = lookup("APP_ENV") {
            self.json_logs = env == "production";
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tickers.validate()?;
        self.sentiment.validate()?;
        self.attention.validate()?;
        self.features.validate()?;
        self.cache.validate()?;
        self.signal.validate()?;
        if self.provider_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "provider_url",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        if self.scoring_workers > 0 {
            return self.scoring_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: format!("{raw:?}: {e}"),
            }),
    }
}
