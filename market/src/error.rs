use thiserror::Error;

/// Failure talking to an external market-data provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("unknown ticker {0}")]
    UnknownTicker(String),
}

/// What the cache reports when it cannot produce features.
///
/// Cloneable so one in-flight fetch can hand the same outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("market data unavailable for {ticker}: {reason}")]
    ProviderUnavailable { ticker: String, reason: String },

    #[error("insufficient history for {ticker}: have {have} sessions, need {need}")]
    InsufficientHistory {
        ticker: String,
        have: usize,
        need: usize,
    },
}
