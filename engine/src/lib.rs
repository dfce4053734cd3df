//! Text-to-signal engine.
//!
//! Data flow:
//! TextUnit → TickerExtractor → TickerMention
//!          → SentimentScorer (Lexicon) → SentimentScore
//!          → AttentionAggregator (per-ticker rolling window)
//!          → SignalEngine (+ market::MarketDataCache) → Verdict

pub mod attention;
pub mod lexicon;
pub mod rolling_window;
pub mod sentiment;
pub mod signal;
pub mod tickers;
pub mod types;

pub use attention::{AttentionAggregator, AttentionConfig, AttentionWindowState};
pub use lexicon::{Lexicon, LexiconError};
pub use sentiment::{SentimentConfig, SentimentLabel, SentimentScorer};
pub use signal::{
    Abstention, Action, Feature, FeatureVector, FeatureWeights, Signal, SignalConfig, SignalEngine,
    Verdict, render_reasoning,
};
pub use tickers::{CorpusFrequency, TickerConfig, TickerExtractor};
pub use types::{MalformedInput, MentionKind, SentimentScore, SourceKind, TextUnit, TickerMention};
