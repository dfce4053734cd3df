//! Blends attention, sentiment and market features into a BUY/SELL/HOLD signal.
//!
//! Flow per ticker:
//! AttentionAggregator::snapshot → MarketDataCache::get_features → FeatureVector
//! → normalized components → clamped weighted composite → action, confidence, reasoning
//!
//! Thin evidence or missing market data yields an [`Abstention`], never an
//! error and never a made-up signal.

mod config;
mod reasoning;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument};

use common::ConfigError;
use market::{MarketDataCache, MarketDataError, MarketDataProvider, MarketFeatureSnapshot};

use crate::attention::{AttentionAggregator, AttentionWindowState};

pub use config::{FeatureWeights, SignalConfig};
pub use reasoning::{NOTHING_NOTABLE, render_reasoning};

/// Component keys. Their serialized names are a stable contract with
/// downstream display layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Sentiment,
    Velocity,
    Volume,
    Momentum,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Sentiment,
        Feature::Velocity,
        Feature::Volume,
        Feature::Momentum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Sentiment => "sentiment",
            Feature::Velocity => "velocity",
            Feature::Volume => "volume",
            Feature::Momentum => "momentum",
        }
    }

    pub(crate) fn weight_key(&self) -> &'static str {
        match self {
            Feature::Sentiment => "signal.weights.sentiment",
            Feature::Velocity => "signal.weights.velocity",
            Feature::Volume => "signal.weights.volume",
            Feature::Momentum => "signal.weights.momentum",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    /// Composite, in `[-1, 1]`.
    pub score: f64,
    pub action: Action,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
    pub components: BTreeMap<Feature, f64>,
    pub metadata: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Why no signal was produced for a ticker.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Abstention {
    #[error("insufficient mentions: have {have}, need {need}")]
    InsufficientMentions { have: usize, need: usize },

    #[error("insufficient market history: have {have} sessions, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("market data provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    #[error("scoring failed: {reason}")]
    Failed { reason: String },
}

impl Abstention {
    /// Evidence was too thin. Not a failure of any component.
    pub fn is_insufficient_evidence(&self) -> bool {
        matches!(
            self,
            Abstention::InsufficientMentions { .. } | Abstention::InsufficientHistory { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Verdict {
    Emitted(Signal),
    Abstained(Abstention),
}

impl Verdict {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Verdict::Emitted(s) => Some(s),
            Verdict::Abstained(_) => None,
        }
    }
}

/// Everything the engine needs to score one ticker at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub ticker: String,
    pub as_of: DateTime<Utc>,
    pub attention: AttentionWindowState,
    pub market: MarketFeatureSnapshot,
}

pub struct SignalEngine<P> {
    cfg: SignalConfig,
    attention: Arc<AttentionAggregator>,
    market: Arc<MarketDataCache<P>>,
}

impl<P> SignalEngine<P> {
    pub fn new(
        cfg: SignalConfig,
        attention: Arc<AttentionAggregator>,
        market: Arc<MarketDataCache<P>>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            attention,
            market,
        })
    }

    pub fn config(&self) -> &SignalConfig {
        &self.cfg
    }

    /// Scores an assembled feature vector. Pure: no I/O, no shared state.
    pub fn score(&self, fv: &FeatureVector) -> Signal {
        let components = self.normalize(fv);
        let metadata = metadata(fv);
        self.decide(&fv.ticker, components, metadata, fv.as_of)
    }

    /// Maps raw features onto `[-1, 1]`.
    ///
    /// Velocity and volume carry no direction of their own; they take the
    /// sign of the sentiment component, so heavy bearish chatter pushes
    /// toward SELL rather than BUY.
    pub fn normalize(&self, fv: &FeatureVector) -> BTreeMap<Feature, f64> {
        let cfg = &self.cfg;

        let sentiment = bounded(fv.attention.momentum());
        let direction = if sentiment >= 0.0 { 1.0 } else { -1.0 };

        let velocity = bounded(fv.attention.velocity() / cfg.velocity_ceiling) * direction;

        let ratio = fv.market.volume_ratio;
        let volume_magnitude = if !ratio.is_finite() {
            0.0
        } else if ratio >= 1.0 {
            bounded((ratio - 1.0) / (cfg.volume_ratio_ceiling - 1.0))
        } else {
            bounded(ratio - 1.0)
        };
        let volume = volume_magnitude * direction;

        let momentum = bounded(fv.market.n_day_return / cfg.momentum_return_bound);

        BTreeMap::from([
            (Feature::Sentiment, sentiment),
            (Feature::Velocity, velocity),
            (Feature::Volume, volume),
            (Feature::Momentum, momentum),
        ])
    }

    /// Composite, action, confidence and reasoning for already-normalized components.
    ///
    /// Missing components count as zero.
    pub fn decide(
        &self,
        ticker: &str,
        components: BTreeMap<Feature, f64>,
        mut metadata: BTreeMap<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Signal {
        let cfg = &self.cfg;

        let contributions: Vec<f64> = Feature::ALL
            .iter()
            .map(|f| cfg.weights.get(*f) * components.get(f).copied().map(bounded).unwrap_or(0.0))
            .collect();
        let raw: f64 = contributions.iter().sum();
        let score = bounded(raw);

        let action = if score >= cfg.buy_threshold {
            Action::Buy
        } else if score <= cfg.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        let margin = self.margin(action, score);
        let agreement = agreement(&contributions);
        let confidence = (0.5 * margin + 0.5 * agreement).clamp(0.0, 1.0);

        let reasoning = render_reasoning(&components, cfg.notable_threshold);

        metadata.insert("composite_raw".into(), json!(raw));
        metadata.insert("threshold_margin".into(), json!(margin));
        metadata.insert("component_agreement".into(), json!(agreement));

        Signal {
            ticker: ticker.to_string(),
            score,
            action,
            confidence,
            reasoning,
            components,
            metadata,
            timestamp,
        }
    }

    /// How decisively `score` sits inside its action's region, in `[0, 1]`.
    fn margin(&self, action: Action, score: f64) -> f64 {
        let buy = self.cfg.buy_threshold;
        let sell = self.cfg.sell_threshold;
        let m = match action {
            Action::Buy => (score - buy) / (1.0 - buy),
            Action::Sell => (sell - score) / (sell + 1.0),
            Action::Hold => (buy - score).min(score - sell) / ((buy - sell) / 2.0),
        };
        m.clamp(0.0, 1.0)
    }
}

impl<P: MarketDataProvider> SignalEngine<P> {
    /// Signal for `ticker` as of `as_of`, or the reason none can be given.
    ///
    /// Never fails: provider trouble and thin evidence are both abstentions.
    #[instrument(skip(self), fields(ticker = %ticker), level = "debug")]
    pub async fn compute(&self, ticker: &str, as_of: DateTime<Utc>) -> Verdict {
        let need = self.cfg.min_mentions;
        let attention = match self.attention.snapshot(ticker, as_of) {
            Some(a) if a.mention_count >= need => a,
            other => {
                let have = other.map(|a| a.mention_count).unwrap_or(0);
                debug!(%ticker, have, need, "abstaining: too few mentions");
                return Verdict::Abstained(Abstention::InsufficientMentions { have, need });
            }
        };

        let market = match self.market.get_features(ticker, as_of).await {
            Ok(m) => m,
            Err(MarketDataError::InsufficientHistory { have, need, .. }) => {
                debug!(%ticker, have, need, "abstaining: short price history");
                return Verdict::Abstained(Abstention::InsufficientHistory { have, need });
            }
            Err(MarketDataError::ProviderUnavailable { reason, .. }) => {
                debug!(%ticker, %reason, "abstaining: provider unavailable");
                return Verdict::Abstained(Abstention::ProviderUnavailable { reason });
            }
        };

        let fv = FeatureVector {
            ticker: ticker.to_string(),
            as_of,
            attention,
            market,
        };
        let signal = self.score(&fv);
        info!(
            %ticker,
            action = %signal.action,
            score = signal.score,
            confidence = signal.confidence,
            "signal emitted"
        );
        Verdict::Emitted(signal)
    }
}

fn bounded(x: f64) -> f64 {
    if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 }
}

/// `|Σ c| / Σ |c|` over weighted contributions: 1 when every component
/// pulls the same way, near 0 when they cancel out.
fn agreement(contributions: &[f64]) -> f64 {
    let total: f64 = contributions.iter().map(|c| c.abs()).sum();
    if total == 0.0 {
        return 0.0;
    }
    (contributions.iter().sum::<f64>().abs() / total).clamp(0.0, 1.0)
}

fn metadata(fv: &FeatureVector) -> BTreeMap<String, Value> {
    let a = &fv.attention;
    let m = &fv.market;
    BTreeMap::from([
        ("mention_count".into(), json!(a.mention_count)),
        ("window_hours".into(), json!(a.window_hours())),
        ("mention_velocity".into(), json!(a.velocity())),
        ("engagement_sum".into(), json!(a.engagement_sum)),
        ("mean_sentiment".into(), json!(a.mean_sentiment())),
        ("sentiment_momentum".into(), json!(a.momentum())),
        ("session_date".into(), json!(m.session_date.to_string())),
        ("last_close".into(), json!(m.last_close)),
        ("return_1d".into(), json!(m.return_1d)),
        ("n_day_return".into(), json!(m.n_day_return)),
        ("volatility".into(), json!(m.volatility)),
        ("n_day_return_long".into(), json!(m.n_day_return_long)),
        ("volatility_long".into(), json!(m.volatility_long)),
        ("volume_ratio".into(), json!(m.volume_ratio)),
        ("abnormal_volume".into(), json!(m.abnormal_volume)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::AttentionConfig;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use market::{CacheConfig, DailyBar, FeatureConfig, ProviderError};

    struct FixedProvider {
        bars: Result<Vec<DailyBar>, String>,
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        async fn fetch(
            &self,
            _ticker: &str,
            _lookback_days: u32,
        ) -> Result<Vec<DailyBar>, ProviderError> {
            self.bars.clone().map_err(ProviderError::Unavailable)
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 29, 21, 0, 0).unwrap()
    }

    /// Six flat sessions ending 2024-01-26 with the last volume at `last_ratio` of the rest.
    fn flat_bars(last_ratio: f64) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 21).unwrap();
        (0..6)
            .map(|i| DailyBar {
                date: start + Duration::days(i),
                open: 20.0,
                high: 20.0,
                low: 20.0,
                close: 20.0,
                volume: if i == 5 { 1_000.0 * last_ratio } else { 1_000.0 },
            })
            .collect()
    }

    fn build(
        cfg: SignalConfig,
        window_hours: f64,
        bars: Result<Vec<DailyBar>, String>,
    ) -> (SignalEngine<FixedProvider>, Arc<AttentionAggregator>) {
        let attention =
            Arc::new(AttentionAggregator::new(&AttentionConfig { window_hours }).unwrap());
        let provider = Arc::new(FixedProvider { bars });
        let cache = Arc::new(MarketDataCache::new(
            provider,
            FeatureConfig::default(),
            CacheConfig::default(),
        ));
        let engine = SignalEngine::new(cfg, attention.clone(), cache).unwrap();
        (engine, attention)
    }

    fn components(s: f64, v: f64, vol: f64, m: f64) -> BTreeMap<Feature, f64> {
        BTreeMap::from([
            (Feature::Sentiment, s),
            (Feature::Velocity, v),
            (Feature::Volume, vol),
            (Feature::Momentum, m),
        ])
    }

    #[test]
    fn composite_is_weighted_sum() {
        let cfg = SignalConfig {
            weights: FeatureWeights {
                sentiment: 0.4,
                velocity: 0.3,
                volume: 0.2,
                momentum: 0.1,
            },
            buy_threshold: 0.5,
            ..Default::default()
        };
        let (engine, _) = build(cfg, 6.0, Ok(vec![]));
        let s = engine.decide("GME", components(0.8, 0.6, 0.3, 0.0), BTreeMap::new(), as_of());

        assert!((s.score - 0.56).abs() < 1e-12);
        assert_eq!(s.action, Action::Buy);
    }

    #[test]
    fn composite_is_clamped() {
        let cfg = SignalConfig {
            weights: FeatureWeights {
                sentiment: 1.0,
                velocity: 1.0,
                volume: 1.0,
                momentum: 1.0,
            },
            ..Default::default()
        };
        let (engine, _) = build(cfg, 6.0, Ok(vec![]));
        let s = engine.decide("GME", components(1.0, 1.0, 1.0, 1.0), BTreeMap::new(), as_of());
        assert_eq!(s.score, 1.0);
        assert_eq!(s.metadata["composite_raw"], json!(4.0));
    }

    #[test]
    fn thresholds_are_inclusive_and_asymmetric() {
        let (engine, _) = build(SignalConfig::default(), 6.0, Ok(vec![]));
        let only_sentiment = |x: f64| {
            let mut c = components(0.0, 0.0, 0.0, 0.0);
            c.insert(Feature::Sentiment, x);
            c
        };
        let weights_one = SignalConfig {
            weights: FeatureWeights {
                sentiment: 1.0,
                velocity: 0.0,
                volume: 0.0,
                momentum: 0.0,
            },
            ..Default::default()
        };
        let (engine1, _) = build(weights_one, 6.0, Ok(vec![]));

        let action = |e: &SignalEngine<FixedProvider>, s: f64| {
            e.decide("X", only_sentiment(s), BTreeMap::new(), as_of()).action
        };
        assert_eq!(action(&engine1, 0.6), Action::Buy);
        assert_eq!(action(&engine1, -0.4), Action::Sell);
        assert_eq!(action(&engine1, 0.5), Action::Hold);
        assert_eq!(action(&engine, 0.0), Action::Hold);
    }

    #[test]
    fn agreeing_components_are_more_confident_than_conflicting_ones() {
        let (engine, _) = build(SignalConfig::default(), 6.0, Ok(vec![]));
        let agreeing = engine.decide("X", components(0.2, 0.2, 0.2, 0.2), BTreeMap::new(), as_of());
        let conflicting =
            engine.decide("X", components(0.8, -0.6, 0.2, -0.1), BTreeMap::new(), as_of());

        assert_eq!(agreeing.action, Action::Hold);
        assert_eq!(conflicting.action, Action::Hold);
        assert!(agreeing.confidence > conflicting.confidence);
        assert!((0.0..=1.0).contains(&conflicting.confidence));
    }

    #[test]
    fn all_zero_components_have_zero_agreement() {
        let (engine, _) = build(SignalConfig::default(), 6.0, Ok(vec![]));
        let s = engine.decide("X", components(0.0, 0.0, 0.0, 0.0), BTreeMap::new(), as_of());
        assert_eq!(s.metadata["component_agreement"], json!(0.0));
        assert_eq!(s.reasoning, NOTHING_NOTABLE);
    }

    #[test]
    fn reasoning_is_reproducible_from_components() {
        let (engine, _) = build(SignalConfig::default(), 6.0, Ok(vec![]));
        let s = engine.decide("X", components(0.9, 0.7, -0.5, 0.1), BTreeMap::new(), as_of());
        assert_eq!(s.reasoning, render_reasoning(&s.components, 0.4));
    }

    #[test]
    fn components_serialize_with_stable_keys() {
        let (engine, _) = build(SignalConfig::default(), 6.0, Ok(vec![]));
        let s = engine.decide("X", components(0.1, 0.2, 0.3, 0.4), BTreeMap::new(), as_of());
        let v = serde_json::to_value(&s).unwrap();

        let keys: Vec<_> = v["components"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["momentum", "sentiment", "velocity", "volume"]);
        assert_eq!(v["action"], json!("HOLD"));
    }

    #[test]
    fn abstention_kind_does_not_clash_with_its_reason() {
        let verdict = Verdict::Abstained(Abstention::ProviderUnavailable {
            reason: "timeout".into(),
        });
        let v = serde_json::to_value(&verdict).unwrap();
        assert_eq!(v["status"], json!("abstained"));
        assert_eq!(v["detail"]["kind"], json!("provider_unavailable"));
        assert_eq!(v["detail"]["reason"], json!("timeout"));

        let back: Verdict = serde_json::from_value(v).unwrap();
        assert_eq!(back, verdict);
    }

    #[tokio::test]
    async fn abstains_below_min_mentions() {
        let (engine, attention) = build(SignalConfig::default(), 6.0, Ok(flat_bars(1.0)));

        let v = engine.compute("GME", as_of()).await;
        assert_eq!(
            v,
            Verdict::Abstained(Abstention::InsufficientMentions { have: 0, need: 3 })
        );

        attention.record("GME", as_of(), 1.0, 0.9);
        attention.record("GME", as_of(), 1.0, 0.9);
        let v = engine.compute("GME", as_of()).await;
        assert_eq!(
            v,
            Verdict::Abstained(Abstention::InsufficientMentions { have: 2, need: 3 })
        );
    }

    #[tokio::test]
    async fn abstains_on_short_history() {
        let short = flat_bars(1.0)[..3].to_vec();
        let (engine, attention) = build(SignalConfig::default(), 6.0, Ok(short));
        for _ in 0..5 {
            attention.record("GME", as_of(), 1.0, 0.5);
        }
        let v = engine.compute("GME", as_of()).await;
        assert_eq!(
            v,
            Verdict::Abstained(Abstention::InsufficientHistory { have: 3, need: 6 })
        );
    }

    #[tokio::test]
    async fn abstains_when_provider_is_down() {
        let (engine, attention) = build(SignalConfig::default(), 6.0, Err("timeout".into()));
        for _ in 0..5 {
            attention.record("GME", as_of(), 1.0, 0.5);
        }
        let v = engine.compute("GME", as_of()).await;
        assert!(matches!(
            v,
            Verdict::Abstained(Abstention::ProviderUnavailable { ref reason })
                if reason.contains("timeout")
        ));
    }

    #[tokio::test]
    async fn heavy_bullish_chatter_with_volume_spike_is_buy() {
        let (engine, attention) = build(SignalConfig::default(), 1.0, Ok(flat_bars(2.1)));
        for i in 0..10 {
            attention.record("GME", as_of() - Duration::minutes(i * 5), 8.0, 0.95);
        }

        let v = engine.compute("GME", as_of()).await;
        let s = v.signal().expect("signal emitted");

        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.components[&Feature::Velocity], 1.0);
        assert!((s.components[&Feature::Volume] - 0.55).abs() < 1e-9);
        assert_eq!(s.components[&Feature::Momentum], 0.0);
        assert!(s.reasoning.contains("high mention velocity"));
        assert!(s.reasoning.contains("unusual volume"));
        assert_eq!(s.metadata["mention_count"], json!(10));
        // Six sessions cover the short window only.
        assert_eq!(s.metadata["n_day_return_long"], Value::Null);
        assert_eq!(s.metadata["volatility_long"], Value::Null);
    }

    #[tokio::test]
    async fn bearish_chatter_signs_velocity_and_volume_negative() {
        let (engine, attention) = build(SignalConfig::default(), 1.0, Ok(flat_bars(2.1)));
        for _ in 0..10 {
            attention.record("AMC", as_of(), 4.0, -0.9);
        }
        let s = engine.compute("AMC", as_of()).await.signal().cloned().unwrap();

        assert_eq!(s.action, Action::Sell);
        assert_eq!(s.components[&Feature::Velocity], -1.0);
        assert!(s.components[&Feature::Volume] < 0.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::attention::AttentionConfig;
    use async_trait::async_trait;
    use market::{CacheConfig, DailyBar, FeatureConfig, ProviderError};
    use proptest::prelude::*;

    struct NoProvider;

    #[async_trait]
    impl MarketDataProvider for NoProvider {
        async fn fetch(
            &self,
            _ticker: &str,
            _lookback_days: u32,
        ) -> Result<Vec<DailyBar>, ProviderError> {
            Err(ProviderError::Unavailable("offline".into()))
        }
    }

    fn component() -> impl Strategy<Value = f64> {
        -1.0f64..=1.0
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn outputs_stay_in_range(
            s in component(), v in component(), vol in component(), m in component(),
            ws in 0.0f64..=1.0, wv in 0.0f64..=1.0, wvol in 0.0f64..=1.0, wm in 0.01f64..=1.0,
        ) {
            let cfg = SignalConfig {
                weights: FeatureWeights { sentiment: ws, velocity: wv, volume: wvol, momentum: wm },
                ..Default::default()
            };
            let engine = SignalEngine::new(
                cfg,
                Arc::new(AttentionAggregator::new(&AttentionConfig::default()).unwrap()),
                Arc::new(MarketDataCache::new(
                    Arc::new(NoProvider),
                    FeatureConfig::default(),
                    CacheConfig::default(),
                )),
            )
            .unwrap();
            let components = BTreeMap::from([
                (Feature::Sentiment, s),
                (Feature::Velocity, v),
                (Feature::Volume, vol),
                (Feature::Momentum, m),
            ]);
            let signal = engine.decide("X", components, BTreeMap::new(), Utc::now());

            prop_assert!((-1.0..=1.0).contains(&signal.score));
            prop_assert!((0.0..=1.0).contains(&signal.confidence));
            match signal.action {
                Action::Buy => prop_assert!(signal.score >= 0.6),
                Action::Sell => prop_assert!(signal.score <= -0.4),
                Action::Hold => prop_assert!(signal.score > -0.4 && signal.score < 0.6),
            }
        }
    }
}
