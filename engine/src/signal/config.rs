use serde::{Deserialize, Serialize};

use common::ConfigError;

use super::Feature;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub sentiment: f64,
    pub velocity: f64,
    pub volume: f64,
    pub momentum: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.35,
            velocity: 0.30,
            volume: 0.20,
            momentum: 0.15,
        }
    }
}

impl FeatureWeights {
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Sentiment => self.sentiment,
            Feature::Velocity => self.velocity,
            Feature::Volume => self.volume,
            Feature::Momentum => self.momentum,
        }
    }

    pub fn total(&self) -> f64 {
        Feature::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub weights: FeatureWeights,

    /// Composite at or above this is a BUY.
    pub buy_threshold: f64,

    /// Composite at or below this is a SELL.
    pub sell_threshold: f64,

    /// Fewer in-window mentions than this and no signal is produced.
    pub min_mentions: usize,

    /// Mentions per hour that saturate the velocity component.
    pub velocity_ceiling: f64,

    /// Volume ratio that saturates the volume component. Must exceed 1.
    pub volume_ratio_ceiling: f64,

    /// Absolute n-day return that saturates the momentum component.
    pub momentum_return_bound: f64,

    /// Components with |value| above this are named in the reasoning.
    pub notable_threshold: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            buy_threshold: 0.6,
            sell_threshold: -0.4,
            min_mentions: 3,
            velocity_ceiling: 10.0,
            volume_ratio_ceiling: 3.0,
            momentum_return_bound: 0.10,
            notable_threshold: 0.4,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for feature in Feature::ALL {
            ConfigError::check_range(feature.weight_key(), self.weights.get(feature), 0.0, 1.0)?;
        }
        // Weights need not sum to 1; the composite is clamped instead.
        if self.weights.total() <= 0.0 {
            return Err(ConfigError::NotPositive {
                key: "signal.weights",
            });
        }

        ConfigError::check_range("signal.buy_threshold", self.buy_threshold, -1.0, 1.0)?;
        ConfigError::check_range("signal.sell_threshold", self.sell_threshold, -1.0, 1.0)?;
        ConfigError::check_ordered(
            "signal.sell_threshold",
            self.sell_threshold,
            "signal.buy_threshold",
            self.buy_threshold,
        )?;
        // Margins divide by the distance from each threshold to its bound.
        if self.buy_threshold >= 1.0 || self.sell_threshold <= -1.0 {
            return Err(ConfigError::Invalid {
                key: "signal thresholds",
                reason: "must lie strictly inside (-1, 1)".into(),
            });
        }

        if self.min_mentions == 0 {
            return Err(ConfigError::NotPositive {
                key: "signal.min_mentions",
            });
        }
        ConfigError::check_positive("signal.velocity_ceiling", self.velocity_ceiling)?;
        ConfigError::check_ordered(
            "1.0",
            1.0,
            "signal.volume_ratio_ceiling",
            self.volume_ratio_ceiling,
        )?;
        ConfigError::check_positive("signal.volume_ratio_ceiling", self.volume_ratio_ceiling)?;
        ConfigError::check_positive("signal.momentum_return_bound", self.momentum_return_bound)?;
        ConfigError::check_range("signal.notable_threshold", self.notable_threshold, 0.0, 1.0)
    }
}
