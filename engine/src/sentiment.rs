//! Lexicon-driven polarity scoring for a single text unit.
//!
//! Tokens are matched against the [`Lexicon`] (multi-word slang first,
//! longest match wins). A negator flips and dampens the next
//! sentiment-bearing token within a short scope, an intensifier scales the
//! next one, and the summed valence is squashed into `(-1, 1)` with
//! `x / sqrt(x^2 + alpha)`.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common::ConfigError;

use crate::lexicon::{Lexicon, LexiconError, tokenize};
use crate::types::SentimentScore;

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "none", "neither", "nor", "without", "cannot",
    "can't", "cant", "don't", "dont", "doesn't", "doesnt", "didn't", "didnt", "isn't", "isnt",
    "aren't", "arent", "wasn't", "wasnt", "won't", "wont", "wouldn't", "wouldnt", "shouldn't",
    "ain't", "aint", "hardly",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("so", 1.2),
    ("super", 1.4),
    ("extremely", 1.5),
    ("insanely", 1.5),
    ("absolutely", 1.4),
    ("totally", 1.3),
    ("mega", 1.4),
    ("fucking", 1.5),
    ("hella", 1.4),
    ("incredibly", 1.5),
    ("slightly", 0.7),
    ("somewhat", 0.8),
    ("kinda", 0.8),
    ("barely", 0.6),
    ("little", 0.7),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    /// Optional JSON slang overlay merged over the built-in lexicon.
    pub lexicon_path: Option<PathBuf>,

    /// Tokens a negator stays armed for before it lapses.
    pub negation_scope: usize,

    /// Factor applied to a negated valence. Must be negative.
    pub negation_factor: f64,

    /// Saturation constant of the `x / sqrt(x^2 + alpha)` normalisation.
    pub saturation_alpha: f64,

    /// Polarities within `±label_dead_band` are labelled neutral.
    pub label_dead_band: f64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            lexicon_path: None,
            negation_scope: 3,
            negation_factor: -0.74,
            saturation_alpha: 15.0,
            label_dead_band: 0.1,
        }
    }
}

impl SentimentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.negation_scope == 0 {
            return Err(ConfigError::NotPositive {
                key: "sentiment.negation_scope",
            });
        }
        ConfigError::check_range("sentiment.negation_factor", self.negation_factor, -1.0, -0.01)?;
        ConfigError::check_positive("sentiment.saturation_alpha", self.saturation_alpha)?;
        ConfigError::check_range("sentiment.label_dead_band", self.label_dead_band, 0.0, 0.99)
    }

    /// The built-in lexicon, or the built-in one with the configured overlay applied.
    pub fn load_lexicon(&self) -> Result<Arc<Lexicon>, LexiconError> {
        match &self.lexicon_path {
            Some(path) => Ok(Arc::new(Lexicon::with_overlay_file(path)?)),
            None => Ok(Lexicon::builtin()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Bullish,
    Neutral,
    Bearish,
}

/// One lexicon hit and the signed valence it contributed after modifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub term: String,
    pub valence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentBreakdown {
    pub polarity: f64,
    pub label: SentimentLabel,
    pub contributions: Vec<Contribution>,
}

/// Mean polarity of every scored unit for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSentiment {
    pub ticker: String,
    pub mean: f64,
    pub label: SentimentLabel,
    pub count: usize,
}

/// Pure and `Sync`: safe to share across scoring workers.
#[derive(Debug, Clone)]
pub struct SentimentScorer {
    lexicon: Arc<Lexicon>,
    cfg: SentimentConfig,
}

impl SentimentScorer {
    pub fn new(lexicon: Arc<Lexicon>, cfg: SentimentConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { lexicon, cfg })
    }

    /// Polarity of `text` in `[-1, 1]`. `0.0` when no term matches.
    pub fn score(&self, text: &str) -> f64 {
        self.analyze(text).polarity
    }

    pub fn score_for(&self, text_unit_id: &str, ticker: &str, text: &str) -> SentimentScore {
        let breakdown = self.analyze(text);
        SentimentScore {
            text_unit_id: text_unit_id.to_string(),
            ticker: ticker.to_string(),
            polarity: breakdown.polarity,
            contributing_terms: breakdown
                .contributions
                .into_iter()
                .map(|c| (c.term, c.valence))
                .collect(),
        }
    }

    pub fn analyze(&self, text: &str) -> SentimentBreakdown {
        let tokens = tokenize(text);
        let contributions = self.contributions(&tokens);
        let raw: f64 = contributions.iter().map(|c| c.valence).sum();
        let polarity = self.normalize(raw);

        SentimentBreakdown {
            polarity,
            label: self.label(polarity),
            contributions,
        }
    }

    pub fn label(&self, polarity: f64) -> SentimentLabel {
        if polarity > self.cfg.label_dead_band {
            SentimentLabel::Bullish
        } else if polarity < -self.cfg.label_dead_band {
            SentimentLabel::Bearish
        } else {
            SentimentLabel::Neutral
        }
    }

    /// Mean polarity of `scores`, or `None` for an empty slice.
    pub fn aggregate(&self, ticker: &str, scores: &[SentimentScore]) -> Option<TickerSentiment> {
        if scores.is_empty() {
            return None;
        }
        let mean = scores.iter().map(|s| s.polarity).sum::<f64>() / scores.len() as f64;
        Some(TickerSentiment {
            ticker: ticker.to_string(),
            mean,
            label: self.label(mean),
            count: scores.len(),
        })
    }

    fn normalize(&self, raw: f64) -> f64 {
        if raw == 0.0 || !raw.is_finite() {
            return 0.0;
        }
        (raw / (raw * raw + self.cfg.saturation_alpha).sqrt()).clamp(-1.0, 1.0)
    }

    fn contributions(&self, tokens: &[String]) -> Vec<Contribution> {
        let mut out = Vec::new();
        let mut negation_left = 0usize;
        let mut scale = 1.0;
        let mut i = 0;

        while i < tokens.len() {
            let matched = self.lexicon.match_phrase(&tokens[i..]);
            let (term, valence, width) = if let Some(phrase) = matched {
                (phrase.text.clone(), phrase.valence, phrase.tokens.len())
            } else {
                let token = tokens[i].as_str();
                if NEGATORS.contains(&token) {
                    negation_left = self.cfg.negation_scope;
                    i += 1;
                    continue;
                }
                if let Some(&(_, factor)) = INTENSIFIERS.iter().find(|(w, _)| *w == token) {
                    scale *= factor;
                    i += 1;
                    continue;
                }
                match self.lexicon.lookup(token) {
                    Some((valence, _)) => (token.to_string(), valence, 1),
                    None => {
                        negation_left = negation_left.saturating_sub(1);
                        scale = 1.0;
                        i += 1;
                        continue;
                    }
                }
            };

            let mut valence = valence * scale;
            if negation_left > 0 {
                valence *= self.cfg.negation_factor;
            }
            out.push(Contribution { term, valence });

            negation_left = 0;
            scale = 1.0;
            i += width;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> SentimentScorer {
        SentimentScorer::new(Lexicon::builtin(), SentimentConfig::default()).unwrap()
    }

    #[test]
    fn no_match_scores_zero() {
        let s = scorer();
        assert_eq!(s.score(""), 0.0);
        assert_eq!(s.score("the quarterly filing is on tuesday"), 0.0);
        assert_eq!(s.analyze("nothing here").label, SentimentLabel::Neutral);
    }

    #[test]
    fn slang_and_emoji_drive_polarity() {
        let s = scorer();
        assert!(s.score("GME to the moon 🚀🚀 diamond hands") > 0.9);
        assert!(s.score("total rug pull, I'm a bagholder 📉") < -0.8);
    }

    #[test]
    fn everyday_words_carry_polarity() {
        let s = scorer();
        assert!(s.score("this stock is worthless and disappointing") < -0.3);
        assert!(s.score("what a brilliant fantastic quarter") > 0.3);
        assert!(s.score("terrific results, impressive growth") > 0.3);
    }

    #[test]
    fn phrase_is_counted_once_not_per_word() {
        let b = scorer().analyze("to the moon");
        assert_eq!(b.contributions.len(), 1);
        assert_eq!(b.contributions[0].term, "to the moon");
    }

    #[test]
    fn negation_flips_and_dampens() {
        let s = scorer();
        let plain = s.analyze("this is bullish");
        let negated = s.analyze("this is not bullish");

        assert!(plain.polarity > 0.0);
        assert!(negated.polarity < 0.0);
        assert!(negated.polarity.abs() < plain.polarity.abs());
        assert_eq!(negated.contributions[0].valence, plain.contributions[0].valence * -0.74);
    }

    #[test]
    fn negation_only_reaches_within_scope() {
        let s = scorer();
        assert!(s.score("not a good trade") < 0.0);
        // Four non-bearing tokens between the negator and the term.
        assert!(s.score("not that i think anyone cares but good") > 0.0);
    }

    #[test]
    fn negation_is_consumed_by_the_first_bearing_token() {
        let b = scorer().analyze("not bad, great");
        assert!(b.contributions[0].valence > 0.0);
        assert!(b.contributions[1].valence > 0.0);
    }

    #[test]
    fn intensifiers_scale_the_next_term() {
        let s = scorer();
        let base = s.analyze("good").contributions[0].valence;
        assert!((s.analyze("very good").contributions[0].valence - base * 1.3).abs() < 1e-12);
        assert!((s.analyze("slightly good").contributions[0].valence - base * 0.7).abs() < 1e-12);
        // Intensifier lapses on an unrelated token.
        assert_eq!(s.analyze("very quarterly good").contributions[0].valence, base);
    }

    #[test]
    fn score_for_keeps_contributing_terms() {
        let score = scorer().score_for("t1_x", "GME", "not bullish 🚀");
        assert_eq!(score.ticker, "GME");
        let terms: Vec<_> = score.contributing_terms.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["bullish", "🚀"]);
        assert!(score.contributing_terms[0].1 < 0.0);
    }

    #[test]
    fn labels_use_dead_band() {
        let s = scorer();
        assert_eq!(s.label(0.1), SentimentLabel::Neutral);
        assert_eq!(s.label(0.11), SentimentLabel::Bullish);
        assert_eq!(s.label(-0.11), SentimentLabel::Bearish);
    }

    #[test]
    fn aggregate_is_mean_polarity() {
        let s = scorer();
        let scores: Vec<_> = [0.8, 0.4, -0.3]
            .iter()
            .enumerate()
            .map(|(i, &p)| SentimentScore {
                text_unit_id: i.to_string(),
                ticker: "GME".into(),
                polarity: p,
                contributing_terms: Vec::new(),
            })
            .collect();

        let agg = s.aggregate("GME", &scores).unwrap();
        assert!((agg.mean - 0.3).abs() < 1e-12);
        assert_eq!(agg.label, SentimentLabel::Bullish);
        assert_eq!(agg.count, 3);
        assert!(s.aggregate("GME", &[]).is_none());
    }

    #[test]
    fn config_validation() {
        assert!(SentimentConfig::default().validate().is_ok());
        let bad = SentimentConfig {
            negation_factor: 0.5,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::OutOfRange { .. })));
        let bad = SentimentConfig {
            negation_scope: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn missing_overlay_file_surfaces_error() {
        let cfg = SentimentConfig {
            lexicon_path: Some("/nonexistent/lexicon.json".into()),
            ..Default::default()
        };
        assert!(matches!(cfg.load_lexicon(), Err(LexiconError::Io { .. })));
    }
}
