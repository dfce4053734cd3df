//! Ticker candidates from free text.
//!
//! Two patterns are recognised:
//! - cashtags: `$` followed by 1-5 uppercase ASCII letters (`$GME`)
//! - barewords: a standalone run of 1-5 uppercase ASCII letters (`GME`)
//!
//! Cashtags are an explicit signal from the author and bypass the
//! blacklist. Barewords collide with ordinary English and forum jargon, so
//! they are blacklist-filtered and scored by a set of heuristics before the
//! acceptance threshold is applied. Every occurrence yields its own
//! [`TickerMention`], in text order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::ConfigError;

use crate::types::{MalformedInput, MentionKind, TextUnit, TickerMention};

pub const MAX_TICKER_LEN: usize = 5;

const CASHTAG_BASE: f64 = 0.9;
const CASHTAG_WHITELIST_BONUS: f64 = 0.1;
const CASHTAG_CONTEXT_BONUS: f64 = 0.05;

const BAREWORD_BASE: f64 = 0.5;
const WHITELIST_BONUS: f64 = 0.15;
const UNKNOWN_PENALTY: f64 = 0.25;
const SHORT_PENALTY: f64 = 0.2;
const LONG_BONUS: f64 = 0.05;
const CONTEXT_BONUS_PER_WORD: f64 = 0.1;
const CONTEXT_BONUS_CAP: f64 = 0.2;
const COMMON_WORD_PENALTY: f64 = 0.2;

const FINANCE_CONTEXT: &[&str] = &[
    "stock", "stocks", "share", "shares", "call", "calls", "put", "puts", "option", "options",
    "buy", "buying", "bought", "sell", "selling", "sold", "long", "short", "shorts", "bullish",
    "bearish", "earnings", "revenue", "price", "target", "squeeze", "position", "strike",
    "ticker", "dip", "holding", "bagholder",
];

const DEFAULT_BLACKLIST: &[&str] = &[
    "I", "A", "DD", "YOLO", "ALL", "FOR", "CEO", "CFO", "IPO", "ATH", "ATM", "OTM", "ITM", "IV",
    "USA", "USD", "EPS", "IMO", "TLDR", "LOL", "LMAO", "WSB", "FD", "FDS", "GG", "OMG", "WTF",
    "ETF", "SEC", "FOMO", "FUD", "HODL", "EDIT", "PM", "AM", "EU", "UK", "US", "API", "GDP",
    "CPI", "FED", "NYSE", "AI", "OK", "ON", "AT", "BE", "SO", "GO", "NOW", "ANY", "ARE", "CAN",
    "BIG", "OUT", "NEW", "ONE", "BUY", "SELL", "HOLD", "PUT", "CALL", "MOON", "THE", "AND", "OR",
    "TO", "IN", "OF", "IS", "IT", "MY", "NO", "DO", "UP", "WE", "ME", "RIP", "EOD", "EOW", "YTD",
    "DM", "PT", "TA", "TL", "DR", "GUH", "APE", "APES",
];

const DEFAULT_WHITELIST: &[&str] = &[
    "GME", "AMC", "BB", "NOK", "TSLA", "AAPL", "NVDA", "AMD", "MSFT", "PLTR", "SPY", "QQQ", "META",
    "AMZN", "GOOG", "GOOGL", "NFLX", "BABA", "SOFI", "HOOD", "RIVN", "COIN", "MSTR", "INTC",
    "DIS", "WISH", "CLOV", "SPCE", "NIO", "LCID", "UPST", "ARKK", "TLRY", "SNDL", "BBBY", "KOSS",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Mentions must score strictly above this to be kept.
    pub min_confidence: f64,

    /// Uppercase words never treated as barewords.
    pub blacklist: BTreeSet<String>,

    /// Symbols known to be real; barewords outside it are penalised.
    pub whitelist: BTreeSet<String>,

    /// Tokens on either side of a bareword searched for finance vocabulary.
    pub context_window: usize,

    /// A bareword whose lowercase form appears at least this often (in the
    /// text or across the batch corpus) is treated as an ordinary word.
    pub common_word_min_count: usize,

    /// Units with a larger body are skipped as malformed.
    pub max_body_bytes: usize,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            whitelist: DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
            context_window: 5,
            common_word_min_count: 3,
            max_body_bytes: 40_000,
        }
    }
}

impl TickerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A threshold at or above the cashtag base would reject explicit `$GME`.
        ConfigError::check_range("tickers.min_confidence", self.min_confidence, 0.0, 1.0)?;
        ConfigError::check_ordered(
            "tickers.min_confidence",
            self.min_confidence,
            "cashtag base confidence",
            CASHTAG_BASE,
        )?;
        if self.context_window == 0 {
            return Err(ConfigError::NotPositive {
                key: "tickers.context_window",
            });
        }
        if self.common_word_min_count == 0 {
            return Err(ConfigError::NotPositive {
                key: "tickers.common_word_min_count",
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::NotPositive {
                key: "tickers.max_body_bytes",
            });
        }
        for (key, set) in [
            ("tickers.blacklist", &self.blacklist),
            ("tickers.whitelist", &self.whitelist),
        ] {
            if let Some(bad) = set.iter().find(|s| !is_ticker_shape(s)) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("{bad:?} is not 1-{MAX_TICKER_LEN} uppercase letters"),
                });
            }
        }
        Ok(())
    }
}

fn is_ticker_shape(s: &str) -> bool {
    (1..=MAX_TICKER_LEN).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// Lowercase word counts across a batch.
///
/// Only words written entirely in lowercase are counted: they are evidence
/// that a string is being used as an ordinary word rather than a symbol.
#[derive(Debug, Clone, Default)]
pub struct CorpusFrequency {
    counts: HashMap<String, usize>,
}

impl CorpusFrequency {
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts = HashMap::new();
        for text in texts {
            for word in words(text) {
                if is_plain_lowercase(word.text) {
                    *counts.entry(word.text.to_string()).or_insert(0) += 1;
                }
            }
        }
        Self { counts }
    }

    pub fn count(&self, lowercase: &str) -> usize {
        self.counts.get(lowercase).copied().unwrap_or(0)
    }
}

/// Extracted mentions for a batch, grouped by ticker.
#[derive(Debug, Default)]
pub struct BatchExtraction {
    pub by_ticker: BTreeMap<String, Vec<TickerMention>>,
    pub malformed: Vec<MalformedInput>,
    pub units_accepted: usize,
}

#[derive(Debug, Clone)]
pub struct TickerExtractor {
    cfg: TickerConfig,
}

impl TickerExtractor {
    pub fn new(cfg: TickerConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &TickerConfig {
        &self.cfg
    }

    /// Mentions in `text`, with no batch context.
    pub fn extract(&self, text: &str) -> Vec<TickerMention> {
        self.extract_with_corpus(text, &CorpusFrequency::default())
    }

    pub fn extract_with_corpus(&self, text: &str, corpus: &CorpusFrequency) -> Vec<TickerMention> {
        let words = words(text);
        let mut local_lowercase: HashMap<String, usize> = HashMap::new();
        for w in &words {
            if is_plain_lowercase(w.text) {
                *local_lowercase.entry(w.text.to_string()).or_insert(0) += 1;
            }
        }

        let mut mentions = Vec::new();
        for (start, end) in uppercase_runs(text) {
            let ticker = &text[start..end];
            let is_cashtag = start > 0 && text.as_bytes()[start - 1] == b'$';

            let confidence = if is_cashtag {
                self.cashtag_confidence(ticker, &words, start)
            } else {
                if self.cfg.blacklist.contains(ticker) {
                    continue;
                }
                let lower = ticker.to_ascii_lowercase();
                // The corpus usually already includes this text, so take the larger count.
                let local = local_lowercase.get(&lower).copied().unwrap_or(0);
                let seen = corpus.count(&lower).max(local);
                self.bareword_confidence(ticker, &words, start, seen)
            };

            if confidence <= self.cfg.min_confidence {
                continue;
            }
            let span_start = if is_cashtag { start - 1 } else { start };
            mentions.push(TickerMention {
                ticker: ticker.to_string(),
                text_unit_id: None,
                confidence,
                span: (span_start, end),
                matched: text[span_start..end].to_string(),
                kind: if is_cashtag {
                    MentionKind::Cashtag
                } else {
                    MentionKind::Bareword
                },
            });
        }
        mentions
    }

    /// Mentions in `unit`, tagged with its id. Malformed units yield an error.
    pub fn extract_unit(
        &self,
        unit: &TextUnit,
        corpus: &CorpusFrequency,
    ) -> Result<Vec<TickerMention>, MalformedInput> {
        unit.validate(self.cfg.max_body_bytes)?;
        let mut mentions = self.extract_with_corpus(&unit.body, corpus);
        for m in &mut mentions {
            m.text_unit_id = Some(unit.id.clone());
        }
        Ok(mentions)
    }

    /// Extracts every unit, skipping malformed ones with a warning.
    ///
    /// The corpus frequency is built from the well-formed units of the same batch.
    pub fn extract_batch(&self, units: &[TextUnit]) -> BatchExtraction {
        let mut out = BatchExtraction::default();
        let valid: Vec<&TextUnit> = units
            .iter()
            .filter(|u| match u.validate(self.cfg.max_body_bytes) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "skipping malformed text unit");
                    out.malformed.push(e);
                    false
                }
            })
            .collect();
        let corpus = CorpusFrequency::from_texts(valid.iter().map(|u| u.body.as_str()));

        for unit in valid {
            out.units_accepted += 1;
            for mut m in self.extract_with_corpus(&unit.body, &corpus) {
                m.text_unit_id = Some(unit.id.clone());
                out.by_ticker.entry(m.ticker.clone()).or_default().push(m);
            }
        }
        debug!(
            tickers = out.by_ticker.len(),
            units = out.units_accepted,
            malformed = out.malformed.len(),
            "batch extracted"
        );
        out
    }

    fn cashtag_confidence(&self, ticker: &str, words: &[Word<'_>], at: usize) -> f64 {
        let mut c = CASHTAG_BASE;
        if self.cfg.whitelist.contains(ticker) {
            c += CASHTAG_WHITELIST_BONUS;
        }
        if self.context_hits(words, at) > 0 {
            c += CASHTAG_CONTEXT_BONUS;
        }
        c.clamp(0.0, 1.0)
    }

    fn bareword_confidence(&self, ticker: &str, words: &[Word<'_>], at: usize, seen: usize) -> f64 {
        let mut c = BAREWORD_BASE;
        if self.cfg.whitelist.contains(ticker) {
            c += WHITELIST_BONUS;
        } else {
            c -= UNKNOWN_PENALTY;
        }
        match ticker.len() {
            0..=2 => c -= SHORT_PENALTY,
            4.. => c += LONG_BONUS,
            _ => {}
        }
        c += (self.context_hits(words, at) as f64 * CONTEXT_BONUS_PER_WORD).min(CONTEXT_BONUS_CAP);
        if seen >= self.cfg.common_word_min_count {
            c -= COMMON_WORD_PENALTY;
        }
        c.clamp(0.0, 1.0)
    }

    /// Distinct finance words within `context_window` tokens of the word at byte `at`.
    fn context_hits(&self, words: &[Word<'_>], at: usize) -> usize {
        let Some(idx) = words.iter().position(|w| w.start <= at && at < w.end) else {
            return 0;
        };
        let lo = idx.saturating_sub(self.cfg.context_window);
        let hi = (idx + self.cfg.context_window).min(words.len() - 1);

        let mut hits = HashSet::new();
        for (i, w) in words.iter().enumerate().take(hi + 1).skip(lo) {
            if i == idx {
                continue;
            }
            let lower = w.text.to_lowercase();
            if let Some(term) = FINANCE_CONTEXT.iter().find(|t| **t == lower) {
                hits.insert(*term);
            }
        }
        hits.len()
    }
}

struct Word<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

/// Alphanumeric runs of `text` with their byte offsets.
fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push(Word {
                    start: s,
                    end: i,
                    text: &text[s..i],
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(Word {
            start: s,
            end: text.len(),
            text: &text[s..],
        });
    }
    out
}

fn is_plain_lowercase(word: &str) -> bool {
    word.chars().all(|c| c.is_ascii_lowercase())
}

/// Byte ranges of standalone 1-5 letter uppercase ASCII runs.
///
/// A run glued to any other alphanumeric character (`GMEs`, `x2GME`, `ÄGME`)
/// is not standalone. Uppercase ASCII bytes never occur inside multi-byte
/// UTF-8 sequences, so byte offsets are always char boundaries.
fn uppercase_runs(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_uppercase() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_uppercase() {
            i += 1;
        }
        let end = i;

        let glued_before = text[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric);
        let glued_after = text[end..].chars().next().is_some_and(char::is_alphanumeric);
        if !glued_before && !glued_after && end - start <= MAX_TICKER_LEN {
            out.push((start, end));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;
    use chrono::Utc;

    fn extractor() -> TickerExtractor {
        TickerExtractor::new(TickerConfig::default()).unwrap()
    }

    fn tickers(mentions: &[TickerMention]) -> Vec<&str> {
        mentions.iter().map(|m| m.ticker.as_str()).collect()
    }

    fn unit(id: &str, body: &str) -> TextUnit {
        TextUnit {
            id: id.into(),
            body: body.into(),
            score: 10,
            created_at: Utc::now(),
            source_kind: SourceKind::Post,
        }
    }

    #[test]
    fn cashtag_has_high_confidence_and_keeps_sigil_in_span() {
        let m = extractor().extract("loading up on $GME today");
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].ticker, "GME");
        assert_eq!(m[0].kind, MentionKind::Cashtag);
        assert_eq!(m[0].matched, "$GME");
        assert_eq!(m[0].span, (14, 18));
        assert!(m[0].confidence >= 0.9);
    }

    #[test]
    fn cashtag_bypasses_blacklist() {
        let m = extractor().extract("$DD is a real ticker, DD is not");
        assert_eq!(tickers(&m), vec!["DD"]);
        assert_eq!(m[0].kind, MentionKind::Cashtag);
    }

    #[test]
    fn blacklisted_barewords_are_dropped() {
        assert!(extractor().extract("YOLO ALL FOR THE DD").is_empty());
    }

    #[test]
    fn whitelisted_bareword_in_context_is_accepted() {
        let m = extractor().extract("just bought more GME shares");
        assert_eq!(tickers(&m), vec!["GME"]);
        assert_eq!(m[0].kind, MentionKind::Bareword);
        // base + whitelist + two context words, capped
        assert!((m[0].confidence - 0.85).abs() < 1e-12);
    }

    #[test]
    fn unknown_short_bareword_is_rejected() {
        // 0.5 - 0.25 - 0.2 = 0.05
        assert!(extractor().extract("XY said hello").is_empty());
    }

    #[test]
    fn unknown_bareword_needs_context() {
        let e = extractor();
        assert!(e.extract("meeting ZZZ later").is_empty());
        assert_eq!(tickers(&e.extract("buying ZZZ calls")), vec!["ZZZ"]);
    }

    #[test]
    fn glued_and_oversized_runs_are_ignored() {
        let e = extractor();
        assert!(e.extract("GMEs AMCx xAMC GAMESTOP").is_empty());
        assert_eq!(tickers(&e.extract("GME's squeeze")), vec!["GME"]);
    }

    #[test]
    fn every_occurrence_is_kept_in_order() {
        let m = extractor().extract("$AMC then GME then $GME");
        assert_eq!(tickers(&m), vec!["AMC", "GME", "GME"]);
        assert!(m.windows(2).all(|w| w[0].span.0 < w[1].span.0));
    }

    #[test]
    fn common_word_penalty_uses_text_and_corpus() {
        let cfg = TickerConfig {
            whitelist: ["NOW".to_string(), "WISH".to_string()].into(),
            blacklist: BTreeSet::new(),
            min_confidence: 0.65,
            ..Default::default()
        };
        let e = TickerExtractor::new(cfg).unwrap();

        let text = "WISH you could buy now";
        assert_eq!(tickers(&e.extract(text)), vec!["WISH"]);

        let corpus = CorpusFrequency::from_texts(["i wish", "wish me luck", "wish i had"]);
        assert_eq!(corpus.count("wish"), 3);
        assert!(e.extract_with_corpus(text, &corpus).is_empty());
    }

    #[test]
    fn non_ascii_neighbours_do_not_break_offsets() {
        let m = extractor().extract("🚀🚀 $GME 🚀 ÄAMC");
        assert_eq!(tickers(&m), vec!["GME"]);
        assert_eq!(&"🚀🚀 $GME 🚀 ÄAMC"[m[0].span.0..m[0].span.1], "$GME");
    }

    #[test]
    fn extract_unit_tags_and_validates() {
        let e = extractor();
        let m = e
            .extract_unit(&unit("t3_abc", "$TSLA puts"), &CorpusFrequency::default())
            .unwrap();
        assert_eq!(m[0].text_unit_id.as_deref(), Some("t3_abc"));

        let err = e.extract_unit(&unit("t3_x", "   "), &CorpusFrequency::default());
        assert!(matches!(err, Err(MalformedInput::EmptyBody { .. })));
    }

    #[test]
    fn batch_groups_by_ticker_and_skips_malformed() {
        let units = vec![
            unit("1", "$GME to the moon"),
            unit("2", ""),
            unit("3", "GME and $AMC calls"),
            unit("", "$GME"),
        ];
        let out = extractor().extract_batch(&units);

        assert_eq!(out.units_accepted, 2);
        assert_eq!(out.malformed.len(), 2);
        assert_eq!(out.by_ticker["GME"].len(), 2);
        assert_eq!(out.by_ticker["AMC"].len(), 1);
        assert_eq!(out.by_ticker["AMC"][0].text_unit_id.as_deref(), Some("3"));
    }

    #[test]
    fn config_validation() {
        assert!(TickerConfig::default().validate().is_ok());

        let too_strict = TickerConfig {
            min_confidence: 0.95,
            ..Default::default()
        };
        assert!(matches!(
            too_strict.validate(),
            Err(ConfigError::Inverted { .. })
        ));

        let bad_list = TickerConfig {
            whitelist: ["gme".to_string()].into(),
            ..Default::default()
        };
        assert!(matches!(bad_list.validate(), Err(ConfigError::Invalid { .. })));
    }
}
