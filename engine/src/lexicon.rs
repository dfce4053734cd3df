//! Sentiment lexicon: forum slang and emoji over VADER's general table.
//!
//! Every entry is read on VADER's valence scale of `[-4, 4]`. Slang tables
//! are authored in `[-1, 1]` and multiplied by [`SLANG_SCALE`] so one "🚀"
//! outweighs a mild "good". Tokens with no slang entry fall back to
//! `vader_sentiment::LEXICON`.
//!
//! The built-in lexicon is constructed once and shared read-only
//! ([`Lexicon::builtin`]). Additions from a file produce a new lexicon; a
//! shared instance is never mutated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;
use unicase::UniCase;

/// Multiplier applied to slang valences authored in `[-1, 1]`.
pub const SLANG_SCALE: f64 = 4.0;

/// Largest magnitude an entry may carry once scaled.
pub const MAX_VALENCE: f64 = 4.0;

const BULLISH_TERMS: &[(&str, f64)] = &[
    ("to the moon", 1.0),
    ("diamond hands", 0.9),
    ("short squeeze", 0.8),
    ("gamma squeeze", 0.8),
    ("apes together strong", 0.7),
    ("hold the line", 0.6),
    ("buy the dip", 0.6),
    ("free money", 0.6),
    ("moon", 0.8),
    ("mooning", 0.9),
    ("tendies", 0.8),
    ("bullish", 0.8),
    ("rocket", 0.7),
    ("squeeze", 0.6),
    ("squeezing", 0.7),
    ("lambo", 0.6),
    ("hodl", 0.6),
    ("btfd", 0.6),
    ("stonks", 0.5),
    ("breakout", 0.5),
    ("undervalued", 0.6),
    ("printing", 0.5),
    ("yolo", 0.4),
    ("calls", 0.3),
    ("ape", 0.3),
    ("apes", 0.3),
    ("green", 0.4),
    ("rally", 0.5),
    ("ripping", 0.6),
    ("surge", 0.5),
    ("soaring", 0.6),
];

const BEARISH_TERMS: &[(&str, f64)] = &[
    ("rug pull", -0.9),
    ("margin call", -0.8),
    ("paper hands", -0.6),
    ("bag holder", -0.7),
    ("dead cat bounce", -0.6),
    ("loss porn", -0.5),
    ("guh", -0.8),
    ("rekt", -0.8),
    ("rugpull", -0.9),
    ("bagholder", -0.7),
    ("bagholders", -0.7),
    ("bagholding", -0.7),
    ("bearish", -0.8),
    ("drilling", -0.7),
    ("drill", -0.6),
    ("tanking", -0.7),
    ("tanked", -0.7),
    ("tank", -0.5),
    ("dumping", -0.7),
    ("dump", -0.6),
    ("crash", -0.7),
    ("crashing", -0.8),
    ("bleeding", -0.6),
    ("overvalued", -0.6),
    ("puts", -0.3),
    ("fud", -0.4),
    ("red", -0.3),
    ("bubble", -0.5),
    ("plunge", -0.6),
    ("selloff", -0.5),
    ("sell-off", -0.5),
];

const EMOJI_SENTIMENT: &[(&str, f64)] = &[
    ("🚀", 0.8),
    ("🌙", 0.6),
    ("💎", 0.6),
    ("🙌", 0.4),
    ("🦍", 0.4),
    ("📈", 0.6),
    ("🐂", 0.6),
    ("🍗", 0.5),
    ("💰", 0.5),
    ("🤑", 0.6),
    ("🔥", 0.4),
    ("📉", -0.6),
    ("🐻", -0.6),
    ("🌈", -0.3),
    ("🩸", -0.5),
    ("💀", -0.4),
    ("🤡", -0.5),
    ("😭", -0.4),
    ("🧻", -0.5),
];

static BUILTIN: Lazy<Arc<Lexicon>> = Lazy::new(|| Arc::new(Lexicon::from_builtin_tables()));

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("failed to read lexicon file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse lexicon file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("lexicon term {term:?} has valence {value}, expected a finite value in [-1, 1]")]
    InvalidValence { term: String, value: f64 },

    #[error("lexicon term is empty")]
    EmptyTerm,
}

/// Slang additions in the on-disk format.
///
/// ```json
/// { "bullish_terms": { "hodl": 0.6 }, "bearish_terms": {}, "emoji_sentiment": { "🚀": 0.8 } }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LexiconOverlay {
    pub bullish_terms: HashMap<String, f64>,
    pub bearish_terms: HashMap<String, f64>,
    pub emoji_sentiment: HashMap<String, f64>,
}

impl LexiconOverlay {
    fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.bullish_terms
            .iter()
            .chain(&self.bearish_terms)
            .chain(&self.emoji_sentiment)
            .map(|(term, value)| (term.as_str(), *value))
    }
}

/// Where a matched entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    Slang,
    General,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub text: String,
    pub tokens: Vec<String>,
    pub valence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    slang: HashMap<String, f64>,
    /// Multi-token slang, longest first.
    phrases: Vec<Phrase>,
}

impl Lexicon {
    /// The shared built-in lexicon.
    pub fn builtin() -> Arc<Lexicon> {
        BUILTIN.clone()
    }

    fn from_builtin_tables() -> Self {
        let mut lexicon = Lexicon::default();
        for &(term, valence) in BULLISH_TERMS
            .iter()
            .chain(BEARISH_TERMS)
            .chain(EMOJI_SENTIMENT)
        {
            lexicon.insert_slang(term, valence * SLANG_SCALE);
        }
        lexicon
    }

    /// Built-in lexicon plus the slang entries found in `path`.
    pub fn with_overlay_file(path: impl AsRef<Path>) -> Result<Lexicon, LexiconError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: LexiconOverlay =
            serde_json::from_str(&raw).map_err(|source| LexiconError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        BUILTIN.with_overlay(&overlay)
    }

    /// Copy of `self` with `overlay` applied; overlay entries win on conflict.
    pub fn with_overlay(&self, overlay: &LexiconOverlay) -> Result<Lexicon, LexiconError> {
        let mut lexicon = self.clone();
        for (term, value) in overlay.entries() {
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                return Err(LexiconError::InvalidValence {
                    term: term.to_string(),
                    value,
                });
            }
            if tokenize(term).is_empty() {
                return Err(LexiconError::EmptyTerm);
            }
            lexicon.insert_slang(term, value * SLANG_SCALE);
        }
        Ok(lexicon)
    }

    fn insert_slang(&mut self, term: &str, valence: f64) {
        let tokens = tokenize(term);
        match tokens.len() {
            0 => {}
            1 => {
                self.slang.insert(tokens[0].clone(), valence);
            }
            _ => {
                let text = tokens.join(" ");
                self.phrases.retain(|p| p.text != text);
                self.phrases.push(Phrase {
                    text,
                    tokens,
                    valence,
                });
                self.phrases
                    .sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()).then(a.text.cmp(&b.text)));
            }
        }
    }

    /// Longest phrase starting at `tokens[0]`, if any.
    pub fn match_phrase(&self, tokens: &[String]) -> Option<&Phrase> {
        self.phrases.iter().find(|p| tokens.starts_with(&p.tokens))
    }

    /// Valence of a single token. Slang shadows the VADER table.
    pub fn lookup(&self, token: &str) -> Option<(f64, EntrySource)> {
        if let Some(&v) = self.slang.get(token) {
            return Some((v, EntrySource::Slang));
        }
        vader_sentiment::LEXICON
            .get(&UniCase::new(token))
            .map(|&v| (v, EntrySource::General))
    }

    pub fn len(&self) -> usize {
        self.slang.len() + self.phrases.len() + vader_sentiment::LEXICON.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercased word and emoji tokens.
///
/// Words are runs of alphanumerics joined by `'` or `-`. Every other
/// non-whitespace, non-punctuation character (emoji, symbols) becomes its
/// own token; variation selectors, zero-width joiners and skin-tone
/// modifiers are dropped so "🚀️" and "🚀" match the same entry.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
            continue;
        }

        let joins_word = (c == '\'' || c == '\u{2019}' || c == '-')
            && !word.is_empty()
            && chars.peek().is_some_and(|n| n.is_alphanumeric());
        if joins_word {
            word.push(if c == '-' { '-' } else { '\'' });
            continue;
        }

        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }

        if c.is_whitespace() || c.is_ascii() || is_emoji_modifier(c) {
            continue;
        }
        if is_general_punctuation(c) {
            continue;
        }
        tokens.push(c.to_string());
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{FE0E}' | '\u{FE0F}' | '\u{200D}' | '\u{1F3FB}'..='\u{1F3FF}')
}

fn is_general_punctuation(c: char) -> bool {
    matches!(c, '\u{2000}'..='\u{206F}' | '\u{00A0}'..='\u{00BF}')
}
