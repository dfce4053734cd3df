use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Post,
    Comment,
}

/// One post or comment pulled from the forum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub body: String,
    /// Net upvotes. May be zero or negative.
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub source_kind: SourceKind,
}

/// Why a [`TextUnit`] was skipped instead of processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedInput {
    #[error("text unit has an empty id")]
    EmptyId,

    #[error("text unit {id} has an empty body")]
    EmptyBody { id: String },

    #[error("text unit {id} body is {bytes} bytes, limit is {max}")]
    BodyTooLarge { id: String, bytes: usize, max: usize },
}

impl TextUnit {
    pub fn validate(&self, max_body_bytes: usize) -> Result<(), MalformedInput> {
        if self.id.trim().is_empty() {
            return Err(MalformedInput::EmptyId);
        }
        if self.body.trim().is_empty() {
            return Err(MalformedInput::EmptyBody {
                id: self.id.clone(),
            });
        }
        if self.body.len() > max_body_bytes {
            return Err(MalformedInput::BodyTooLarge {
                id: self.id.clone(),
                bytes: self.body.len(),
                max: max_body_bytes,
            });
        }
        Ok(())
    }

    /// Log-dampened engagement: `log2(max(score, 1) + 1)`.
    ///
    /// A unit with no upvotes still weighs 1.0, and a viral post cannot
    /// drown out everything else in its window.
    pub fn engagement_weight(&self) -> f64 {
        engagement_weight(self.score)
    }
}

pub fn engagement_weight(score: i64) -> f64 {
    (score.max(1) as f64 + 1.0).log2()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionKind {
    /// `$GME`
    Cashtag,
    /// `GME`
    Bareword,
}

/// A single candidate ticker occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMention {
    pub ticker: String,
    /// `None` when extracted from free text rather than a [`TextUnit`].
    pub text_unit_id: Option<String>,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Byte range of the matched text, sigil included.
    pub span: (usize, usize),
    pub matched: String,
    pub kind: MentionKind,
}

/// Polarity of one text unit, attributed to one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub text_unit_id: String,
    pub ticker: String,
    /// In `[-1, 1]`.
    pub polarity: f64,
    /// Matched lexicon terms and their signed contribution, in text order.
    pub contributing_terms: Vec<(String, f64)>,
}
