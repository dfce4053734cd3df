use thiserror::Error;

/// A configuration value outside its declared domain.
///
/// Raised once, at construction time. Components never re-validate mid-run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },

    #[error("{key} must be finite")]
    NotFinite { key: &'static str },

    #[error("{lower} ({lower_value}) must be below {upper} ({upper_value})")]
    Inverted {
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    },

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    /// Checks `value` is finite and inside `[min, max]`.
    pub fn check_range(key: &'static str, value: f64, min: f64, max: f64) -> Result<(), Self> {
        if !value.is_finite() {
            return Err(Self::NotFinite { key });
        }
        if value < min || value > max {
            return Err(Self::OutOfRange {
                key,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Checks `value` is finite and strictly positive.
    pub fn check_positive(key: &'static str, value: f64) -> Result<(), Self> {
        if !value.is_finite() {
            return Err(Self::NotFinite { key });
        }
        if value <= 0.0 {
            return Err(Self::NotPositive { key });
        }
        Ok(())
    }

    /// Checks `lower < upper`.
    pub fn check_ordered(
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    ) -> Result<(), Self> {
        if lower_value < upper_value {
            Ok(())
        } else {
            Err(Self::Inverted {
                lower,
                lower_value,
                upper,
                upper_value,
            })
        }
    }
}
