use std::collections::BTreeMap;

use super::Feature;

pub const NOTHING_NOTABLE: &str = "no individually notable component";

/// Human-readable justification for a set of normalized components.
///
/// Depends on nothing but its arguments, so a stored signal's reasoning can
/// be regenerated from its `components` alone.
pub fn render_reasoning(components: &BTreeMap<Feature, f64>, notable_threshold: f64) -> String {
    let mut notable: Vec<(Feature, f64)> = components
        .iter()
        .filter(|(_, v)| v.is_finite() && v.abs() > notable_threshold)
        .map(|(f, v)| (*f, *v))
        .collect();
    if notable.is_empty() {
        return NOTHING_NOTABLE.to_string();
    }

    // Ties fall back to feature order so the output is stable.
    notable.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));

    notable
        .into_iter()
        .map(|(feature, value)| clause(feature, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn clause(feature: Feature, value: f64) -> String {
    let direction = if value >= 0.0 { "bullish" } else { "bearish" };
    match feature {
        Feature::Sentiment => format!("{direction} sentiment ({value:+.2})"),
        Feature::Velocity => format!("high mention velocity ({direction}, {value:+.2})"),
        Feature::Volume => format!("unusual volume ({direction}, {value:+.2})"),
        Feature::Momentum => {
            let way = if value >= 0.0 { "upward" } else { "downward" };
            format!("{way} price momentum ({value:+.2})")
        }
    }
}
