use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of checking one test image.
///
/// Built once by the scoring step and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    is_rotten: bool,
    rotten_confidence: f64,
    reason: String,
}

impl Verdict {
    pub(crate) fn new(is_rotten: bool, rotten_confidence: f64, reason: String) -> Self {
        Self {
            is_rotten,
            rotten_confidence,
            reason,
        }
    }

    /// Whether the item should be considered unsafe to eat.
    pub fn is_rotten(&self) -> bool {
        self.is_rotten
    }

    /// Confidence that the item is rotten, in `[0, 1]`.
    pub fn rotten_confidence(&self) -> f64 {
        self.rotten_confidence
    }

    /// Which scores went into the confidence, for display.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Badge text.
    pub fn label(&self) -> &'static str {
        if self.is_rotten {
            "NOT EDIBLE"
        } else {
            "EDIBLE"
        }
    }

    /// One-line status message shown after a check.
    pub fn headline(&self) -> &'static str {
        if self.is_rotten {
            "Not safe to eat (likely rotten)"
        } else {
            "Likely fresh / edible"
        }
    }

    /// Confidence as a percentage with one decimal, e.g. `42.5%`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.rotten_confidence * 100.0)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (confidence {}): {}",
            self.label(),
            self.confidence_percent(),
            self.reason
        )
    }
}
