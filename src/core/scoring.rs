//! Blends similarity and color evidence into a [`Verdict`].
//!
//! The weights and the threshold are calibration constants; changing any of them
//! changes every verdict.

use crate::models::verdict::Verdict;

/// Confidence strictly above this is a rotten verdict.
pub const ROTTEN_THRESHOLD: f64 = 0.55;

/// Weights when both reference classes are available.
pub const BOTH_ROTTEN_WEIGHT: f64 = 0.65;
/// Weight of `1 - normFresh` when both classes are available.
pub const BOTH_FRESH_WEIGHT: f64 = 0.20;
/// Weight of the color ratio when both classes are available.
pub const BOTH_COLOR_WEIGHT: f64 = 0.15;

/// Weight of `1 - normFresh` with fresh references only.
pub const FRESH_ONLY_WEIGHT: f64 = 0.75;
/// Weight of the color ratio with fresh references only.
pub const FRESH_ONLY_COLOR_WEIGHT: f64 = 0.25;

/// Weight of `normRotten` with rotten references only.
pub const ROTTEN_ONLY_WEIGHT: f64 = 0.85;
/// Weight of the color ratio with rotten references only.
pub const ROTTEN_ONLY_COLOR_WEIGHT: f64 = 0.15;

/// Map a cosine similarity from `[-1, 1]` onto `[0, 1]`.
#[inline]
pub fn normalize_similarity(similarity: f64) -> f64 {
    (similarity + 1.0) / 2.0
}

/// Combine the available scores into a verdict.
///
/// `sim_fresh`/`sim_rotten` are average cosine similarities against each
/// reference class (`None` when that class is empty); `color_score` is the
/// spoiled-pixel ratio.
pub fn aggregate(sim_fresh: Option<f64>, sim_rotten: Option<f64>, color_score: f64) -> Verdict {
    let (confidence, reason) = match (sim_fresh, sim_rotten) {
        (Some(fresh), Some(rotten)) => {
            let norm_fresh = normalize_similarity(fresh);
            let norm_rotten = normalize_similarity(rotten);
            (
                norm_rotten * BOTH_ROTTEN_WEIGHT
                    + (1.0 - norm_fresh) * BOTH_FRESH_WEIGHT
                    + color_score * BOTH_COLOR_WEIGHT,
                format!(
                    "simFresh={:.3}, simRotten={:.3}, color={:.2}",
                    fresh, rotten, color_score
                ),
            )
        }
        (Some(fresh), None) => {
            let norm_fresh = normalize_similarity(fresh);
            (
                (1.0 - norm_fresh) * FRESH_ONLY_WEIGHT + color_score * FRESH_ONLY_COLOR_WEIGHT,
                format!("simFresh={:.3}, color={:.2}", fresh, color_score),
            )
        }
        (None, Some(rotten)) => {
            let norm_rotten = normalize_similarity(rotten);
            (
                norm_rotten * ROTTEN_ONLY_WEIGHT + color_score * ROTTEN_ONLY_COLOR_WEIGHT,
                format!("simRotten={:.3}, color={:.2}", rotten, color_score),
            )
        }
        (None, None) => (
            color_score,
            format!("color={:.2} (no references)", color_score),
        ),
    };

    let confidence = clamp_confidence(confidence);
    let is_rotten = confidence > ROTTEN_THRESHOLD;
    log::debug!("Scored {:.4} (rotten: {}) from {}", confidence, is_rotten, reason);

    Verdict::new(is_rotten, confidence, reason)
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        log::warn!("Non-finite confidence {}; treating as 0", confidence);
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_both_references() {
        // normFresh = 0.9, normRotten = 0.6
        let verdict = aggregate(Some(0.8), Some(0.2), 0.1);
        assert!((verdict.rotten_confidence() - 0.425).abs() < EPS);
        assert!(!verdict.is_rotten());
        assert_eq!(verdict.reason(), "simFresh=0.800, simRotten=0.200, color=0.10");
    }

    #[test]
    fn test_fresh_only() {
        // normFresh = 0.2
        let verdict = aggregate(Some(-0.6), None, 0.0);
        assert!((verdict.rotten_confidence() - 0.6).abs() < EPS);
        assert!(verdict.is_rotten());
        assert_eq!(verdict.reason(), "simFresh=-0.600, color=0.00");
    }

    #[test]
    fn test_rotten_only() {
        // normRotten = 0.5 -> 0.425 + 0.15 * 0.4
        let verdict = aggregate(None, Some(0.0), 0.4);
        assert!((verdict.rotten_confidence() - 0.485).abs() < EPS);
        assert!(!verdict.is_rotten());
        assert_eq!(verdict.reason(), "simRotten=0.000, color=0.40");
    }

    #[test]
    fn test_no_references() {
        let verdict = aggregate(None, None, 0.9);
        assert!((verdict.rotten_confidence() - 0.9).abs() < EPS);
        assert!(verdict.is_rotten());
        assert_eq!(verdict.reason(), "color=0.90 (no references)");
    }

    #[test]
    fn test_threshold_is_strict() {
        let verdict = aggregate(None, None, 0.55);
        assert_eq!(verdict.rotten_confidence(), 0.55);
        assert!(!verdict.is_rotten());

        let verdict = aggregate(None, None, 0.550001);
        assert!(verdict.is_rotten());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let inputs = [-1e6, -3.0, -1.0, -0.5, 0.0, 0.3, 1.0, 2.5, 1e6];
        for &fresh in &inputs {
            for &rotten in &inputs {
                for &color in &inputs {
                    for verdict in [
                        aggregate(Some(fresh), Some(rotten), color),
                        aggregate(Some(fresh), None, color),
                        aggregate(None, Some(rotten), color),
                        aggregate(None, None, color),
                    ] {
                        let c = verdict.rotten_confidence();
                        assert!((0.0..=1.0).contains(&c), "confidence {} out of range", c);
                        assert_eq!(verdict.is_rotten(), c > ROTTEN_THRESHOLD);
                    }
                }
            }
        }
    }

    #[test]
    fn test_non_finite_input_scores_zero() {
        let verdict = aggregate(Some(f64::NAN), None, 0.5);
        assert_eq!(verdict.rotten_confidence(), 0.0);
        assert!(!verdict.is_rotten());
    }
}
