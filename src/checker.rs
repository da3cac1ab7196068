//! A single user's checking session: reference images, the last verdict and
//! the status message that goes with them.

use image::DynamicImage;

use crate::core::color::color_ratio;
use crate::core::embeddings::{Embedding, EmbeddingProvider};
use crate::core::scoring::aggregate;
use crate::core::similarity::average_similarity;
use crate::error::{AppError, Result};
use crate::models::references::{FoodClass, ReferenceSet, ReferenceState};
use crate::models::verdict::Verdict;

/// Message before anything has been uploaded, and after a reset.
pub const IDLE_MESSAGE: &str = "Upload images to start";
/// Message while a check is running.
pub const ANALYZING_MESSAGE: &str = "Analyzing...";
/// Message while a reference batch is being embedded.
pub const ADDING_MESSAGE: &str = "Adding references...";
/// Advice surfaced to users.
pub const USAGE_TIP: &str = "Tip: provide multiple references for higher accuracy";

/// Score one test image against a reference set.
///
/// The test embedding lives only for the duration of this call.
pub fn evaluate(
    provider: &dyn EmbeddingProvider,
    references: &ReferenceSet,
    image: &DynamicImage,
) -> Result<Verdict> {
    let color_score = color_ratio(image)?;
    let embedding = provider.infer(image)?;

    let sim_fresh = average_similarity(&embedding, references.fresh())?;
    let sim_rotten = average_similarity(&embedding, references.rotten())?;

    Ok(aggregate(sim_fresh, sim_rotten, color_score))
}

/// Per-user checking session.
///
/// Owns its [`ReferenceSet`]; the model is passed in per call so many sessions
/// can share one provider.
#[derive(Debug)]
pub struct FreshnessChecker {
    references: ReferenceSet,
    message: String,
    verdict: Option<Verdict>,
}

impl Default for FreshnessChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl FreshnessChecker {
    /// Empty session.
    pub fn new() -> Self {
        Self {
            references: ReferenceSet::new(),
            message: IDLE_MESSAGE.to_string(),
            verdict: None,
        }
    }

    /// Embed every image and append them all to `class`.
    ///
    /// Images are embedded in order. If any image fails, nothing is recorded.
    pub fn add_references(
        &mut self,
        provider: &dyn EmbeddingProvider,
        class: FoodClass,
        images: &[DynamicImage],
    ) -> Result<usize> {
        if images.is_empty() {
            return Err(AppError::InvalidInput("no reference images supplied".to_string()));
        }

        let embeddings = images
            .iter()
            .map(|image| provider.infer(image))
            .collect::<Result<Vec<Embedding>>>()?;

        let added = self.references.extend(class, embeddings)?;
        self.message = match class {
            FoodClass::Fresh => "Fresh references added".to_string(),
            FoodClass::Rotten => "Rotten references added".to_string(),
        };
        log::info!(
            "Added {} {} reference(s); now {} fresh, {} rotten",
            added,
            class,
            self.references.len(FoodClass::Fresh),
            self.references.len(FoodClass::Rotten)
        );
        Ok(added)
    }

    /// Check one test image against the current references.
    pub fn check(
        &mut self,
        provider: &dyn EmbeddingProvider,
        image: &DynamicImage,
    ) -> Result<Verdict> {
        let verdict = evaluate(provider, &self.references, image)?;
        log::info!("Verdict: {}", verdict);

        self.message = verdict.headline().to_string();
        self.verdict = Some(verdict.clone());
        Ok(verdict)
    }

    /// Forget every reference and the last verdict.
    pub fn reset(&mut self) {
        self.references.clear();
        self.verdict = None;
        self.message = IDLE_MESSAGE.to_string();
        log::debug!("Session reset");
    }

    /// The session's reference set.
    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    /// Which scoring branch the next check will take.
    pub fn reference_state(&self) -> ReferenceState {
        self.references.state()
    }

    /// Current status message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Verdict of the most recent successful check.
    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds an image as its mean RGB centered on mid-grey; fails on images
    /// wider than `max_width`.
    #[derive(Debug)]
    struct MeanColorEmbedder {
        calls: AtomicUsize,
        max_width: u32,
    }

    impl MeanColorEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                max_width: u32::MAX,
            }
        }
    }

    impl EmbeddingProvider for MeanColorEmbedder {
        fn infer(&self, image: &DynamicImage) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if image.width() > self.max_width {
                return Err(AppError::Internal("inference failed".to_string()));
            }
            let rgb = image.to_rgb8();
            let n = (rgb.width() * rgb.height()) as f32;
            let mut sum = [0.0f32; 3];
            for pixel in rgb.pixels() {
                for c in 0..3 {
                    sum[c] += f32::from(pixel[c]) / 255.0;
                }
            }
            Embedding::new(sum.iter().map(|s| s / n - 0.5).collect())
        }

        fn name(&self) -> &str {
            "mean-color"
        }
    }

    fn solid(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb(rgb)))
    }

    #[test]
    fn test_check_without_references_uses_color() {
        let provider = MeanColorEmbedder::new();
        let mut checker = FreshnessChecker::new();
        assert_eq!(checker.message(), IDLE_MESSAGE);

        let verdict = checker.check(&provider, &solid([0, 0, 0])).unwrap();
        assert!(verdict.is_rotten());
        assert_eq!(verdict.rotten_confidence(), 1.0);
        assert_eq!(verdict.reason(), "color=1.00 (no references)");
        assert_eq!(checker.message(), "Not safe to eat (likely rotten)");
        assert_eq!(checker.last_verdict(), Some(&verdict));
    }

    #[test]
    fn test_check_matches_closest_references() {
        let provider = MeanColorEmbedder::new();
        let mut checker = FreshnessChecker::new();

        checker
            .add_references(&provider, FoodClass::Fresh, &[solid([40, 200, 40])])
            .unwrap();
        assert_eq!(checker.message(), "Fresh references added");
        checker
            .add_references(&provider, FoodClass::Rotten, &[solid([120, 80, 30])])
            .unwrap();
        assert_eq!(checker.message(), "Rotten references added");
        assert_eq!(checker.reference_state(), ReferenceState::Full);

        let fresh = checker.check(&provider, &solid([50, 210, 50])).unwrap();
        assert!(!fresh.is_rotten(), "{}", fresh);
        assert_eq!(checker.message(), "Likely fresh / edible");

        let rotten = checker.check(&provider, &solid([125, 82, 28])).unwrap();
        assert!(rotten.is_rotten(), "{}", rotten);
        assert!(rotten.reason().starts_with("simFresh="));
    }

    #[test]
    fn test_failed_batch_records_nothing() {
        let provider = MeanColorEmbedder {
            calls: AtomicUsize::new(0),
            max_width: 16,
        };
        let mut checker = FreshnessChecker::new();

        let wide = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 16, Rgb([0, 0, 0])));
        let batch = [solid([10, 10, 10]), wide, solid([20, 20, 20])];
        assert!(checker.add_references(&provider, FoodClass::Fresh, &batch).is_err());

        assert!(checker.references().is_empty());
        assert_eq!(checker.message(), IDLE_MESSAGE);
        // Stops at the first failure
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let provider = MeanColorEmbedder::new();
        let mut checker = FreshnessChecker::new();
        assert!(matches!(
            checker.add_references(&provider, FoodClass::Rotten, &[]),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let provider = MeanColorEmbedder::new();
        let mut checker = FreshnessChecker::new();
        checker.reset();
        checker
            .add_references(&provider, FoodClass::Fresh, &[solid([1, 2, 3]), solid([4, 5, 6])])
            .unwrap();
        checker.check(&provider, &solid([255, 255, 255])).unwrap();
        checker.reset();

        assert_eq!(checker.references(), &ReferenceSet::default());
        assert_eq!(checker.reference_state(), ReferenceState::Empty);
        assert!(checker.last_verdict().is_none());
        assert_eq!(checker.message(), IDLE_MESSAGE);
    }
}
