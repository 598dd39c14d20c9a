use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::detect::result::Detection;

pub const DEFAULT_MAX_RESULTS: usize = 2;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Detection capabilities a backend may offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    ObjectDetection,
    Classification,
}

/// Options every backend honours on each `detect` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorOptions {
    pub max_results: usize,
    pub score_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl DetectorOptions {
    pub fn new(max_results: usize, score_threshold: f32) -> Result<Self> {
        let options = Self {
            max_results,
            score_threshold,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(anyhow!("max_results must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(anyhow!(
                "score_threshold must be within [0, 1], got {}",
                self.score_threshold
            ));
        }
        Ok(())
    }

    /// Bring raw candidates in line with the detector contract.
    ///
    /// Categories are sorted by descending score, detections without a
    /// category at or above the threshold are dropped, and the survivors are
    /// ordered by top score and truncated to `max_results`. Ties keep their
    /// original order.
    pub fn apply(&self, mut candidates: Vec<Detection>) -> Vec<Detection> {
        for detection in &mut candidates {
            detection
                .categories
                .sort_by(|a, b| b.score.total_cmp(&a.score));
        }
        candidates.retain(|detection| {
            detection
                .top_category()
                .is_some_and(|category| category.score >= self.score_threshold)
        });
        candidates.sort_by(|a, b| top_score(b).total_cmp(&top_score(a)));
        candidates.truncate(self.max_results);
        candidates
    }
}

fn top_score(detection: &Detection) -> f32 {
    detection
        .top_category()
        .map(|category| category.score)
        .unwrap_or(f32::NEG_INFINITY)
}

/// Object detector seam.
///
/// A backend is constructed once (model loading is expensive) and then called
/// once per frame. `detect` takes `&mut self`; callers that share a backend
/// across threads wrap it in a `Mutex`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a decoded frame.
    ///
    /// Returns at most `options.max_results` detections, each with a top
    /// score of at least `options.score_threshold`, ordered by descending
    /// top score.
    fn detect(&mut self, image: &RgbaImage, options: &DetectorOptions) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::{BoundingBox, Category};

    fn det(scores: &[(&str, f32)]) -> Detection {
        Detection::new(
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            scores
                .iter()
                .map(|(label, score)| Category::new(*label, *score))
                .collect(),
        )
    }

    #[test]
    fn defaults_match_preview_settings() {
        let options = DetectorOptions::default();
        assert_eq!(options.max_results, 2);
        assert_eq!(options.score_threshold, 0.5);
    }

    #[test]
    fn apply_filters_and_truncates() {
        let options = DetectorOptions::default();
        let out = options.apply(vec![
            det(&[("low", 0.3)]),
            det(&[("b", 0.7)]),
            det(&[("a", 0.9)]),
            det(&[("c", 0.6)]),
            det(&[]),
        ]);
        let labels: Vec<_> = out
            .iter()
            .map(|d| d.categories[0].label.as_str())
            .collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn apply_sorts_categories_within_a_detection() {
        let options = DetectorOptions::new(5, 0.5).unwrap();
        let out = options.apply(vec![det(&[("wolf", 0.2), ("dog", 0.8)])]);
        assert_eq!(out[0].categories[0].label, "dog");
    }

    #[test]
    fn threshold_is_inclusive() {
        let options = DetectorOptions::default();
        assert_eq!(options.apply(vec![det(&[("edge", 0.5)])]).len(), 1);
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(DetectorOptions::new(0, 0.5).is_err());
        assert!(DetectorOptions::new(2, 1.5).is_err());
        assert!(DetectorOptions::new(2, -0.1).is_err());
    }
}
