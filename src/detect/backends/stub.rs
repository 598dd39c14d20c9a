use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::detect::backend::{DetectionCapability, DetectorBackend, DetectorOptions};
use crate::detect::result::{BoundingBox, Category, Detection};

/// Scripted backend for tests and headless runs.
///
/// Reports a fixed set of candidates on every call, or pops the next entry of
/// a per-call script when one is queued. Candidates go through
/// `DetectorOptions::apply` like real model output.
pub struct StubBackend {
    fixed: Vec<Detection>,
    centered: Option<Category>,
    script: VecDeque<Result<Vec<Detection>, String>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            fixed: Vec::new(),
            centered: None,
            script: VecDeque::new(),
            calls: 0,
        }
    }

    /// Same candidates for every frame.
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            fixed: detections,
            ..Self::new()
        }
    }

    /// One object covering the middle half of whatever frame comes in.
    pub fn centered(label: &str, score: f32) -> Self {
        Self {
            centered: Some(Category::new(label, score)),
            ..Self::new()
        }
    }

    /// Queue the candidates returned by the next call.
    pub fn push_result(&mut self, detections: Vec<Detection>) {
        self.script.push_back(Ok(detections));
    }

    /// Queue a failure for the next call.
    pub fn push_failure(&mut self, message: &str) {
        self.script.push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, image: &RgbaImage, options: &DetectorOptions) -> Result<Vec<Detection>> {
        self.calls += 1;
        let mut candidates = match self.script.pop_front() {
            Some(Ok(detections)) => detections,
            Some(Err(message)) => return Err(anyhow!("stub detector failure: {}", message)),
            None => self.fixed.clone(),
        };
        if let Some(category) = &self.centered {
            let (w, h) = (image.width() as f32, image.height() as f32);
            candidates.push(Detection::new(
                BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.75),
                vec![category.clone()],
            ));
        }
        Ok(options.apply(candidates))
    }
}
