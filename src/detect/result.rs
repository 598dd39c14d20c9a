/// Axis-aligned box in image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// One label candidate for a detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub label: String,
    /// Confidence in [0, 1].
    pub score: f32,
}

impl Category {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Object found by a detector: a box plus label candidates ordered by
/// descending score.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub categories: Vec<Category>,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, categories: Vec<Category>) -> Self {
        Self {
            bounding_box,
            categories,
        }
    }

    pub fn top_category(&self) -> Option<&Category> {
        self.categories.first()
    }
}

/// Display-ready record: the box and a precomputed "label, NN%" string.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub bounding_box: BoundingBox,
    pub text: String,
}

impl DetectionResult {
    /// Map a detection using its top category only.
    ///
    /// Returns `None` for a detection without categories.
    pub fn from_detection(detection: &Detection) -> Option<Self> {
        let category = detection.top_category()?;
        Some(Self {
            bounding_box: detection.bounding_box,
            text: format!("{}, {}%", category.label, confidence_percent(category.score)),
        })
    }
}

/// Score as a whole percentage, truncated toward zero.
pub fn confidence_percent(score: f32) -> i32 {
    (score * 100.0) as i32
}

/// Map detections to display records, preserving order.
///
/// Detections without categories are skipped; the rest are still mapped.
pub fn map_detections(detections: &[Detection]) -> Vec<DetectionResult> {
    detections
        .iter()
        .enumerate()
        .filter_map(|(index, detection)| {
            let result = DetectionResult::from_detection(detection);
            if result.is_none() {
                log::debug!("detection {} has no categories; skipped", index);
            }
            result
        })
        .collect()
}

/// Dump every detection with all of its categories at debug level.
pub fn log_detections(detections: &[Detection]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    for (i, detection) in detections.iter().enumerate() {
        let b = &detection.bounding_box;
        log::debug!("detected object {}", i);
        log::debug!(
            "  bounding box: ({}, {}) - ({}, {})",
            b.left,
            b.top,
            b.right,
            b.bottom
        );
        for (j, category) in detection.categories.iter().enumerate() {
            log::debug!("    label {}: {}", j, category.label);
            log::debug!("    confidence: {}%", confidence_percent(category.score));
        }
    }
}
