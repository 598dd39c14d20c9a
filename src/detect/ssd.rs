//! Decoding of SSD-style post-processed detector outputs.
//!
//! Mobile detection models commonly end in a post-processing op that emits
//! three tensors per image: `boxes [1, N, 4]` as normalized
//! `(ymin, xmin, ymax, xmax)`, `classes [1, N]` as class ids, and
//! `scores [1, N]`. This module maps them onto `Detection`s in frame pixel
//! coordinates.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::detect::result::{BoundingBox, Category, Detection};

/// Parse a label map: one label per line, line index is the class id.
///
/// Trailing whitespace is trimmed; blank lines keep their slot so ids stay
/// aligned with the model's class table.
pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines().map(|line| line.trim().to_string()).collect()
}

pub fn read_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label file {}", path.display()))?;
    Ok(parse_labels(&raw))
}

fn label_for(labels: &[String], class_id: f32) -> String {
    let id = class_id.max(0.0) as usize;
    match labels.get(id) {
        Some(label) if !label.is_empty() => label.clone(),
        _ => format!("class {}", id),
    }
}

/// Turn flat output tensors into detections scaled to `frame_width` x
/// `frame_height`.
///
/// No filtering happens here; the caller applies `DetectorOptions`.
pub fn decode_outputs(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    labels: &[String],
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<Detection>> {
    let count = scores.len();
    if classes.len() != count {
        return Err(anyhow!(
            "class tensor has {} entries, score tensor has {}",
            classes.len(),
            count
        ));
    }
    if boxes.len() != count * 4 {
        return Err(anyhow!(
            "box tensor has {} values, expected {}",
            boxes.len(),
            count * 4
        ));
    }

    let (fw, fh) = (frame_width as f32, frame_height as f32);
    let detections = (0..count)
        .map(|i| {
            let b = &boxes[i * 4..i * 4 + 4];
            let (ymin, xmin, ymax, xmax) = (
                b[0].clamp(0.0, 1.0),
                b[1].clamp(0.0, 1.0),
                b[2].clamp(0.0, 1.0),
                b[3].clamp(0.0, 1.0),
            );
            Detection::new(
                BoundingBox::new(xmin * fw, ymin * fh, xmax * fw, ymax * fh),
                vec![Category::new(label_for(labels, classes[i]), scores[i])],
            )
        })
        .collect();
    Ok(detections)
}
