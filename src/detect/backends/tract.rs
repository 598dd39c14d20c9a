#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbaImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend, DetectorOptions};
use crate::detect::result::Detection;
use crate::detect::ssd;

/// Tract-based backend for ONNX object-detection models.
///
/// Loads the model once; every `detect` call resizes the frame to the model
/// input, runs the plan and decodes SSD-style `boxes`/`classes`/`scores`
/// outputs back into frame coordinates.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            labels: Vec::new(),
        })
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    fn build_input(&self, image: &RgbaImage) -> Tensor {
        let resized = image::imageops::resize(
            image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "model produced {} outputs, expected boxes, classes and scores",
                outputs.len()
            ));
        }
        let boxes = flatten(&outputs[0]).context("boxes output")?;
        let classes = flatten(&outputs[1]).context("classes output")?;
        let scores = flatten(&outputs[2]).context("scores output")?;
        ssd::decode_outputs(&boxes, &classes, &scores, &self.labels, width, height)
    }
}

fn flatten(value: &TValue) -> Result<Vec<f32>> {
    let tensor = value.cast_to::<f32>()?;
    let view = tensor
        .to_array_view::<f32>()
        .context("output tensor was not f32")?;
    Ok(view.iter().copied().collect())
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, image: &RgbaImage, options: &DetectorOptions) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let candidates = self.decode(outputs, image.width(), image.height())?;
        Ok(options.apply(candidates))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbaImage::new(self.input_width, self.input_height);
        self.detect(&blank, &DetectorOptions::default()).map(|_| ())
    }
}
