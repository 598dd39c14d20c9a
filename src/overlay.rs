//! Overlay rendering: labelled bounding boxes drawn over a frame.
//!
//! Boxes are stroked 8 px wide, centred on the box edge. Labels start at
//! 96 px and shrink (never grow) so their measured width fits the box; they
//! are centred horizontally with the baseline one text height below the box
//! top. Output is a new bitmap; the input is never touched.

use std::path::Path;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, DetectionResult};

pub const DEFAULT_STROKE_WIDTH: u32 = 8;
pub const DEFAULT_FONT_SIZE: f32 = 96.0;
/// Fill plus a 2 px stroke: one pixel on each side of the glyph.
pub const DEFAULT_TEXT_OUTLINE: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    pub box_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
    pub stroke_width: u32,
    /// Starting label size; labels only ever shrink from here.
    pub font_size: f32,
    /// Outline drawn around label glyphs, in pixels per side.
    pub text_outline: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: Rgba([255, 0, 0, 255]),
            text_color: Rgba([255, 255, 255, 255]),
            stroke_width: DEFAULT_STROKE_WIDTH,
            font_size: DEFAULT_FONT_SIZE,
            text_outline: DEFAULT_TEXT_OUTLINE,
        }
    }
}

/// Where and how large a label is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelLayout {
    pub font_size: f32,
    /// Left edge of the text.
    pub x: f32,
    pub baseline: f32,
}

/// Fit a label measured at `base_size` into `bounding_box`.
///
/// `text_width`/`text_height` are the label extents at `base_size`. The size
/// is scaled by `box_width / text_width` only when that shrinks it, and the
/// horizontal margin is clamped at zero.
pub fn layout_label(
    bounding_box: &BoundingBox,
    text_width: f32,
    text_height: f32,
    base_size: f32,
) -> LabelLayout {
    let box_width = bounding_box.width();
    let mut font_size = base_size;
    if text_width > 0.0 {
        let fitted = base_size * box_width / text_width;
        if fitted < font_size {
            font_size = fitted.max(0.0);
        }
    }
    let margin = ((box_width - text_width) / 2.0).max(0.0);
    LabelLayout {
        font_size,
        x: bounding_box.left + margin,
        baseline: bounding_box.top + text_height,
    }
}

/// Draws detection results onto bitmaps.
pub struct OverlayRenderer {
    style: OverlayStyle,
    font: Option<FontVec>,
}

impl OverlayRenderer {
    /// Renderer without a font: boxes only.
    pub fn new(style: OverlayStyle) -> Self {
        Self { style, font: None }
    }

    pub fn with_font(style: OverlayStyle, font: FontVec) -> Self {
        Self {
            style,
            font: Some(font),
        }
    }

    /// Load a TrueType/OpenType font for labels.
    pub fn from_font_file(style: OverlayStyle, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font file {}: {}", path.display(), e))?;
        Ok(Self::with_font(style, font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw results over a copy of `base`.
    pub fn render(&self, base: &RgbaImage, results: &[DetectionResult]) -> RgbaImage {
        let mut canvas = base.clone();
        self.draw_all(&mut canvas, results);
        canvas
    }

    /// Draw results onto a fully transparent `width` x `height` layer, for
    /// display stacked above the live preview.
    pub fn render_layer(&self, width: u32, height: u32, results: &[DetectionResult]) -> RgbaImage {
        let mut canvas = RgbaImage::new(width, height);
        self.draw_all(&mut canvas, results);
        canvas
    }

    fn draw_all(&self, canvas: &mut RgbaImage, results: &[DetectionResult]) {
        for result in results {
            if !is_finite(&result.bounding_box) {
                log::debug!("overlay: skipping non-finite box for '{}'", result.text);
                continue;
            }
            self.draw_box(canvas, &result.bounding_box);
            if let Some(font) = &self.font {
                self.draw_label(canvas, font, result);
            }
        }
    }

    fn draw_box(&self, canvas: &mut RgbaImage, bounding_box: &BoundingBox) {
        // Edges further out than one stroke width never reach the canvas.
        let stroke = self.style.stroke_width.min(i32::MAX as u32 / 4) as i32;
        let (cw, ch) = canvas.dimensions();
        let clamp_x = |v: f32| v.clamp(-(stroke as f32), cw as f32 + stroke as f32).round() as i32;
        let clamp_y = |v: f32| v.clamp(-(stroke as f32), ch as f32 + stroke as f32).round() as i32;
        let left = clamp_x(bounding_box.left);
        let top = clamp_y(bounding_box.top);
        let width = clamp_x(bounding_box.right) - left;
        let height = clamp_y(bounding_box.bottom) - top;

        // Stroke straddles the edge: half outside, half inside.
        let outer = stroke / 2;
        for inset in -outer..(stroke - outer) {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                continue;
            }
            let rect = Rect::at(left + inset, top + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, self.style.box_color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbaImage, font: &FontVec, result: &DetectionResult) {
        let base_scale = PxScale::from(self.style.font_size);
        let (text_width, text_height) = text_size(base_scale, font, &result.text);
        let layout = layout_label(
            &result.bounding_box,
            text_width as f32,
            text_height as f32,
            self.style.font_size,
        );
        if layout.font_size <= 0.0 {
            return;
        }

        // imageproc positions text by its top edge; the baseline sits one
        // ascent below it.
        let scale = PxScale::from(layout.font_size);
        let ascent = font.as_scaled(scale).ascent();
        let (cw, ch) = canvas.dimensions();
        let (Some(x), Some(y)) = (
            label_origin(layout.x, cw),
            label_origin(layout.baseline - ascent, ch),
        ) else {
            return;
        };

        // Fill and stroke in one colour: repeat the glyphs at every offset
        // within the outline radius.
        let outline = self.style.text_outline.min(8) as i32;
        for dy in -outline..=outline {
            for dx in -outline..=outline {
                draw_text_mut(
                    canvas,
                    self.style.text_color,
                    x + dx,
                    y + dy,
                    scale,
                    font,
                    &result.text,
                );
            }
        }
    }
}

fn is_finite(bounding_box: &BoundingBox) -> bool {
    [
        bounding_box.left,
        bounding_box.top,
        bounding_box.right,
        bounding_box.bottom,
    ]
    .iter()
    .all(|v| v.is_finite())
}

/// Integer label origin, or `None` when text starting there cannot land on
/// a canvas axis of length `extent`.
fn label_origin(value: f32, extent: u32) -> Option<i32> {
    const REACH: f32 = (1 << 20) as f32;
    if !value.is_finite() || value >= extent as f32 || value < -REACH {
        return None;
    }
    Some(value.round() as i32)
}
