//! Camera frames and the frame decoder.
//!
//! A `Frame` is what a frame source hands to the pipeline callback: a pixel
//! payload tagged with its encoding, plus dimensions and a sequence number.
//! Frames are ephemeral; they are produced and consumed within one callback
//! invocation and are never persisted.
//!
//! `decode_frame` turns a frame into an RGBA bitmap:
//! - `Nv21` payloads are converted to RGB, JPEG-encoded at quality 90 over the
//!   full frame rectangle, and decoded back. The lossy round trip is the
//!   normalization step every NV21 frame goes through.
//! - `Planes` payloads carry already-compressed bytes in their first plane.
//! - Anything else decodes to nothing.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};

use crate::ingest::normalize::nv21_to_rgb;

/// Quality used for the NV21 → JPEG normalization step.
pub const JPEG_QUALITY: u8 = 90;

/// One image plane of a platform image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub row_stride: u32,
    pub pixel_stride: u32,
}

impl Plane {
    /// A plane holding a compressed image (JPEG/PNG) rather than raw samples.
    pub fn encoded(data: Vec<u8>) -> Self {
        Self {
            data,
            row_stride: 0,
            pixel_stride: 0,
        }
    }
}

/// Pixel payload of a frame, tagged by encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FramePayload {
    /// Packed NV21: full-resolution Y plane followed by interleaved V/U.
    Nv21(Vec<u8>),
    /// Platform image planes. The first plane holds decodable image bytes.
    Planes(Vec<Plane>),
    /// Any other encoding. Never decoded.
    Unsupported { format: String },
}

impl FramePayload {
    pub fn encoding(&self) -> &str {
        match self {
            FramePayload::Nv21(_) => "nv21",
            FramePayload::Planes(_) => "planes",
            FramePayload::Unsupported { format } => format,
        }
    }
}

/// A single camera capture delivered to the processing callback.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Monotonic per source.
    pub sequence: u64,
    pub payload: FramePayload,
}

impl Frame {
    pub fn nv21(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            width,
            height,
            sequence,
            payload: FramePayload::Nv21(data),
        }
    }

    /// Frame whose single plane holds compressed image bytes.
    pub fn from_encoded(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            width,
            height,
            sequence,
            payload: FramePayload::Planes(vec![Plane::encoded(data)]),
        }
    }

    pub fn unsupported(format: &str, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            width,
            height,
            sequence,
            payload: FramePayload::Unsupported {
                format: format.to_string(),
            },
        }
    }
}

/// Decode a frame into an RGBA bitmap.
///
/// Returns `Ok(None)` when the frame carries nothing decodable (unsupported
/// encoding, no planes). Malformed payloads are errors; callers skip the frame
/// either way.
pub fn decode_frame(frame: &Frame) -> Result<Option<RgbaImage>> {
    match &frame.payload {
        FramePayload::Nv21(data) => nv21_round_trip(data, frame.width, frame.height).map(Some),
        FramePayload::Planes(planes) => match planes.first() {
            Some(plane) => decode_compressed(&plane.data).map(Some),
            None => {
                log::debug!("frame {}: platform image has no planes", frame.sequence);
                Ok(None)
            }
        },
        FramePayload::Unsupported { format } => {
            log::debug!(
                "frame {}: unsupported encoding '{}'",
                frame.sequence,
                format
            );
            Ok(None)
        }
    }
}

fn nv21_round_trip(data: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(anyhow!("NV21 frame has empty dimensions {}x{}", width, height));
    }
    let rgb = nv21_to_rgb(data, width, height)?;
    let rgb = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .context("JPEG-encode NV21 frame")?;

    decode_compressed(&jpeg)
}

fn decode_compressed(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes).context("decode frame image bytes")?;
    Ok(image.to_rgba8())
}
