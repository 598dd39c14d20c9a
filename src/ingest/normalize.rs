use anyhow::{anyhow, Result};

/// Expected byte length of an NV21 frame.
///
/// Odd dimensions round the chroma plane up, matching camera HALs that pad
/// the last chroma row/column.
pub(crate) fn nv21_len(width: u32, height: u32) -> Option<usize> {
    let w = width as usize;
    let h = height as usize;
    let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?.checked_mul(2)?;
    w.checked_mul(h)?.checked_add(chroma)
}

/// Convert an NV21 buffer (Y plane, then interleaved V/U at quarter
/// resolution) into packed RGB24 using full-range BT.601 coefficients.
pub(crate) fn nv21_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let expected = nv21_len(width, height).ok_or_else(|| anyhow!("NV21 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV21 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let y_plane = w * h;
    let chroma_row = w.div_ceil(2) * 2;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let vu_index = y_plane + (j / 2) * chroma_row + (i / 2) * 2;
            let v = pixels[vu_index] as f32 - 128.0;
            let u = pixels[vu_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
