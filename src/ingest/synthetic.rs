//! Synthetic camera (`stub://`).
//!
//! Produces NV21 frames of a dim gradient with a bright block sweeping across
//! it, plus a little seeded sensor noise. Used by tests and headless demos in
//! place of real camera hardware.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::normalize::nv21_len;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// `stub://<name>`
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Seed for sensor noise; equal seeds give equal frame sequences.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            seed: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!("synthetic source expects a stub:// url, got {}", config.url));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "synthetic source needs non-zero dimensions, got {}x{}",
                config.width,
                config.height
            ));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            rng,
            frame_count: 0,
            connected: false,
        })
    }

    fn generate_nv21(&mut self) -> Result<Vec<u8>> {
        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let len = nv21_len(self.config.width, self.config.height)
            .ok_or_else(|| anyhow!("synthetic frame dimensions overflow"))?;
        let mut data = vec![128u8; len];

        let block = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(block).max(1);
        let block_x = (self.frame_count as usize * 8) % travel;
        let block_y = h.saturating_sub(block) / 2;

        for y in 0..h {
            for x in 0..w {
                let inside = x >= block_x && x < block_x + block && y >= block_y && y < block_y + block;
                let base = if inside {
                    220
                } else {
                    40 + (x * 80 / w.max(1)) as i32
                };
                let noise: i32 = self.rng.gen_range(-3..=3);
                data[y * w + x] = (base + noise).clamp(0, 255) as u8;
            }
        }
        Ok(data)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        self.frame_count += 1;
        let data = self.generate_nv21()?;
        Ok(Some(Frame::nv21(
            data,
            self.config.width,
            self.config.height,
            self.frame_count,
        )))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
