//! Still-image directory source.
//!
//! Replays the files of a local directory, in name order, as camera frames:
//! - `.jpg`, `.jpeg`, `.png` become platform-image frames (compressed bytes
//!   in the first plane)
//! - `.nv21` files become NV21 frames with the configured dimensions
//! - anything else becomes a frame with an unsupported encoding, which the
//!   pipeline skips

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    /// Dimensions of raw `.nv21` files.
    pub width: u32,
    pub height: u32,
    /// Start over after the last file instead of ending the stream.
    pub repeat: bool,
}

pub struct DirectorySource {
    config: DirectoryConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    connected: bool,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        if !config.path.is_dir() {
            return Err(anyhow!(
                "frame directory {} does not exist",
                config.path.display()
            ));
        }
        Ok(Self {
            config,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            connected: false,
        })
    }

    fn load(&self, path: &Path) -> Result<Frame> {
        let sequence = self.frame_count;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "jpg" | "jpeg" | "png" => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read frame {}", path.display()))?;
                let (width, height) = image::image_dimensions(path)
                    .with_context(|| format!("failed to read dimensions of {}", path.display()))?;
                Ok(Frame::from_encoded(bytes, width, height, sequence))
            }
            "nv21" => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read frame {}", path.display()))?;
                Ok(Frame::nv21(
                    bytes,
                    self.config.width,
                    self.config.height,
                    sequence,
                ))
            }
            other => Ok(Frame::unsupported(
                if other.is_empty() { "unknown" } else { other },
                self.config.width,
                self.config.height,
                sequence,
            )),
        }
    }
}

impl FrameSource for DirectorySource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.config.path).with_context(|| {
            format!("failed to list frame directory {}", self.config.path.display())
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "DirectorySource: {} files in {}",
            files.len(),
            self.config.path.display()
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("directory source not connected; call connect() first"));
        }
        if self.files.is_empty() {
            return Ok(None);
        }
        if self.cursor >= self.files.len() {
            if !self.config.repeat {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = self.files[self.cursor].clone();
        self.cursor += 1;
        self.frame_count += 1;
        self.load(&path).map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FramePayload;
    use image::{Rgba, RgbaImage};

    fn config(path: &Path, repeat: bool) -> DirectoryConfig {
        DirectoryConfig {
            path: path.to_path_buf(),
            width: 4,
            height: 2,
            repeat,
        }
    }

    #[test]
    fn files_replay_in_name_order_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(6, 5, Rgba([1, 2, 3, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("b.nv21"), vec![128u8; 12]).unwrap();
        std::fs::write(dir.path().join("c.bmpx"), b"??").unwrap();

        let mut source = DirectorySource::new(config(dir.path(), false)).unwrap();
        source.connect().unwrap();

        let first = source.next_frame().unwrap().unwrap();
        assert!(matches!(first.payload, FramePayload::Planes(_)));
        assert_eq!((first.width, first.height), (6, 5));

        let second = source.next_frame().unwrap().unwrap();
        assert!(matches!(second.payload, FramePayload::Nv21(_)));

        let third = source.next_frame().unwrap().unwrap();
        assert_eq!(third.payload.encoding(), "bmpx");

        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn repeat_wraps_around() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.nv21"), vec![128u8; 12]).unwrap();
        let mut source = DirectorySource::new(config(dir.path(), true)).unwrap();
        source.connect().unwrap();
        for expected in 1..=3 {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.sequence, expected);
        }
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let mut source = DirectorySource::new(config(dir.path(), false)).unwrap();
        source.connect().unwrap();
        let err = source.next_frame().unwrap_err();
        assert!(format!("{:#}", err).contains("broken.png"));
    }

    #[test]
    fn missing_directory_is_rejected() {
        assert!(DirectorySource::new(config(Path::new("/nonexistent/frames"), false)).is_err());
    }
}
