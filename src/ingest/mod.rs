//! Frame sources.
//!
//! Camera hardware is out of scope; a `FrameSource` is anything that can hand
//! out frames one at a time:
//! - `stub://` synthetic camera (tests, headless demos)
//! - a local directory of still images or raw NV21 dumps
//!
//! `run_source` is the worker loop that pulls frames from a source and feeds
//! them to the pipeline callback, paced to a target frame rate.

pub mod directory;
pub(crate) mod normalize;
pub mod synthetic;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::pipeline::{FrameOutcome, Pipeline};

pub use directory::{DirectoryConfig, DirectorySource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Build a source from a url: `stub://<name>` or a local directory path.
///
/// `repeat` only applies to directories; the synthetic camera never ends.
pub fn open_source(
    url: &str,
    width: u32,
    height: u32,
    repeat: bool,
) -> Result<Box<dyn FrameSource>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: url.to_string(),
            width,
            height,
            seed: 0,
        })?));
    }
    if url.contains("://") {
        return Err(anyhow!(
            "unsupported frame source '{}'; expected stub:// or a local directory",
            url
        ));
    }
    Ok(Box::new(DirectorySource::new(DirectoryConfig {
        path: PathBuf::from(url),
        width,
        height,
        repeat,
    })?))
}

/// Counters returned by `run_source`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: u64,
    pub rendered: u64,
}

/// Pull frames from `source` into `pipeline` until the source runs dry,
/// `max_frames` have been delivered, or `stop` is raised.
///
/// Source errors end the loop and are returned; per-frame pipeline failures
/// are already absorbed by the pipeline.
pub fn run_source(
    source: &mut dyn FrameSource,
    pipeline: &Pipeline,
    stop: &AtomicBool,
    max_frames: Option<u64>,
    target_fps: u32,
) -> Result<DeliveryReport> {
    let interval = frame_interval(target_fps);
    let mut report = DeliveryReport::default();

    while !stop.load(Ordering::Relaxed) {
        if max_frames.is_some_and(|max| report.delivered >= max) {
            break;
        }
        let started = Instant::now();
        let Some(frame) = source.next_frame()? else {
            log::info!("source {} exhausted", source.stats().source);
            break;
        };
        report.delivered += 1;
        if let FrameOutcome::Rendered { .. } = pipeline.on_frame(frame) {
            report.rendered += 1;
        }

        let elapsed = started.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
    Ok(report)
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_handles_zero_fps() {
        assert_eq!(frame_interval(0), Duration::from_millis(0));
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(frame_interval(5000), Duration::from_millis(1));
    }

    #[test]
    fn open_source_rejects_network_urls() {
        assert!(open_source("rtsp://camera/stream", 640, 480, false).is_err());
        assert!(open_source("stub://camera", 64, 48, false).is_ok());
    }

    #[test]
    fn open_source_passes_repeat_to_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.nv21"), vec![128u8; 12]).unwrap();
        let url = dir.path().to_str().unwrap();

        let mut once = open_source(url, 4, 2, false).unwrap();
        once.connect().unwrap();
        assert!(once.next_frame().unwrap().is_some());
        assert!(once.next_frame().unwrap().is_none());

        let mut looping = open_source(url, 4, 2, true).unwrap();
        looping.connect().unwrap();
        for _ in 0..3 {
            assert!(looping.next_frame().unwrap().is_some());
        }
    }
}
