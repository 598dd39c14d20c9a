//! Hand-off of rendered overlays to the display context.
//!
//! Frames are processed on the frame source's worker thread; overlays must be
//! shown from the display (main) thread. `display_queue` builds the single
//! hand-off point: any number of `DisplayHandle`s push overlays, one
//! `DisplayReceiver` on the display thread pulls them. When the display falls
//! behind, `recv_latest` coalesces the backlog down to the newest overlay.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;

use crate::detect::DetectionResult;

/// Overlay produced for one frame.
#[derive(Clone, Debug)]
pub struct RenderedOverlay {
    pub sequence: u64,
    pub image: RgbaImage,
    pub results: Vec<DetectionResult>,
}

/// Producer side of the display queue.
#[derive(Clone)]
pub struct DisplayHandle {
    tx: Sender<RenderedOverlay>,
}

impl DisplayHandle {
    /// Queue an overlay for display. Fails once the receiver is gone.
    pub fn submit(&self, overlay: RenderedOverlay) -> Result<()> {
        self.tx
            .send(overlay)
            .map_err(|_| anyhow!("display receiver disconnected"))
    }
}

/// Consumer side of the display queue. Lives on the display thread.
pub struct DisplayReceiver {
    rx: Receiver<RenderedOverlay>,
    coalesced: u64,
}

pub fn display_queue() -> (DisplayHandle, DisplayReceiver) {
    let (tx, rx) = mpsc::channel();
    (
        DisplayHandle { tx },
        DisplayReceiver { rx, coalesced: 0 },
    )
}

impl DisplayReceiver {
    /// Block for the next overlay, then drop any older backlog in favour of
    /// the newest one. `None` once every handle is gone and the queue is empty.
    pub fn recv_latest(&mut self) -> Option<RenderedOverlay> {
        let first = self.rx.recv().ok()?;
        Some(self.drain_newer(first))
    }

    /// Overlays discarded because a newer one was already queued.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    fn drain_newer(&mut self, mut latest: RenderedOverlay) -> RenderedOverlay {
        for newer in self.rx.try_iter() {
            log::debug!(
                "display: frame {} superseded by frame {}",
                latest.sequence,
                newer.sequence
            );
            self.coalesced += 1;
            latest = newer;
        }
        latest
    }
}

/// Where overlays end up.
pub trait DisplaySink {
    fn show(&mut self, overlay: &RenderedOverlay) -> Result<()>;
}

/// Writes each overlay to `<dir>/overlay_<sequence>.png`.
pub struct PngSink {
    dir: PathBuf,
}

impl PngSink {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("overlay_{:06}.png", sequence))
    }
}

impl DisplaySink for PngSink {
    fn show(&mut self, overlay: &RenderedOverlay) -> Result<()> {
        let path = self.path_for(overlay.sequence);
        overlay
            .image
            .save(&path)
            .with_context(|| format!("failed to write overlay {}", path.display()))?;
        Ok(())
    }
}

/// Keeps the last overlay and a count; for headless runs and tests.
#[derive(Default)]
pub struct CountingSink {
    pub shown: u64,
    pub last: Option<RenderedOverlay>,
}

impl DisplaySink for CountingSink {
    fn show(&mut self, overlay: &RenderedOverlay) -> Result<()> {
        self.shown += 1;
        self.last = Some(overlay.clone());
        Ok(())
    }
}

/// Drive the display side until every producer is gone.
///
/// Returns the number of overlays shown. Sink errors are logged and do not
/// stop the loop.
pub fn run_display_loop<S: DisplaySink + ?Sized>(
    receiver: &mut DisplayReceiver,
    sink: &mut S,
) -> u64 {
    let mut shown = 0u64;
    while let Some(overlay) = receiver.recv_latest() {
        match sink.show(&overlay) {
            Ok(()) => shown += 1,
            Err(e) => log::warn!("display: frame {} not shown: {:#}", overlay.sequence, e),
        }
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(sequence: u64) -> RenderedOverlay {
        RenderedOverlay {
            sequence,
            image: RgbaImage::new(2, 2),
            results: Vec::new(),
        }
    }

    #[test]
    fn backlog_coalesces_to_newest() {
        let (handle, mut receiver) = display_queue();
        for seq in 1..=4 {
            handle.submit(overlay(seq)).unwrap();
        }
        let latest = receiver.recv_latest().unwrap();
        assert_eq!(latest.sequence, 4);
        assert_eq!(receiver.coalesced(), 3);
    }

    #[test]
    fn closed_queue_ends_the_display_loop() {
        let (handle, mut receiver) = display_queue();
        handle.submit(overlay(1)).unwrap();
        drop(handle);

        let mut sink = CountingSink::default();
        assert_eq!(run_display_loop(&mut receiver, &mut sink), 1);
        assert_eq!(sink.last.unwrap().sequence, 1);
    }

    #[test]
    fn submit_fails_without_receiver() {
        let (handle, receiver) = display_queue();
        drop(receiver);
        assert!(handle.submit(overlay(1)).is_err());
    }

    #[test]
    fn png_sink_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSink::new(dir.path()).unwrap();
        sink.show(&overlay(7)).unwrap();
        let path = sink.path_for(7);
        assert!(path.ends_with("overlay_000007.png"));
        let written = image::open(&path).unwrap();
        assert_eq!(written.width(), 2);
    }
}
