//! Per-frame pipeline: decode → detect → map → render → display.
//!
//! `Pipeline::on_frame` is the frame source callback. It runs every stage
//! synchronously on the caller's thread and hands the overlay to the display
//! queue, the only cross-thread hand-off.
//!
//! The detector is constructed once by the caller and shared behind a mutex.
//! Frames that arrive while another frame is still being processed are
//! dropped, not queued: the preview only cares about the newest frame and a
//! backlog would only add latency.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::detect::{
    log_detections, map_detections, Detection, DetectorOptions, SharedBackend,
};
use crate::display::{DisplayHandle, RenderedOverlay};
use crate::frame::{decode_frame, Frame};
use crate::overlay::OverlayRenderer;

const IDLE: u8 = 0;
const PROCESSING: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ProcessingFrame,
}

/// What the overlay is drawn on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverlayMode {
    /// Boxes drawn over a copy of the decoded frame.
    #[default]
    Composite,
    /// Boxes drawn on a transparent layer the size of the frame.
    Layer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Unsupported encoding or an empty payload.
    NoImage,
    DecodeFailed,
    DetectorFailed,
    DisplayClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Overlay handed to the display with this many results drawn.
    Rendered { results: usize },
    Skipped(SkipReason),
    /// Arrived while another frame was in flight.
    Dropped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub frames_dropped: u64,
    pub results_drawn: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    rendered: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    results: AtomicU64,
}

pub struct Pipeline {
    detector: SharedBackend,
    options: DetectorOptions,
    renderer: OverlayRenderer,
    mode: OverlayMode,
    display: Mutex<Option<DisplayHandle>>,
    state: AtomicU8,
    shut_down: AtomicBool,
    counters: Counters,
}

/// Returns the pipeline to `Idle` on every exit path.
struct ProcessingGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// Shuts the pipeline down when dropped, unwinding included, so the display
/// loop always sees the queue close.
pub struct ShutdownGuard<'a> {
    pipeline: &'a Pipeline,
}

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.shutdown();
    }
}

impl Pipeline {
    pub fn new(
        detector: SharedBackend,
        options: DetectorOptions,
        renderer: OverlayRenderer,
        display: DisplayHandle,
    ) -> Self {
        Self {
            detector,
            options,
            renderer,
            mode: OverlayMode::default(),
            display: Mutex::new(Some(display)),
            state: AtomicU8::new(IDLE),
            shut_down: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn with_mode(mut self, mode: OverlayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn state(&self) -> PipelineState {
        match self.state.load(Ordering::Acquire) {
            IDLE => PipelineState::Idle,
            _ => PipelineState::ProcessingFrame,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_received: self.counters.received.load(Ordering::Relaxed),
            frames_rendered: self.counters.rendered.load(Ordering::Relaxed),
            frames_skipped: self.counters.skipped.load(Ordering::Relaxed),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
            results_drawn: self.counters.results.load(Ordering::Relaxed),
        }
    }

    /// Frame source callback.
    pub fn on_frame(&self, frame: Frame) -> FrameOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if self
            .state
            .compare_exchange(IDLE, PROCESSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("frame {}: dropped, previous frame still in flight", frame.sequence);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::Dropped;
        }
        let _guard = ProcessingGuard { state: &self.state };

        let outcome = self.process(frame);
        match outcome {
            FrameOutcome::Rendered { results } => {
                self.counters.rendered.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .results
                    .fetch_add(results as u64, Ordering::Relaxed);
            }
            FrameOutcome::Skipped(_) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            FrameOutcome::Dropped => {}
        }
        outcome
    }

    /// Stop handing overlays to the display. Later frames are skipped.
    ///
    /// Dropping the display handle lets the display loop finish once it has
    /// drained the queue. The detector is released with the pipeline.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        match self.display.lock() {
            Ok(mut display) => {
                display.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
        let stats = self.stats();
        log::info!(
            "pipeline shut down: {} received, {} rendered, {} skipped, {} dropped",
            stats.frames_received,
            stats.frames_rendered,
            stats.frames_skipped,
            stats.frames_dropped
        );
    }

    /// Tie `shutdown` to the end of the current scope.
    pub fn shutdown_on_drop(&self) -> ShutdownGuard<'_> {
        ShutdownGuard { pipeline: self }
    }

    fn process(&self, frame: Frame) -> FrameOutcome {
        let sequence = frame.sequence;
        if self.shut_down.load(Ordering::Acquire) {
            return FrameOutcome::Skipped(SkipReason::DisplayClosed);
        }

        let image = match decode_frame(&frame) {
            Ok(Some(image)) => image,
            Ok(None) => {
                log::debug!(
                    "frame {}: nothing to decode ({})",
                    sequence,
                    frame.payload.encoding()
                );
                return FrameOutcome::Skipped(SkipReason::NoImage);
            }
            Err(e) => {
                log::debug!("frame {}: decode failed: {:#}", sequence, e);
                return FrameOutcome::Skipped(SkipReason::DecodeFailed);
            }
        };
        drop(frame);

        let detections = match self.detect(&image) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("frame {}: detection failed: {:#}", sequence, e);
                return FrameOutcome::Skipped(SkipReason::DetectorFailed);
            }
        };
        log_detections(&detections);

        let results = map_detections(&detections);
        let rendered = match self.mode {
            OverlayMode::Composite => self.renderer.render(&image, &results),
            OverlayMode::Layer => self
                .renderer
                .render_layer(image.width(), image.height(), &results),
        };
        let count = results.len();
        let overlay = RenderedOverlay {
            sequence,
            image: rendered,
            results,
        };

        match self.submit(overlay) {
            Ok(()) => FrameOutcome::Rendered { results: count },
            Err(e) => {
                log::debug!("frame {}: {:#}", sequence, e);
                FrameOutcome::Skipped(SkipReason::DisplayClosed)
            }
        }
    }

    fn detect(&self, image: &RgbaImage) -> Result<Vec<Detection>> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        detector.detect(image, &self.options)
    }

    fn submit(&self, overlay: RenderedOverlay) -> Result<()> {
        let display = self
            .display
            .lock()
            .map_err(|_| anyhow!("display handle lock poisoned"))?;
        match display.as_ref() {
            Some(handle) => handle.submit(overlay),
            None => Err(anyhow!("display closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{
        BoundingBox, Category, DetectionCapability, DetectorBackend, StubBackend,
    };
    use crate::display::display_queue;
    use crate::overlay::OverlayStyle;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Arc;

    fn gray_frame(sequence: u64) -> Frame {
        let (w, h) = (32u32, 24u32);
        Frame::nv21(vec![128u8; (w * h * 3 / 2) as usize], w, h, sequence)
    }

    fn pipeline_with(backend: impl DetectorBackend + 'static) -> (Pipeline, crate::display::DisplayReceiver) {
        let (handle, receiver) = display_queue();
        let detector: SharedBackend = Arc::new(Mutex::new(backend));
        let pipeline = Pipeline::new(
            detector,
            DetectorOptions::default(),
            OverlayRenderer::new(OverlayStyle::default()),
            handle,
        );
        (pipeline, receiver)
    }

    struct BlockingBackend {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl DetectorBackend for BlockingBackend {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            matches!(capability, DetectionCapability::ObjectDetection)
        }

        fn detect(&mut self, _: &RgbaImage, _: &DetectorOptions) -> Result<Vec<Detection>> {
            self.entered.send(()).ok();
            self.release.recv().ok();
            Ok(Vec::new())
        }
    }

    #[test]
    fn overlapping_frame_is_dropped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let (pipeline, _receiver) = pipeline_with(BlockingBackend {
            entered: entered_tx,
            release: release_rx,
        });
        let pipeline = Arc::new(pipeline);

        let worker = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || pipeline.on_frame(gray_frame(1)))
        };
        entered_rx.recv().unwrap();
        assert_eq!(pipeline.state(), PipelineState::ProcessingFrame);
        assert_eq!(pipeline.on_frame(gray_frame(2)), FrameOutcome::Dropped);

        release_tx.send(()).unwrap();
        assert_eq!(
            worker.join().unwrap(),
            FrameOutcome::Rendered { results: 0 }
        );
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let stats = pipeline.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_rendered, 1);
    }

    #[test]
    fn skipped_frames_return_to_idle() {
        let (pipeline, _receiver) = pipeline_with(StubBackend::new());
        let outcome = pipeline.on_frame(Frame::unsupported("rgb565", 4, 4, 1));
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::NoImage));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let outcome = pipeline.on_frame(Frame::nv21(vec![0u8; 3], 4, 4, 2));
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::DecodeFailed));
        assert_eq!(pipeline.stats().frames_skipped, 2);
    }

    #[test]
    fn detector_failure_skips_only_that_frame() {
        let mut backend = StubBackend::with_detections(vec![Detection::new(
            BoundingBox::new(2.0, 2.0, 20.0, 20.0),
            vec![Category::new("cup", 0.8)],
        )]);
        backend.push_failure("transient");
        let (pipeline, mut receiver) = pipeline_with(backend);

        assert_eq!(
            pipeline.on_frame(gray_frame(1)),
            FrameOutcome::Skipped(SkipReason::DetectorFailed)
        );
        assert_eq!(
            pipeline.on_frame(gray_frame(2)),
            FrameOutcome::Rendered { results: 1 }
        );
        let overlay = receiver.recv_latest().unwrap();
        assert_eq!(overlay.sequence, 2);
        assert_eq!(overlay.results[0].text, "cup, 80%");
    }

    #[test]
    fn layer_mode_renders_on_transparent_canvas() {
        let backend = StubBackend::centered("person", 0.9);
        let (pipeline, mut receiver) = pipeline_with(backend);
        let pipeline = pipeline.with_mode(OverlayMode::Layer);

        pipeline.on_frame(gray_frame(1));
        let overlay = receiver.recv_latest().unwrap();
        assert_eq!(overlay.image.dimensions(), (32, 24));
        assert_eq!(overlay.image.get_pixel(16, 12).0, [0, 0, 0, 0]);
    }

    #[test]
    fn panicking_worker_still_closes_the_display() {
        let (pipeline, mut receiver) = pipeline_with(StubBackend::centered("cup", 0.9));
        let pipeline = Arc::new(pipeline);

        let worker = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                let _shutdown = pipeline.shutdown_on_drop();
                pipeline.on_frame(gray_frame(1));
                panic!("source failed mid-stream");
            })
        };
        assert!(worker.join().is_err());

        // The pipeline is still alive here, but its display handle is gone.
        assert_eq!(receiver.recv_latest().unwrap().sequence, 1);
        assert!(receiver.recv_latest().is_none());
        assert_eq!(pipeline.stats().frames_rendered, 1);
    }

    #[test]
    fn shutdown_closes_the_display() {
        let (pipeline, mut receiver) = pipeline_with(StubBackend::new());
        pipeline.shutdown();
        assert_eq!(
            pipeline.on_frame(gray_frame(1)),
            FrameOutcome::Skipped(SkipReason::DisplayClosed)
        );
        assert!(receiver.recv_latest().is_none());
    }
}
