//! Live object-detection overlay.
//!
//! Frames from a camera-like source are decoded, run through an object
//! detector that is loaded once, mapped to "label, NN%" display records and
//! drawn as labelled boxes over the frame. The rendered overlay is handed to
//! the display thread through a single queue.
//!
//! # Module Structure
//!
//! - `frame`: frames as delivered by a source, and the frame decoder
//! - `ingest`: frame sources (synthetic `stub://`, still-image directories)
//!   and the worker loop feeding the pipeline
//! - `detect`: detection types, the result mapper, detector backends
//! - `overlay`: box and label rendering
//! - `display`: hand-off of overlays to the display thread
//! - `pipeline`: the per-frame orchestrator
//! - `config`: daemon configuration (file + env)
//! - `ui`: terminal stage and progress reporting for `overlayd`

pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod ui;

pub use detect::{
    map_detections, BackendRegistry, BoundingBox, Category, Detection, DetectionCapability,
    DetectionResult, DetectorBackend, DetectorOptions, SharedBackend, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use display::{display_queue, DisplayHandle, DisplayReceiver, DisplaySink, RenderedOverlay};
pub use frame::{decode_frame, Frame, FramePayload, Plane, JPEG_QUALITY};
pub use ingest::{open_source, run_source, FrameSource};
pub use overlay::{layout_label, LabelLayout, OverlayRenderer, OverlayStyle};
pub use pipeline::{
    FrameOutcome, OverlayMode, Pipeline, PipelineState, PipelineStats, ShutdownGuard, SkipReason,
};
