mod backend;
mod backends;
mod registry;
pub mod result;
pub mod ssd;

pub use backend::{
    DetectionCapability, DetectorBackend, DetectorOptions, DEFAULT_MAX_RESULTS,
    DEFAULT_SCORE_THRESHOLD,
};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{
    confidence_percent, log_detections, map_detections, BoundingBox, Category, Detection,
    DetectionResult,
};
