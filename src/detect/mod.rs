mod backend;
mod backends;
mod decode;
pub mod labels;
mod registry;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::stub::StubDetection;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use decode::decode_image;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{best_detection, BoundingBox, DetectionResult};
