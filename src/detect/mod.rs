mod backend;
mod backends;
mod filter;
mod registry;
mod result;

pub use backend::Detector;
pub use backends::{ScriptedBackend, SyntheticBackend};
pub use filter::{CategoryFilter, DEFAULT_CATEGORIES, DEFAULT_MIN_CONFIDENCE};
pub use registry::{DetectorRegistry, DetectorSettings, DEFAULT_BACKEND};
pub use result::{BoundingBox, Detection, DetectionResult};
