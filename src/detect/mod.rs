mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{VisionBackend, VisionCapability};
pub use backends::StubBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{BoundingBox, BoxResult, LabelResult, TextResult};
