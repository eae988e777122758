use anyhow::{anyhow, Result};

use crate::detect::result::{BoxResult, LabelResult, TextResult};
use crate::frame::Frame;

/// Vision passes a backend may provide.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisionCapability {
    /// Bounding boxes with an optional coarse category.
    ObjectDetection,
    /// Free-form scene/object labels with confidences.
    ImageLabeling,
    TextRecognition,
}

/// Vision service backend.
///
/// The kernel treats the models behind this trait as opaque. Implementations
/// receive the frame read-only and must not keep pixels after returning.
/// A pass the backend does not support returns an error; callers select a
/// backend through `supports` first.
pub trait VisionBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: VisionCapability) -> bool;

    fn detect_boxes(&mut self, frame: &Frame) -> Result<Vec<BoxResult>> {
        let _ = frame;
        Err(unsupported(self.name(), VisionCapability::ObjectDetection))
    }

    fn label(&mut self, frame: &Frame) -> Result<Vec<LabelResult>> {
        let _ = frame;
        Err(unsupported(self.name(), VisionCapability::ImageLabeling))
    }

    fn recognize_text(&mut self, frame: &Frame) -> Result<TextResult> {
        let _ = frame;
        Err(unsupported(self.name(), VisionCapability::TextRecognition))
    }
}

fn unsupported(name: &str, capability: VisionCapability) -> anyhow::Error {
    anyhow!("backend '{}' does not support {:?}", name, capability)
}
