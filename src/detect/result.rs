use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixels, described by its horizontal center and size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center_x: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// One box from the bounding-box pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxResult {
    pub bounding_box: BoundingBox,
    /// Coarse category, if the detector classified the box.
    #[serde(default)]
    pub coarse_label: Option<String>,
    /// Confidence of `coarse_label` (0..1).
    #[serde(default)]
    pub coarse_confidence: Option<f32>,
}

impl BoxResult {
    pub fn unlabeled(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            coarse_label: None,
            coarse_confidence: None,
        }
    }

    pub fn labeled(bounding_box: BoundingBox, label: &str, confidence: f32) -> Self {
        Self {
            bounding_box,
            coarse_label: Some(label.to_string()),
            coarse_confidence: Some(confidence),
        }
    }
}

/// One entry from the free-form label pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub text: String,
    /// Confidence (0..1).
    pub confidence: f32,
}

impl LabelResult {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

/// Output of the text-recognition pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextResult {
    pub text: String,
}
