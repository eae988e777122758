//! Per-frame fusion of the vision passes.
//!
//! Object mode runs two passes per frame: a bounding-box pass (position plus a
//! coarse category from a small vocabulary) and a free-form label pass (fine
//! grained names with confidences). Their completions may arrive in either
//! order. `PendingFrame` holds whatever has arrived for one frame and is moved
//! into each completion; once enough is known it yields a `Join::Ready` that
//! `ResultFuser::fuse` turns into exactly one `FrameOutcome`.
//!
//! Fusion policy:
//! 1. The first box is the primary object. A usable coarse label on it (not
//!    blank, not a placeholder, above the box confidence floor) names the
//!    object and the label pass is not needed.
//! 2. Otherwise the highest-confidence free-form label names it (stable on
//!    ties). With no labels the name is "Object" at 0%.
//! 3. Direction and distance come from the primary box. Without a box the
//!    direction is Front and the distance is unknown.
//! 4. Secondary boxes and labels only feed the display.

use std::cmp::Ordering;

use anyhow::Result;
use serde::Serialize;

use crate::detect::{BoxResult, LabelResult, TextResult};
use crate::frame::FrameDims;
use crate::hazard::HazardClassifier;
use crate::position::{Direction, DistanceBand, PositionResolver};
use crate::DetectionMode;

/// Coarse labels the box detector emits when it cannot classify an object.
pub const PLACEHOLDER_LABELS: &[&str] = &["Unknown", "Physical object"];
/// Name used when no pass produced a usable label.
pub const FALLBACK_LABEL: &str = "Object";
/// Maximum characters of recognised text shown on screen.
pub const TEXT_DISPLAY_LIMIT: usize = 100;
const MAX_SECONDARY_LABELS: usize = 4;

// -------------------- Fused result --------------------

/// One fused detection per analysed frame. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetectionResult {
    mode: DetectionMode,
    label: String,
    confidence: u8,
    direction: Direction,
    distance: Option<DistanceBand>,
    is_hazard: bool,
    spoken_text: String,
}

impl DetectionResult {
    /// Object-mode result. A blank or placeholder label becomes "Object"; the
    /// spoken text is `"{label}, {direction}[, {distance}]"`.
    pub fn object(
        label: &str,
        confidence: u8,
        direction: Direction,
        distance: Option<DistanceBand>,
        is_hazard: bool,
    ) -> Self {
        let label = match label.trim() {
            trimmed if trimmed.is_empty() || is_placeholder(trimmed) => {
                FALLBACK_LABEL.to_string()
            }
            trimmed => trimmed.to_string(),
        };
        let spoken_text = match distance {
            Some(band) => format!("{}, {}, {}", label, direction.phrase(), band.phrase()),
            None => format!("{}, {}", label, direction.phrase()),
        };
        Self {
            mode: DetectionMode::Object,
            label,
            confidence: confidence.min(100),
            direction,
            distance,
            is_hazard,
            spoken_text,
        }
    }

    /// Text-mode result: the recognised text is the spoken payload and the
    /// spatial fields are not applicable.
    pub fn text(text: &str) -> Self {
        Self {
            mode: DetectionMode::Text,
            label: text.to_string(),
            confidence: 100,
            direction: Direction::Front,
            distance: None,
            is_hazard: false,
            spoken_text: text.to_string(),
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Integer percent, 0..=100.
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn distance(&self) -> Option<DistanceBand> {
        self.distance
    }

    pub fn is_hazard(&self) -> bool {
        self.is_hazard
    }

    pub fn spoken_text(&self) -> &str {
        &self.spoken_text
    }

    /// "on your right, very close", or just the side when distance is unknown.
    pub fn position_phrase(&self) -> String {
        match self.distance {
            Some(band) => format!("{}, {}", self.direction.phrase(), band.phrase()),
            None => self.direction.phrase().to_string(),
        }
    }
}

/// Data for the on-screen result panel. The kernel never renders it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UiUpdate {
    pub display_label: String,
    pub position_phrase: String,
    pub confidence_text: String,
    /// Up to four secondary labels, e.g. "table 61%  •  floor 55%".
    pub secondary: String,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FusedFrame {
    pub result: DetectionResult,
    pub ui: UiUpdate,
}

/// Result of analysing one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Detected(FusedFrame),
    /// Nothing to announce. Dispatch is a no-op; the display still updates.
    Empty(UiUpdate),
    /// Every pass failed. The frame is dropped.
    Failed,
}

// -------------------- Per-frame join --------------------

/// Inputs of a completed object-mode join. `None` means the pass failed or
/// was never needed.
#[derive(Debug)]
pub struct ObjectPasses {
    pub dims: FrameDims,
    pub boxes: Option<Vec<BoxResult>>,
    pub labels: Option<Vec<LabelResult>>,
}

pub enum Join {
    Waiting(PendingFrame),
    Ready(ObjectPasses),
}

/// Partial results for one object-mode frame.
pub struct PendingFrame {
    dims: FrameDims,
    box_min_confidence: f32,
    boxes: Option<Result<Vec<BoxResult>>>,
    labels: Option<Result<Vec<LabelResult>>>,
}

impl PendingFrame {
    /// True until the box pass has delivered a primary box with a usable label.
    pub fn needs_labels(&self) -> bool {
        match &self.boxes {
            Some(Ok(boxes)) => !boxes
                .first()
                .is_some_and(|primary| usable_coarse_label(primary, self.box_min_confidence).is_some()),
            _ => true,
        }
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    pub fn with_boxes(mut self, boxes: Result<Vec<BoxResult>>) -> Join {
        self.boxes = Some(boxes);
        self.try_join()
    }

    pub fn with_labels(mut self, labels: Result<Vec<LabelResult>>) -> Join {
        self.labels = Some(labels);
        self.try_join()
    }

    fn try_join(self) -> Join {
        if self.boxes.is_none() {
            return Join::Waiting(self);
        }
        if self.needs_labels() && self.labels.is_none() {
            return Join::Waiting(self);
        }
        let boxes = self.boxes.and_then(log_pass_failure("box"));
        let labels = self.labels.and_then(log_pass_failure("label"));
        Join::Ready(ObjectPasses {
            dims: self.dims,
            boxes,
            labels,
        })
    }
}

fn log_pass_failure<T>(pass: &'static str) -> impl FnOnce(Result<T>) -> Option<T> {
    move |res| match res {
        Ok(value) => Some(value),
        Err(err) => {
            log::debug!("{} pass failed: {:#}", pass, err);
            None
        }
    }
}

fn usable_coarse_label(primary: &BoxResult, min_confidence: f32) -> Option<&str> {
    let label = primary.coarse_label.as_deref()?.trim();
    if label.is_empty() || is_placeholder(label) {
        return None;
    }
    let confidence = primary.coarse_confidence.unwrap_or(0.0);
    if confidence < min_confidence {
        return None;
    }
    Some(label)
}

fn is_placeholder(label: &str) -> bool {
    PLACEHOLDER_LABELS
        .iter()
        .any(|placeholder| placeholder.eq_ignore_ascii_case(label))
}

fn percent(confidence: f32) -> u8 {
    if !confidence.is_finite() {
        return 0;
    }
    (confidence * 100.0).round().clamp(0.0, 100.0) as u8
}

// -------------------- Fuser --------------------

#[derive(Clone, Debug)]
pub struct ResultFuser {
    resolver: PositionResolver,
    hazards: HazardClassifier,
    label_min_confidence: f32,
    box_min_confidence: f32,
}

impl ResultFuser {
    pub fn new(
        resolver: PositionResolver,
        hazards: HazardClassifier,
        label_min_confidence: f32,
        box_min_confidence: f32,
    ) -> Self {
        Self {
            resolver,
            hazards,
            label_min_confidence,
            box_min_confidence,
        }
    }

    pub fn hazards(&self) -> &HazardClassifier {
        &self.hazards
    }

    /// Start the join for one object-mode frame.
    pub fn begin(&self, dims: FrameDims) -> PendingFrame {
        PendingFrame {
            dims,
            box_min_confidence: self.box_min_confidence,
            boxes: None,
            labels: None,
        }
    }

    pub fn fuse(&self, passes: ObjectPasses) -> FrameOutcome {
        let ObjectPasses { dims, boxes, labels } = passes;
        if boxes.is_none() && labels.is_none() {
            return FrameOutcome::Failed;
        }
        let boxes = boxes.unwrap_or_default();
        let ranked = self.rank_labels(labels.unwrap_or_default());
        let primary = boxes.first();

        let coarse = primary.and_then(|b| {
            usable_coarse_label(b, self.box_min_confidence)
                .map(|label| (label.to_string(), percent(b.coarse_confidence.unwrap_or(0.0))))
        });
        let (label, confidence) = match coarse {
            Some(named) => named,
            None => match ranked.first() {
                Some(best) => (best.text.clone(), percent(best.confidence)),
                None if primary.is_some() => (FALLBACK_LABEL.to_string(), 0),
                None => {
                    return FrameOutcome::Empty(UiUpdate {
                        display_label: "Scanning...".to_string(),
                        position_phrase: "Move camera slowly".to_string(),
                        confidence_text: String::new(),
                        secondary: String::new(),
                        status: "Looking...".to_string(),
                    });
                }
            },
        };

        let (direction, distance) = match primary {
            Some(b) => {
                let pos = self.resolver.resolve(&b.bounding_box, dims);
                (pos.direction, Some(pos.distance))
            }
            None => (Direction::Front, None),
        };

        let is_hazard = self.hazards.is_hazard(&label);
        let result = DetectionResult::object(&label, confidence, direction, distance, is_hazard);
        let ui = UiUpdate {
            display_label: result.label().to_string(),
            position_phrase: result.position_phrase(),
            confidence_text: format!("{}% confidence", result.confidence()),
            secondary: secondary_line(&ranked, result.label()),
            status: identified_status(boxes.len().max(ranked.len())),
        };
        log::debug!(
            "fused frame: label={} conf={} dir={:?} dist={:?} hazard={}",
            result.label(),
            result.confidence(),
            result.direction(),
            result.distance(),
            result.is_hazard()
        );
        FrameOutcome::Detected(FusedFrame { result, ui })
    }

    /// Text mode bypasses fusion and hazard checks.
    pub fn fuse_text(&self, text: Result<TextResult>) -> FrameOutcome {
        let text = match text {
            Ok(text) => text.text,
            Err(err) => {
                log::debug!("text pass failed: {:#}", err);
                return FrameOutcome::Failed;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            return FrameOutcome::Empty(UiUpdate {
                display_label: "No text found".to_string(),
                position_phrase: "Point at a sign or label".to_string(),
                ..UiUpdate::default()
            });
        }
        let display = match text.char_indices().nth(TEXT_DISPLAY_LIMIT) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        };
        FrameOutcome::Detected(FusedFrame {
            result: DetectionResult::text(text),
            ui: UiUpdate {
                display_label: display,
                position_phrase: "Text detected".to_string(),
                confidence_text: "OCR".to_string(),
                secondary: String::new(),
                status: "Reading text".to_string(),
            },
        })
    }

    /// Drop placeholders and labels under the confidence floor, then sort best
    /// first. The sort is stable so equal confidences keep classifier order.
    fn rank_labels(&self, mut labels: Vec<LabelResult>) -> Vec<LabelResult> {
        labels.retain(|l| l.confidence.is_finite() && l.confidence >= self.label_min_confidence);
        labels.retain(|l| !l.text.trim().is_empty() && !is_placeholder(l.text.trim()));
        labels.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        labels
    }
}

fn secondary_line(ranked: &[LabelResult], primary: &str) -> String {
    ranked
        .iter()
        .filter(|l| l.text != primary)
        .take(MAX_SECONDARY_LABELS)
        .map(|l| format!("{} {}%", l.text, percent(l.confidence)))
        .collect::<Vec<_>>()
        .join("  •  ")
}

fn identified_status(count: usize) -> String {
    match count {
        0 | 1 => "1 object identified".to_string(),
        n => format!("{} objects identified", n),
    }
}
