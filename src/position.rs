//! Coarse spatial position of a detection.
//!
//! The resolver turns a bounding box into a side (left/front/right) and a
//! distance band using fixed fractions of the frame. The fractions are tuned
//! for a phone held roughly 0.9 to 1.5 m from the body, so they live in
//! `PositionThresholds` rather than inline.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::BoundingBox;
use crate::frame::FrameDims;

pub const DEFAULT_LEFT_RATIO: f32 = 0.30;
pub const DEFAULT_RIGHT_RATIO: f32 = 0.70;
pub const DEFAULT_VERY_CLOSE_AREA: f32 = 0.30;
pub const DEFAULT_NEARBY_AREA: f32 = 0.10;
pub const DEFAULT_FEW_METERS_AREA: f32 = 0.03;

/// Direction of an object relative to the user.
///
/// `Back` is never produced from camera geometry; it only enters through the
/// "behind you" path of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Front,
    Back,
}

impl Direction {
    /// Phrase appended to spoken announcements.
    pub fn phrase(self) -> &'static str {
        match self {
            Direction::Left => "on your left",
            Direction::Right => "on your right",
            Direction::Front => "straight ahead",
            Direction::Back => "behind you",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    VeryClose,
    Nearby,
    FewMeters,
    Far,
}

impl DistanceBand {
    pub fn phrase(self) -> &'static str {
        match self {
            DistanceBand::VeryClose => "very close",
            DistanceBand::Nearby => "nearby",
            DistanceBand::FewMeters => "a few meters away",
            DistanceBand::Far => "far away",
        }
    }
}

/// Frame-relative thresholds for side and distance classification.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionThresholds {
    /// Center-x ratio below which an object is on the left.
    pub left_ratio: f32,
    /// Center-x ratio above which an object is on the right.
    pub right_ratio: f32,
    pub very_close_area: f32,
    pub nearby_area: f32,
    pub few_meters_area: f32,
}

impl Default for PositionThresholds {
    fn default() -> Self {
        Self {
            left_ratio: DEFAULT_LEFT_RATIO,
            right_ratio: DEFAULT_RIGHT_RATIO,
            very_close_area: DEFAULT_VERY_CLOSE_AREA,
            nearby_area: DEFAULT_NEARBY_AREA,
            few_meters_area: DEFAULT_FEW_METERS_AREA,
        }
    }
}

impl PositionThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("left_ratio", self.left_ratio),
            ("right_ratio", self.right_ratio),
            ("very_close_area", self.very_close_area),
            ("nearby_area", self.nearby_area),
            ("few_meters_area", self.few_meters_area),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(anyhow!("position threshold {} must be in (0, 1), got {}", name, value));
            }
        }
        if self.left_ratio >= self.right_ratio {
            return Err(anyhow!(
                "left_ratio ({}) must be below right_ratio ({})",
                self.left_ratio,
                self.right_ratio
            ));
        }
        if !(self.very_close_area > self.nearby_area && self.nearby_area > self.few_meters_area) {
            return Err(anyhow!(
                "distance thresholds must be strictly descending (very_close > nearby > few_meters)"
            ));
        }
        Ok(())
    }
}

/// Resolved position of the primary box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub direction: Direction,
    pub distance: DistanceBand,
}

impl Position {
    /// "on your right, very close"
    pub fn phrase(&self) -> String {
        format!("{}, {}", self.direction.phrase(), self.distance.phrase())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PositionResolver {
    thresholds: PositionThresholds,
}

impl PositionResolver {
    pub fn new(thresholds: PositionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PositionThresholds {
        &self.thresholds
    }

    pub fn resolve(&self, bbox: &BoundingBox, frame: FrameDims) -> Position {
        Position {
            direction: self.side(bbox, frame),
            distance: self.distance(bbox, frame),
        }
    }

    pub fn side(&self, bbox: &BoundingBox, frame: FrameDims) -> Direction {
        let cx_ratio = bbox.center_x / frame.width() as f32;
        if cx_ratio < self.thresholds.left_ratio {
            Direction::Left
        } else if cx_ratio > self.thresholds.right_ratio {
            Direction::Right
        } else {
            Direction::Front
        }
    }

    pub fn distance(&self, bbox: &BoundingBox, frame: FrameDims) -> DistanceBand {
        let area_ratio = bbox.area() / frame.area() as f32;
        if area_ratio > self.thresholds.very_close_area {
            DistanceBand::VeryClose
        } else if area_ratio > self.thresholds.nearby_area {
            DistanceBand::Nearby
        } else if area_ratio > self.thresholds.few_meters_area {
            DistanceBand::FewMeters
        } else {
            DistanceBand::Far
        }
    }
}
