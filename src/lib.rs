//! Guide Kernel
//!
//! Turns a stream of camera frames into spatial audio and haptic alerts for
//! users who are blind, deaf or deafblind.
//!
//! # Architecture
//!
//! Each analysed frame flows through four stages:
//!
//! 1. **Detect**: vision backends run a bounding-box pass and a free-form
//!    label pass (or a text pass in text mode).
//! 2. **Fuse**: the passes are joined into at most one `DetectionResult`
//!    with a label, a direction, a distance band and a hazard flag.
//! 3. **Dispatch**: a cooldown state machine decides which of speech,
//!    direction haptic and hazard haptic fire for that result.
//! 4. **Render**: the session plays the resulting actions on the speaker,
//!    the vibrator and the display.
//!
//! # Module Structure
//!
//! - `detect`: vision backend trait, registry and result types
//! - `position`, `hazard`: pure classifiers used by fusion
//! - `fusion`: per-frame join of the vision passes
//! - `dispatch`: alert cooldown state machine
//! - `haptics`: vibration vocabulary
//! - `session`: lifecycle, output capabilities and frame drivers
//! - `command`, `emergency`: voice commands and SOS message text

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod command;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod emergency;
pub mod frame;
pub mod fusion;
pub mod haptics;
pub mod hazard;
pub mod position;
pub mod session;

pub use command::{parse_command, Command};
pub use config::{GuideConfig, VisionSettings};
pub use detect::{
    BackendRegistry, BoundingBox, BoxResult, LabelResult, StubBackend, TextResult, VisionBackend,
    VisionCapability,
};
pub use dispatch::{Action, AlertDispatcher, CooldownSettings, DispatcherState};
pub use frame::{Frame, FrameDims};
pub use fusion::{DetectionResult, FrameOutcome, ResultFuser, UiUpdate};
pub use haptics::{HapticEncoder, HapticEvent, Waveform};
pub use hazard::HazardClassifier;
pub use position::{Direction, DistanceBand, Position, PositionResolver, PositionThresholds};
pub use session::{Display, FrameTicket, Haptics, Outputs, Session, Speaker};

// -------------------- Detection mode --------------------

/// What the camera is currently looking for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Objects with position and distance.
    #[default]
    Object,
    /// Printed text, read aloud.
    Text,
}

impl std::str::FromStr for DetectionMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "object" => Ok(Self::Object),
            "text" => Ok(Self::Text),
            other => Err(anyhow!("unknown detection mode: {}", other)),
        }
    }
}

// -------------------- Clock --------------------

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("system clock before unix epoch: {}", e))?;
    Ok(elapsed.as_millis() as u64)
}
