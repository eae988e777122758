//! Haptic vocabulary.
//!
//! Direction codes are counted pulses: right = 1, left = 2, back = 3,
//! front = 4. Each pulse is long enough to count by touch. Other events are
//! told apart by rhythm and speed rather than by pulse count, so no event
//! reuses a direction's count at the direction pulse timing.

use serde::Serialize;

use crate::position::{Direction, DistanceBand};

pub const PULSE_ON_MS: u64 = 110;
pub const PULSE_OFF_MS: u64 = 160;
/// Lower bounds for a pulse to be countable by touch.
pub const MIN_COUNTABLE_ON_MS: u64 = 90;
pub const MIN_COUNTABLE_OFF_MS: u64 = 60;

pub const HAZARD_ON_MS: u64 = 80;
pub const HAZARD_OFF_MS: u64 = 60;
pub const HAZARD_PULSES: usize = 5;

pub const DEFAULT_AMPLITUDE: u8 = 170;
pub const MAX_AMPLITUDE: u8 = 255;
pub const LOW_AMPLITUDE: u8 = 60;

/// Symbolic haptic events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticEvent {
    /// Direction code, scaled by distance when known.
    Direction {
        direction: Direction,
        distance: Option<DistanceBand>,
    },
    Hazard,
    SessionOpen,
    Error,
    SosConfirm,
    Arrived,
    NavStart,
    Tap,
}

/// Vibration waveform: alternating on/off durations in milliseconds,
/// starting with "on".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Waveform {
    pub timings_ms: Vec<u64>,
    pub amplitude: u8,
}

impl Waveform {
    fn new(timings_ms: Vec<u64>, amplitude: u8) -> Self {
        Self {
            timings_ms,
            amplitude,
        }
    }

    /// Evenly spaced pulses, each followed by an off gap.
    fn pulses(count: usize, on_ms: u64, off_ms: u64, amplitude: u8) -> Self {
        let timings_ms = (0..count).flat_map(|_| [on_ms, off_ms]).collect();
        Self::new(timings_ms, amplitude)
    }

    pub fn pulse_count(&self) -> usize {
        self.on_segments().filter(|&on| on > 0).count()
    }

    pub fn on_segments(&self) -> impl Iterator<Item = u64> + '_ {
        self.timings_ms.iter().step_by(2).copied()
    }

    pub fn off_segments(&self) -> impl Iterator<Item = u64> + '_ {
        self.timings_ms.iter().skip(1).step_by(2).copied()
    }

    /// Time until the channel is free again, including a trailing gap.
    pub fn total_ms(&self) -> u64 {
        self.timings_ms.iter().sum()
    }
}

/// Stateless mapping from events to waveforms.
#[derive(Clone, Copy, Debug, Default)]
pub struct HapticEncoder;

impl HapticEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn direction_pulses(direction: Direction) -> usize {
        match direction {
            Direction::Right => 1,
            Direction::Left => 2,
            Direction::Back => 3,
            Direction::Front => 4,
        }
    }

    pub fn distance_amplitude(distance: Option<DistanceBand>) -> u8 {
        match distance {
            Some(DistanceBand::VeryClose) => MAX_AMPLITUDE,
            Some(DistanceBand::Nearby) => DEFAULT_AMPLITUDE,
            Some(DistanceBand::FewMeters) => 120,
            Some(DistanceBand::Far) => 80,
            None => DEFAULT_AMPLITUDE,
        }
    }

    pub fn direction(&self, direction: Direction, distance: Option<DistanceBand>) -> Waveform {
        self.encode(HapticEvent::Direction {
            direction,
            distance,
        })
    }

    pub fn encode(&self, event: HapticEvent) -> Waveform {
        match event {
            HapticEvent::Direction {
                direction,
                distance,
            } => Waveform::pulses(
                Self::direction_pulses(direction),
                PULSE_ON_MS,
                PULSE_OFF_MS,
                Self::distance_amplitude(distance),
            ),
            HapticEvent::Hazard => {
                let mut wave =
                    Waveform::pulses(HAZARD_PULSES, HAZARD_ON_MS, HAZARD_OFF_MS, MAX_AMPLITUDE);
                wave.timings_ms.pop();
                wave
            }
            HapticEvent::SessionOpen => Waveform::new(vec![60, 80, 60], DEFAULT_AMPLITUDE),
            HapticEvent::Error => Waveform::new(vec![300, 200, 300], LOW_AMPLITUDE),
            HapticEvent::SosConfirm => {
                let (dot, dash, gap, letter_gap) = (100, 300, 120, 250);
                let letter = |mark: u64, trailing: u64| vec![mark, gap, mark, gap, mark, trailing];
                let mut timings = letter(dot, letter_gap);
                timings.extend(letter(dash, letter_gap));
                timings.extend(letter(dot, 0));
                timings.pop();
                Waveform::new(timings, MAX_AMPLITUDE)
            }
            HapticEvent::Arrived => Waveform::new(vec![200, 80, 80, 80, 200], DEFAULT_AMPLITUDE),
            HapticEvent::NavStart => Waveform::new(vec![80, 100, 120, 100, 180], DEFAULT_AMPLITUDE),
            HapticEvent::Tap => Waveform::new(vec![40], DEFAULT_AMPLITUDE),
        }
    }
}
