//! Alert dispatch state machine.
//!
//! Every analysed frame yields at most one `DetectionResult`. The dispatcher
//! turns that stream into a sparse stream of user-facing actions using three
//! independent gates:
//!
//! 1. Speech: new spoken text and the mode's speech cooldown elapsed.
//! 2. Direction haptic: side changed, object changed, or direction cooldown
//!    elapsed.
//! 3. Hazard haptic: hazard label and hazard interval elapsed. When a
//!    direction pattern is still playing, the hazard burst is delayed until it
//!    has finished.
//!
//! All timers are checked lazily against the `now_ms` passed in; nothing is
//! scheduled here except the hazard delay carried on the action itself.
//! Timers advance when an action is emitted, whether or not the host can
//! render it.

use serde::Serialize;

use crate::fusion::DetectionResult;
use crate::haptics::HapticEncoder;
use crate::position::{Direction, DistanceBand};
use crate::DetectionMode;

pub const DEFAULT_OBJECT_SPEECH_COOLDOWN_MS: u64 = 2_500;
pub const DEFAULT_TEXT_SPEECH_COOLDOWN_MS: u64 = 4_000;
pub const DEFAULT_DIRECTION_COOLDOWN_MS: u64 = 2_500;
pub const DEFAULT_HAZARD_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_HAZARD_STAGGER_MS: u64 = 900;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownSettings {
    pub object_speech_ms: u64,
    pub text_speech_ms: u64,
    pub direction_ms: u64,
    pub hazard_ms: u64,
    /// Minimum delay between a direction pattern and a hazard burst fired by
    /// the same frame.
    pub hazard_stagger_ms: u64,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            object_speech_ms: DEFAULT_OBJECT_SPEECH_COOLDOWN_MS,
            text_speech_ms: DEFAULT_TEXT_SPEECH_COOLDOWN_MS,
            direction_ms: DEFAULT_DIRECTION_COOLDOWN_MS,
            hazard_ms: DEFAULT_HAZARD_INTERVAL_MS,
            hazard_stagger_ms: DEFAULT_HAZARD_STAGGER_MS,
        }
    }
}

impl CooldownSettings {
    pub fn speech_cooldown_ms(&self, mode: DetectionMode) -> u64 {
        match mode {
            DetectionMode::Object => self.object_speech_ms,
            DetectionMode::Text => self.text_speech_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Speak {
        text: String,
    },
    Vibrate {
        direction: Direction,
        distance: Option<DistanceBand>,
    },
    /// Hazard burst, to start `delay_ms` after the dispatch that produced it.
    VibrateHazard {
        delay_ms: u64,
    },
}

/// Everything the dispatcher remembers between frames of one session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatcherState {
    pub last_spoken_text: String,
    pub last_speak_ms: Option<u64>,
    pub last_direction: Option<Direction>,
    pub last_object_label: String,
    pub last_direction_haptic_ms: Option<u64>,
    /// End of the direction pattern most recently started.
    pub direction_haptic_until_ms: Option<u64>,
    pub last_hazard_haptic_ms: Option<u64>,
}

fn elapsed_over(last: Option<u64>, now_ms: u64, cooldown_ms: u64) -> bool {
    match last {
        Some(last) => now_ms.saturating_sub(last) > cooldown_ms,
        None => true,
    }
}

impl DispatcherState {
    /// Pure transition: `(state, result, now)` to `(state', actions)`.
    ///
    /// A frame without a result leaves the state untouched and emits nothing.
    pub fn transition(
        &self,
        result: Option<&DetectionResult>,
        now_ms: u64,
        settings: &CooldownSettings,
    ) -> (DispatcherState, Vec<Action>) {
        let mut next = self.clone();
        let mut actions = Vec::new();
        let Some(result) = result else {
            return (next, actions);
        };

        let spoken = result.spoken_text();
        let speech_cooldown = settings.speech_cooldown_ms(result.mode());
        if !spoken.is_empty()
            && spoken != self.last_spoken_text
            && elapsed_over(self.last_speak_ms, now_ms, speech_cooldown)
        {
            next.last_spoken_text = spoken.to_string();
            next.last_speak_ms = Some(now_ms);
            actions.push(Action::Speak {
                text: spoken.to_string(),
            });
        }

        if result.mode() == DetectionMode::Text {
            return (next, actions);
        }

        let direction_changed = self.last_direction != Some(result.direction());
        let new_object = !result
            .label()
            .eq_ignore_ascii_case(&self.last_object_label);
        let mut direction_fired = false;
        if direction_changed
            || new_object
            || elapsed_over(self.last_direction_haptic_ms, now_ms, settings.direction_ms)
        {
            let pattern = HapticEncoder::new().direction(result.direction(), result.distance());
            next.last_direction = Some(result.direction());
            next.last_object_label = result.label().to_string();
            next.last_direction_haptic_ms = Some(now_ms);
            next.direction_haptic_until_ms = Some(now_ms + pattern.total_ms());
            direction_fired = true;
            actions.push(Action::Vibrate {
                direction: result.direction(),
                distance: result.distance(),
            });
        }

        if result.is_hazard() && elapsed_over(self.last_hazard_haptic_ms, now_ms, settings.hazard_ms)
        {
            let busy_ms = next
                .direction_haptic_until_ms
                .map_or(0, |until| until.saturating_sub(now_ms));
            let delay_ms = if direction_fired {
                busy_ms.max(settings.hazard_stagger_ms)
            } else {
                busy_ms
            };
            next.last_hazard_haptic_ms = Some(now_ms);
            actions.push(Action::VibrateHazard { delay_ms });
        }

        (next, actions)
    }
}

/// Owner of one session's dispatcher state.
#[derive(Debug, Default)]
pub struct AlertDispatcher {
    state: DispatcherState,
    settings: CooldownSettings,
}

impl AlertDispatcher {
    pub fn new(settings: CooldownSettings) -> Self {
        Self {
            state: DispatcherState::default(),
            settings,
        }
    }

    pub fn state(&self) -> &DispatcherState {
        &self.state
    }

    pub fn settings(&self) -> &CooldownSettings {
        &self.settings
    }

    pub fn dispatch(&mut self, result: Option<&DetectionResult>, now_ms: u64) -> Vec<Action> {
        let (next, actions) = self.state.transition(result, now_ms, &self.settings);
        if !actions.is_empty() {
            log::debug!("dispatch at {}ms: {:?}", now_ms, actions);
        }
        self.state = next;
        actions
    }

    /// Forget everything; used when a session ends.
    pub fn reset(&mut self) {
        self.state = DispatcherState::default();
    }
}
