//! Camera session lifecycle.
//!
//! A `Session` owns everything that lives for one active camera session: the
//! fuser, the dispatcher state, the output capabilities and the deferred
//! hazard burst. It enforces:
//!
//! - At most one frame in flight. A frame offered while another is being
//!   analysed is dropped, never queued.
//! - Completions carry a `FrameTicket`. A completion whose ticket does not
//!   match the frame in flight of a live session is ignored, so callbacks that
//!   arrive after `end()` are no-ops.
//! - Dispatch is serialized through one `Mutex` shared by every pipeline of
//!   the session.
//! - Output failures are logged and dropped; dispatcher timers have already
//!   advanced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::command::{parse_command, Command};
use crate::config::GuideConfig;
use crate::detect::{BackendRegistry, BoxResult, LabelResult, TextResult};
use crate::dispatch::{Action, AlertDispatcher};
use crate::frame::Frame;
use crate::fusion::{
    DetectionResult, FrameOutcome, Join, ObjectPasses, PendingFrame, ResultFuser, UiUpdate,
};
use crate::haptics::{HapticEncoder, HapticEvent, Waveform};
use crate::position::Direction;
use crate::DetectionMode;

pub const READY_PROMPT: &str = "Camera ready.";
pub const NOTHING_DETECTED: &str = "Nothing detected yet.";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// -------------------- Output capabilities --------------------

/// Text-to-speech output.
pub trait Speaker: Send {
    fn speak(&mut self, text: &str) -> Result<()>;

    /// Stop any utterance in progress.
    fn stop(&mut self) {}
}

/// Vibration output. One channel; a new waveform replaces the current one.
pub trait Haptics: Send {
    fn play(&mut self, waveform: &Waveform) -> Result<()>;

    fn cancel(&mut self) {}
}

/// Result panel.
pub trait Display: Send {
    fn show(&mut self, update: &UiUpdate);
}

pub struct Outputs {
    pub speaker: Box<dyn Speaker>,
    pub haptics: Box<dyn Haptics>,
    pub display: Box<dyn Display>,
}

/// Outputs that only write to the log. Used by the command-line tools.
pub struct LogSpeaker;
pub struct LogHaptics;
pub struct LogDisplay;

impl Speaker for LogSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::info!("speak: {}", text);
        Ok(())
    }
}

impl Haptics for LogHaptics {
    fn play(&mut self, waveform: &Waveform) -> Result<()> {
        log::info!(
            "vibrate: {} pulse(s) {:?} amplitude={}",
            waveform.pulse_count(),
            waveform.timings_ms,
            waveform.amplitude
        );
        Ok(())
    }
}

impl Display for LogDisplay {
    fn show(&mut self, update: &UiUpdate) {
        log::debug!(
            "display: {} | {} | {}",
            update.display_label,
            update.position_phrase,
            update.confidence_text
        );
    }
}

impl Outputs {
    pub fn logging() -> Self {
        Self {
            speaker: Box::new(LogSpeaker),
            haptics: Box::new(LogHaptics),
            display: Box::new(LogDisplay),
        }
    }
}

// -------------------- Session --------------------

pub type SharedDispatcher = Arc<Mutex<AlertDispatcher>>;

/// Identifies one frame of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTicket {
    session_id: u64,
    seq: u64,
}

impl FrameTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

struct DeferredHaptic {
    due_ms: u64,
    waveform: Waveform,
}

pub struct Session {
    id: u64,
    active: bool,
    mode: DetectionMode,
    speech_enabled: bool,
    fuser: ResultFuser,
    dispatcher: SharedDispatcher,
    encoder: HapticEncoder,
    outputs: Outputs,
    in_flight: Option<FrameTicket>,
    deferred: Vec<DeferredHaptic>,
    current: Option<DetectionResult>,
}

impl Session {
    /// Open a session: validates the config, plays the session-open cue and
    /// announces readiness.
    pub fn start(config: &GuideConfig, outputs: Outputs) -> Result<Self> {
        config.validate()?;
        let mut session = Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            active: true,
            mode: config.mode,
            speech_enabled: config.speech_enabled,
            fuser: config.fuser(),
            dispatcher: Arc::new(Mutex::new(AlertDispatcher::new(config.cooldowns))),
            encoder: HapticEncoder::new(),
            outputs,
            in_flight: None,
            deferred: Vec::new(),
            current: None,
        };
        log::info!("session {} started in {:?} mode", session.id, session.mode);
        session.play(HapticEvent::SessionOpen);
        session.say(READY_PROMPT);
        Ok(session)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Latest fused detection, if any.
    pub fn current(&self) -> Option<&DetectionResult> {
        self.current.as_ref()
    }

    /// Handle for pipelines that run outside this session's thread.
    pub fn dispatcher(&self) -> SharedDispatcher {
        Arc::clone(&self.dispatcher)
    }

    pub fn frame_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending_haptics(&self) -> usize {
        self.deferred.len()
    }

    pub fn set_mode(&mut self, mode: DetectionMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        log::info!("session {} switched to {:?} mode", self.id, mode);
        self.say(match mode {
            DetectionMode::Text => "Text mode.",
            DetectionMode::Object => "Object mode.",
        });
    }

    /// Claim the analysis slot for a frame. Returns `None` (frame dropped)
    /// when the session has ended or another frame is still in flight.
    pub fn begin_frame(&mut self, frame: &Frame) -> Option<FrameTicket> {
        if !self.active {
            return None;
        }
        if let Some(busy) = self.in_flight {
            log::debug!("dropping frame {} while frame {} is in flight", frame.seq, busy.seq);
            return None;
        }
        let ticket = FrameTicket {
            session_id: self.id,
            seq: frame.seq,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Claim the slot and open the two-pass join for an object-mode frame.
    pub fn begin_object_frame(&mut self, frame: &Frame) -> Option<(FrameTicket, PendingFrame)> {
        let ticket = self.begin_frame(frame)?;
        Some((ticket, self.fuser.begin(frame.dims())))
    }

    /// Release the slot without output.
    pub fn abandon_frame(&mut self, ticket: FrameTicket) {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
    }

    pub fn complete_object(
        &mut self,
        ticket: FrameTicket,
        passes: ObjectPasses,
        now_ms: u64,
    ) -> Vec<Action> {
        if !self.accepts(ticket) {
            return Vec::new();
        }
        let outcome = self.fuser.fuse(passes);
        self.finish(ticket, outcome, now_ms)
    }

    pub fn complete_text(
        &mut self,
        ticket: FrameTicket,
        text: Result<TextResult>,
        now_ms: u64,
    ) -> Vec<Action> {
        if !self.accepts(ticket) {
            return Vec::new();
        }
        let outcome = self.fuser.fuse_text(text);
        self.finish(ticket, outcome, now_ms)
    }

    fn accepts(&self, ticket: FrameTicket) -> bool {
        let live = self.active && ticket.session_id == self.id && self.in_flight == Some(ticket);
        if !live {
            log::warn!(
                "ignoring late completion for frame {} of session {}",
                ticket.seq,
                ticket.session_id
            );
        }
        live
    }

    fn finish(&mut self, ticket: FrameTicket, outcome: FrameOutcome, now_ms: u64) -> Vec<Action> {
        self.abandon_frame(ticket);
        match outcome {
            FrameOutcome::Detected(fused) => {
                self.outputs.display.show(&fused.ui);
                let actions = self.dispatch(Some(&fused.result), now_ms);
                self.current = Some(fused.result);
                actions
            }
            FrameOutcome::Empty(ui) => {
                self.outputs.display.show(&ui);
                Vec::new()
            }
            FrameOutcome::Failed => {
                log::debug!("frame {} dropped: all vision passes failed", ticket.seq);
                Vec::new()
            }
        }
    }

    fn dispatch(&mut self, result: Option<&DetectionResult>, now_ms: u64) -> Vec<Action> {
        let actions = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch(result, now_ms);
        self.render(&actions, now_ms);
        actions
    }

    fn render(&mut self, actions: &[Action], now_ms: u64) {
        for action in actions {
            match action {
                Action::Speak { text } => self.say(text),
                Action::Vibrate {
                    direction,
                    distance,
                } => {
                    let waveform = self.encoder.direction(*direction, *distance);
                    self.play_waveform(&waveform);
                }
                Action::VibrateHazard { delay_ms: 0 } => self.play(HapticEvent::Hazard),
                Action::VibrateHazard { delay_ms } => self.deferred.push(DeferredHaptic {
                    due_ms: now_ms + delay_ms,
                    waveform: self.encoder.encode(HapticEvent::Hazard),
                }),
            }
        }
    }

    /// Play deferred haptics that are due. Call regularly from the host loop.
    pub fn tick(&mut self, now_ms: u64) {
        if !self.active {
            return;
        }
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|d| d.due_ms <= now_ms);
        self.deferred = waiting;
        for deferred in due {
            self.play_waveform(&deferred.waveform);
        }
    }

    /// Report an object behind the user. Camera geometry never yields this
    /// direction; hosts call it from other cues.
    pub fn announce_behind(&mut self, label: &str, now_ms: u64) -> Vec<Action> {
        if !self.active {
            return Vec::new();
        }
        let is_hazard = self.fuser.hazards().is_hazard(label);
        let result = DetectionResult::object(label, 0, Direction::Back, None, is_hazard);
        let actions = self.dispatch(Some(&result), now_ms);
        self.current = Some(result);
        actions
    }

    /// Re-announce the current detection, bypassing cooldowns.
    pub fn repeat(&mut self) {
        match self.current.clone() {
            Some(result) => {
                self.say(result.spoken_text());
                if result.mode() == DetectionMode::Object {
                    let waveform = self.encoder.direction(result.direction(), result.distance());
                    self.play_waveform(&waveform);
                }
            }
            None => self.say(NOTHING_DETECTED),
        }
    }

    /// Signal a host-side failure (camera unavailable, etc).
    pub fn report_error(&mut self) {
        self.play(HapticEvent::Error);
    }

    /// Run a recognised voice phrase. Returns the command it matched.
    pub fn handle_command(&mut self, phrase: &str) -> Option<Command> {
        if !self.active {
            return None;
        }
        let command = parse_command(phrase)?;
        log::info!("voice command: {:?}", command);
        match command {
            Command::Close => {
                self.play(HapticEvent::Tap);
                self.end();
            }
            Command::TextMode => self.set_mode(DetectionMode::Text),
            Command::ObjectMode => self.set_mode(DetectionMode::Object),
            Command::Repeat => self.repeat(),
            Command::Hazard => self.play(HapticEvent::Hazard),
        }
        Some(command)
    }

    /// End the session. Pending haptics are cancelled, in-flight and late
    /// completions become no-ops. Idempotent.
    pub fn end(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.in_flight = None;
        self.deferred.clear();
        self.current = None;
        self.outputs.haptics.cancel();
        self.outputs.speaker.stop();
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        log::info!("session {} ended", self.id);
    }

    fn say(&mut self, text: &str) {
        if !self.speech_enabled {
            return;
        }
        if let Err(err) = self.outputs.speaker.speak(text) {
            log::warn!("speech output unavailable: {:#}", err);
        }
    }

    fn play(&mut self, event: HapticEvent) {
        let waveform = self.encoder.encode(event);
        self.play_waveform(&waveform);
    }

    fn play_waveform(&mut self, waveform: &Waveform) {
        if let Err(err) = self.outputs.haptics.play(waveform) {
            log::warn!("haptic output unavailable: {:#}", err);
        }
    }

    // -------------------- Frame drivers --------------------

    /// Analyse one frame with the registry, passes in sequence: the label
    /// pass runs only when the box pass did not name the primary object.
    pub fn process_frame(
        &mut self,
        registry: &BackendRegistry,
        frame: &Frame,
        now_ms: u64,
    ) -> Vec<Action> {
        match self.mode {
            DetectionMode::Text => {
                let Some(ticket) = self.begin_frame(frame) else {
                    return Vec::new();
                };
                let text = registry.recognize_text(frame);
                self.complete_text(ticket, text, now_ms)
            }
            DetectionMode::Object => {
                let Some((ticket, pending)) = self.begin_object_frame(frame) else {
                    return Vec::new();
                };
                let passes = match pending.with_boxes(registry.detect_boxes(frame)) {
                    Join::Ready(passes) => passes,
                    Join::Waiting(pending) => match pending.with_labels(registry.label(frame)) {
                        Join::Ready(passes) => passes,
                        Join::Waiting(_) => {
                            self.abandon_frame(ticket);
                            return Vec::new();
                        }
                    },
                };
                self.complete_object(ticket, passes, now_ms)
            }
        }
    }

    /// Analyse one object-mode frame with both passes running concurrently.
    /// Completions are joined in arrival order; whichever completes the join
    /// first wins and a later completion is discarded.
    pub fn process_frame_concurrent(
        &mut self,
        registry: &BackendRegistry,
        frame: &Frame,
        now_ms: u64,
    ) -> Vec<Action> {
        if self.mode == DetectionMode::Text {
            return self.process_frame(registry, frame, now_ms);
        }
        let Some((ticket, pending)) = self.begin_object_frame(frame) else {
            return Vec::new();
        };
        let joined = std::thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let box_tx = tx.clone();
            scope.spawn(move || {
                let _ = box_tx.send(PassCompletion::Boxes(registry.detect_boxes(frame)));
            });
            scope.spawn(move || {
                let _ = tx.send(PassCompletion::Labels(registry.label(frame)));
            });
            join_completions(pending, rx)
        });
        match joined {
            Some(passes) => self.complete_object(ticket, passes, now_ms),
            None => {
                self.abandon_frame(ticket);
                Vec::new()
            }
        }
    }
}

enum PassCompletion {
    Boxes(Result<Vec<BoxResult>>),
    Labels(Result<Vec<LabelResult>>),
}

fn join_completions(
    mut pending: PendingFrame,
    completions: mpsc::Receiver<PassCompletion>,
) -> Option<ObjectPasses> {
    for completion in completions {
        let join = match completion {
            PassCompletion::Boxes(boxes) => pending.with_boxes(boxes),
            PassCompletion::Labels(labels) => pending.with_labels(labels),
        };
        match join {
            Join::Ready(passes) => return Some(passes),
            Join::Waiting(next) => pending = next,
        }
    }
    None
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, StubBackend};
    use crate::frame::FrameDims;
    use anyhow::anyhow;

    #[derive(Clone, Default)]
    struct Record {
        spoken: Arc<Mutex<Vec<String>>>,
        pulses: Arc<Mutex<Vec<usize>>>,
        shown: Arc<Mutex<Vec<UiUpdate>>>,
    }

    struct Rec(Record);

    impl Speaker for Rec {
        fn speak(&mut self, text: &str) -> Result<()> {
            self.0.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    impl Haptics for Rec {
        fn play(&mut self, waveform: &Waveform) -> Result<()> {
            self.0.pulses.lock().unwrap().push(waveform.pulse_count());
            Ok(())
        }
    }

    impl Display for Rec {
        fn show(&mut self, update: &UiUpdate) {
            self.0.shown.lock().unwrap().push(update.clone());
        }
    }

    struct NoVibrator;

    impl Haptics for NoVibrator {
        fn play(&mut self, _waveform: &Waveform) -> Result<()> {
            Err(anyhow!("no vibrator"))
        }
    }

    fn outputs(record: &Record) -> Outputs {
        Outputs {
            speaker: Box::new(Rec(record.clone())),
            haptics: Box::new(Rec(record.clone())),
            display: Box::new(Rec(record.clone())),
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0; 16], FrameDims::new(1000, 1000).unwrap(), seq)
    }

    fn left_box() -> BoxResult {
        BoxResult::unlabeled(BoundingBox {
            center_x: 100.0,
            width: 400.0,
            height: 400.0,
        })
    }

    #[test]
    fn start_plays_open_cue_and_prompt() {
        let record = Record::default();
        let _session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        assert_eq!(*record.pulses.lock().unwrap(), vec![2]);
        assert_eq!(*record.spoken.lock().unwrap(), vec![READY_PROMPT.to_string()]);
    }

    #[test]
    fn second_frame_is_dropped_while_first_in_flight() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        let first = session.begin_frame(&frame(1)).unwrap();
        assert!(session.begin_frame(&frame(2)).is_none());
        session.abandon_frame(first);
        assert!(session.begin_frame(&frame(3)).is_some());
    }

    #[test]
    fn completion_for_abandoned_ticket_is_ignored() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        let (stale, _) = session.begin_object_frame(&frame(1)).unwrap();
        session.abandon_frame(stale);
        let (_live, pending) = session.begin_object_frame(&frame(2)).unwrap();
        let Join::Ready(passes) = pending.with_boxes(Ok(vec![BoxResult::labeled(
            left_box().bounding_box,
            "Food",
            0.8,
        )])) else {
            panic!("labelled box completes the join");
        };
        assert!(session.complete_object(stale, passes, 0).is_empty());
        assert!(session.frame_in_flight());
    }

    #[test]
    fn late_completion_after_end_is_ignored() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        let (ticket, pending) = session.begin_object_frame(&frame(1)).unwrap();
        session.end();
        let Join::Waiting(pending) = pending.with_boxes(Ok(vec![left_box()])) else {
            panic!("unlabeled box waits for labels");
        };
        let Join::Ready(passes) = pending.with_labels(Ok(vec![LabelResult::new("bench", 0.9)]))
        else {
            panic!("join should complete");
        };
        assert!(session.complete_object(ticket, passes, 0).is_empty());
        assert!(record.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn hazard_burst_is_deferred_and_cancelled_on_end() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        let mut stub = StubBackend::new();
        stub.push_boxes(vec![]).push_labels(vec![LabelResult::new("hole", 0.5)]);
        let mut registry = BackendRegistry::new();
        registry.register(stub);

        let actions = session.process_frame(&registry, &frame(1), 1_000);
        assert!(actions.iter().any(|a| matches!(a, Action::VibrateHazard { .. })));
        assert_eq!(session.pending_haptics(), 1);
        // open cue + front direction
        assert_eq!(*record.pulses.lock().unwrap(), vec![2, 4]);

        session.end();
        session.tick(10_000);
        assert_eq!(session.pending_haptics(), 0);
        assert_eq!(*record.pulses.lock().unwrap(), vec![2, 4]);
    }

    #[test]
    fn missing_vibrator_still_advances_timers() {
        let record = Record::default();
        let mut session = Session::start(
            &GuideConfig::default(),
            Outputs {
                speaker: Box::new(Rec(record.clone())),
                haptics: Box::new(NoVibrator),
                display: Box::new(Rec(record.clone())),
            },
        )
        .unwrap();
        let mut stub = StubBackend::new();
        stub.push_boxes(vec![BoxResult::labeled(left_box().bounding_box, "Food", 0.8)]);
        stub.push_boxes(vec![BoxResult::labeled(left_box().bounding_box, "Food", 0.8)]);
        let mut registry = BackendRegistry::new();
        registry.register(stub);

        let first = session.process_frame(&registry, &frame(1), 0);
        assert!(first.iter().any(|a| matches!(a, Action::Vibrate { .. })));
        let second = session.process_frame(&registry, &frame(2), 500);
        assert!(second.is_empty());
        let state = session.dispatcher().lock().unwrap().state().clone();
        assert_eq!(state.last_direction_haptic_ms, Some(0));
    }

    #[test]
    fn speech_disabled_profile_keeps_haptics() {
        let record = Record::default();
        let config = GuideConfig {
            speech_enabled: false,
            ..GuideConfig::default()
        };
        let mut session = Session::start(&config, outputs(&record)).unwrap();
        let mut stub = StubBackend::new();
        stub.push_boxes(vec![left_box()])
            .push_labels(vec![LabelResult::new("bench", 0.9)]);
        let mut registry = BackendRegistry::new();
        registry.register(stub);

        let actions = session.process_frame(&registry, &frame(1), 0);
        assert!(actions.iter().any(|a| matches!(a, Action::Speak { .. })));
        assert!(record.spoken.lock().unwrap().is_empty());
        assert_eq!(*record.pulses.lock().unwrap(), vec![2, 2]);
    }

    #[test]
    fn commands_drive_session() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        assert_eq!(session.handle_command("what is it"), Some(Command::Repeat));
        assert_eq!(
            record.spoken.lock().unwrap().last().map(String::as_str),
            Some(NOTHING_DETECTED)
        );
        assert_eq!(session.handle_command("read text"), Some(Command::TextMode));
        assert_eq!(session.mode(), DetectionMode::Text);
        assert_eq!(session.handle_command("close camera"), Some(Command::Close));
        assert!(!session.is_active());
        assert_eq!(session.handle_command("scan"), None);
    }

    #[test]
    fn behind_announcement_uses_three_pulses() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        let actions = session.announce_behind("bicycle", 0);
        assert!(actions.contains(&Action::Vibrate {
            direction: Direction::Back,
            distance: None
        }));
        assert!(actions.iter().any(|a| matches!(a, Action::VibrateHazard { .. })));
        assert_eq!(record.pulses.lock().unwrap().last(), Some(&3));
        assert_eq!(
            record.spoken.lock().unwrap().last().map(String::as_str),
            Some("bicycle, behind you")
        );
    }

    #[test]
    fn concurrent_passes_join_to_one_result() {
        let record = Record::default();
        let mut session = Session::start(&GuideConfig::default(), outputs(&record)).unwrap();
        let mut stub = StubBackend::new();
        stub.push_boxes(vec![left_box()])
            .push_labels(vec![LabelResult::new("bench", 0.9)]);
        let mut registry = BackendRegistry::new();
        registry.register(stub);

        let actions = session.process_frame_concurrent(&registry, &frame(1), 0);
        assert!(actions.contains(&Action::Speak {
            text: "bench, on your left, nearby".to_string()
        }));
        assert!(!session.frame_in_flight());
        assert_eq!(session.current().map(|r| r.label()), Some("bench"));
    }
}
