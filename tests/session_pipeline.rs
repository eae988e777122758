use std::sync::{Arc, Mutex};

use anyhow::Result;

use guide_kernel::fusion::Join;
use guide_kernel::haptics::{HAZARD_PULSES, PULSE_OFF_MS, PULSE_ON_MS};
use guide_kernel::session::NOTHING_DETECTED;
use guide_kernel::{
    Action, BackendRegistry, BoundingBox, BoxResult, DetectionMode, Direction, Display,
    DistanceBand, Frame, FrameDims, GuideConfig, Haptics, LabelResult, Outputs, Session, Speaker,
    StubBackend, UiUpdate, Waveform,
};

const W: u32 = 1000;
const H: u32 = 1000;

#[derive(Clone, Default)]
struct Recorder {
    spoken: Arc<Mutex<Vec<String>>>,
    played: Arc<Mutex<Vec<Waveform>>>,
    cancels: Arc<Mutex<usize>>,
    shown: Arc<Mutex<Vec<UiUpdate>>>,
}

impl Recorder {
    fn outputs(&self) -> Outputs {
        Outputs {
            speaker: Box::new(self.clone()),
            haptics: Box::new(self.clone()),
            display: Box::new(self.clone()),
        }
    }

    fn pulse_counts(&self) -> Vec<usize> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(Waveform::pulse_count)
            .collect()
    }

    fn last_shown(&self) -> UiUpdate {
        self.shown.lock().unwrap().last().cloned().expect("display updated")
    }
}

impl Speaker for Recorder {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

impl Haptics for Recorder {
    fn play(&mut self, waveform: &Waveform) -> Result<()> {
        self.played.lock().unwrap().push(waveform.clone());
        Ok(())
    }

    fn cancel(&mut self) {
        *self.cancels.lock().unwrap() += 1;
    }
}

impl Display for Recorder {
    fn show(&mut self, update: &UiUpdate) {
        self.shown.lock().unwrap().push(update.clone());
    }
}

fn frame(seq: u64) -> Frame {
    Frame::new(vec![0; 4], FrameDims::new(W, H).unwrap(), seq)
}

fn registry(stub: StubBackend) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(stub);
    registry
}

fn start(recorder: &Recorder) -> Session {
    Session::start(&GuideConfig::default(), recorder.outputs()).expect("session start")
}

#[test]
fn unknown_box_is_named_by_label_pass() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    // center at 0.8 of the width, area ratio 0.35
    let side = (0.35f32 * (W * H) as f32).sqrt();
    let mut stub = StubBackend::new();
    stub.push_boxes(vec![BoxResult::labeled(
        BoundingBox {
            center_x: 800.0,
            width: side,
            height: side,
        },
        "Unknown",
        0.9,
    )])
    .push_labels(vec![LabelResult::new("chair", 0.82)]);
    let registry = registry(stub);

    let actions = session.process_frame(&registry, &frame(1), 0);

    let result = session.current().expect("fused result");
    assert_eq!(result.label(), "chair");
    assert_eq!(result.direction(), Direction::Right);
    assert_eq!(result.distance(), Some(DistanceBand::VeryClose));
    assert!(!result.is_hazard());
    assert_eq!(result.confidence(), 82);
    assert_eq!(
        actions,
        vec![
            Action::Speak {
                text: "chair, on your right, very close".to_string()
            },
            Action::Vibrate {
                direction: Direction::Right,
                distance: Some(DistanceBand::VeryClose)
            },
        ]
    );
    let ui = recorder.last_shown();
    assert_eq!(ui.display_label, "chair");
    assert_eq!(ui.confidence_text, "82% confidence");
}

#[test]
fn label_only_hazard_staggers_burst_after_direction() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    let mut stub = StubBackend::new();
    stub.push_boxes(vec![]).push_labels(vec![
        LabelResult::new("hole", 0.5),
        LabelResult::new("gravel", 0.3),
    ]);
    let registry = registry(stub);

    let actions = session.process_frame(&registry, &frame(1), 10_000);

    assert_eq!(session.current().map(|r| r.label()), Some("hole"));
    assert!(actions.contains(&Action::Vibrate {
        direction: Direction::Front,
        distance: None
    }));
    let delay = actions
        .iter()
        .find_map(|a| match a {
            Action::VibrateHazard { delay_ms } => Some(*delay_ms),
            _ => None,
        })
        .expect("hazard burst");
    assert!(delay >= 900);
    assert!(delay >= 4 * (PULSE_ON_MS + PULSE_OFF_MS));

    // session open cue, then the four-pulse front code
    assert_eq!(recorder.pulse_counts(), vec![2, 4]);
    session.tick(10_000 + delay - 1);
    assert_eq!(recorder.pulse_counts(), vec![2, 4]);
    session.tick(10_000 + delay);
    assert_eq!(recorder.pulse_counts(), vec![2, 4, HAZARD_PULSES]);
}

#[test]
fn repeated_object_vibrates_once_per_cooldown() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    let bench = BoxResult::labeled(
        BoundingBox {
            center_x: 100.0,
            width: 200.0,
            height: 200.0,
        },
        "bench",
        0.9,
    );
    let mut stub = StubBackend::new();
    for _ in 0..=15 {
        stub.push_boxes(vec![bench.clone()]);
    }
    let registry = registry(stub);

    let mut vibrated_at = Vec::new();
    let mut spoken_at = Vec::new();
    for step in 0..=15u64 {
        let now = step * 200;
        for action in session.process_frame(&registry, &frame(step), now) {
            match action {
                Action::Vibrate { .. } => vibrated_at.push(now),
                Action::Speak { .. } => spoken_at.push(now),
                Action::VibrateHazard { .. } => panic!("bench is not a hazard"),
            }
        }
    }

    assert_eq!(vibrated_at, vec![0, 2_600]);
    assert_eq!(spoken_at, vec![0]);
}

#[test]
fn empty_text_updates_display_only() {
    let recorder = Recorder::default();
    let config = GuideConfig {
        mode: DetectionMode::Text,
        ..GuideConfig::default()
    };
    let mut session = Session::start(&config, recorder.outputs()).expect("session start");
    let mut stub = StubBackend::new();
    stub.push_text("   ").push_text("EXIT");
    let registry = registry(stub);

    let before = session.dispatcher().lock().unwrap().state().clone();
    let actions = session.process_frame(&registry, &frame(1), 500);
    assert!(actions.is_empty());
    assert_eq!(*session.dispatcher().lock().unwrap().state(), before);
    assert_eq!(recorder.last_shown().display_label, "No text found");

    let actions = session.process_frame(&registry, &frame(2), 1_000);
    assert_eq!(
        actions,
        vec![Action::Speak {
            text: "EXIT".to_string()
        }]
    );
    // text mode never vibrates
    assert_eq!(recorder.pulse_counts(), vec![2]);
}

#[test]
fn failed_label_pass_falls_back_to_box_position() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    let mut stub = StubBackend::new();
    stub.push_boxes(vec![BoxResult::unlabeled(BoundingBox {
        center_x: 500.0,
        width: 200.0,
        height: 200.0,
    })])
    .push_label_failure("labeler offline");
    let registry = registry(stub);

    let actions = session.process_frame(&registry, &frame(1), 0);
    assert_eq!(
        actions.first(),
        Some(&Action::Speak {
            text: "Object, straight ahead, a few meters away".to_string()
        })
    );
    assert_eq!(session.current().map(|r| r.confidence()), Some(0));
}

#[test]
fn both_passes_failing_drops_frame() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    let mut stub = StubBackend::new();
    stub.push_box_failure("detector offline")
        .push_label_failure("labeler offline");
    let registry = registry(stub);

    let shown_before = recorder.shown.lock().unwrap().len();
    assert!(session.process_frame(&registry, &frame(1), 0).is_empty());
    assert_eq!(recorder.shown.lock().unwrap().len(), shown_before);
    assert!(!session.frame_in_flight());
}

#[test]
fn labelled_box_skips_label_pass() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    let mut stub = StubBackend::new();
    stub.push_boxes(vec![BoxResult::labeled(
        BoundingBox {
            center_x: 900.0,
            width: 100.0,
            height: 100.0,
        },
        "Food",
        0.7,
    )])
    .push_boxes(vec![])
    .push_labels(vec![LabelResult::new("banana", 0.9)]);
    let registry = registry(stub);

    session.process_frame(&registry, &frame(1), 0);
    assert_eq!(session.current().map(|r| r.label()), Some("Food"));

    // The scripted labels were not consumed by the first frame.
    session.process_frame(&registry, &frame(2), 100);
    assert_eq!(session.current().map(|r| r.label()), Some("banana"));
}

#[test]
fn ending_session_cancels_pending_hazard_and_ignores_late_frames() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    let mut stub = StubBackend::new();
    stub.push_boxes(vec![]).push_labels(vec![LabelResult::new("stairs", 0.9)]);
    let registry = registry(stub);

    let actions = session.process_frame(&registry, &frame(1), 0);
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::VibrateHazard { .. })));
    assert_eq!(session.pending_haptics(), 1);

    let (ticket, pending) = session
        .begin_object_frame(&frame(2))
        .expect("slot free after first frame");
    session.end();
    assert_eq!(*recorder.cancels.lock().unwrap(), 1);
    assert_eq!(session.pending_haptics(), 0);

    session.tick(60_000);
    assert_eq!(recorder.pulse_counts(), vec![2, 4]);

    if let Join::Ready(passes) =
        pending.with_boxes(Ok(vec![BoxResult::labeled(
            BoundingBox {
                center_x: 100.0,
                width: 100.0,
                height: 100.0,
            },
            "Food",
            0.9,
        )]))
    {
        assert!(session.complete_object(ticket, passes, 100).is_empty());
    } else {
        panic!("labelled box completes the join");
    }
    assert!(session.process_frame(&registry, &frame(3), 200).is_empty());

    session.end();
    assert_eq!(*recorder.cancels.lock().unwrap(), 1);
}

#[test]
fn repeat_bypasses_cooldowns() {
    let recorder = Recorder::default();
    let mut session = start(&recorder);
    session.repeat();
    assert_eq!(
        recorder.spoken.lock().unwrap().last().map(String::as_str),
        Some(NOTHING_DETECTED)
    );

    let mut stub = StubBackend::new();
    stub.push_boxes(vec![]).push_labels(vec![LabelResult::new("cup", 0.9)]);
    let registry = registry(stub);
    session.process_frame(&registry, &frame(1), 0);
    session.repeat();

    let spoken = recorder.spoken.lock().unwrap().clone();
    assert_eq!(&spoken[spoken.len() - 2..], ["cup, straight ahead", "cup, straight ahead"]);
    assert_eq!(recorder.pulse_counts(), vec![2, 4, 4]);
}
