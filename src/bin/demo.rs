//! demo - synthetic camera run through the full detect/fuse/dispatch pipeline

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::mpsc;
use std::time::Duration;

use guide_kernel::{
    now_ms, BackendRegistry, BoundingBox, BoxResult, DetectionMode, Frame, FrameDims, GuideConfig,
    LabelResult, Outputs, Session, TextResult, VisionBackend, VisionCapability,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// Scene vocabulary: (fine label, coarse category the box pass reports).
const SCENE_OBJECTS: &[(&str, &str)] = &[
    ("chair", "Home good"),
    ("person", "Unknown"),
    ("car", "Physical object"),
    ("stairs", "Unknown"),
    ("dog", "Unknown"),
    ("table", "Home good"),
];

const SCENE_SIGNS: &[&str] = &["EXIT", "Platform 2", "Push to open", ""];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds of synthetic frames (ignored with --follow).
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Frames per second offered to the session.
    #[arg(long, default_value_t = 4)]
    fps: u32,
    /// Optional deterministic seed for the synthetic scene.
    #[arg(long)]
    seed: Option<u64>,
    /// Detection mode: object or text.
    #[arg(long, default_value = "object")]
    mode: DetectionMode,
    /// Run in real time until Ctrl-C.
    #[arg(long)]
    follow: bool,
}

/// Vision backend that invents a slowly changing scene.
struct SceneBackend {
    rng: StdRng,
    current: usize,
}

impl SceneBackend {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, current: 0 }
    }

    fn maybe_switch(&mut self) {
        if self.rng.gen_bool(0.2) {
            self.current = self.rng.gen_range(0..SCENE_OBJECTS.len());
        }
    }
}

impl VisionBackend for SceneBackend {
    fn name(&self) -> &'static str {
        "scene"
    }

    fn supports(&self, _capability: VisionCapability) -> bool {
        true
    }

    fn detect_boxes(&mut self, frame: &Frame) -> Result<Vec<BoxResult>> {
        self.maybe_switch();
        if self.rng.gen_bool(0.1) {
            return Ok(Vec::new());
        }
        let width = frame.dims().width() as f32;
        let height = frame.dims().height() as f32;
        let size = self.rng.gen_range(0.1..0.7);
        let bounding_box = BoundingBox {
            center_x: self.rng.gen_range(0.0..width),
            width: width * size,
            height: height * size,
        };
        let (_, coarse) = SCENE_OBJECTS[self.current];
        Ok(vec![BoxResult::labeled(bounding_box, coarse, 0.7)])
    }

    fn label(&mut self, _frame: &Frame) -> Result<Vec<LabelResult>> {
        if self.rng.gen_bool(0.05) {
            return Err(anyhow!("label pass timed out"));
        }
        let (label, _) = SCENE_OBJECTS[self.current];
        Ok(vec![
            LabelResult::new(label, self.rng.gen_range(0.5..0.99)),
            LabelResult::new("floor", self.rng.gen_range(0.3..0.6)),
        ])
    }

    fn recognize_text(&mut self, _frame: &Frame) -> Result<TextResult> {
        if self.rng.gen_bool(0.1) {
            self.current = self.rng.gen_range(0..SCENE_SIGNS.len());
        }
        Ok(TextResult {
            text: SCENE_SIGNS[self.current % SCENE_SIGNS.len()].to_string(),
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let mut config = GuideConfig::load()?;
    config.mode = args.mode;

    let mut registry = BackendRegistry::new();
    registry.register(SceneBackend::new(args.seed));

    let dims = FrameDims::new(FRAME_WIDTH, FRAME_HEIGHT)?;
    let frame_interval_ms = 1_000 / u64::from(args.fps);
    let mut session = Session::start(&config, Outputs::logging())?;

    if args.follow {
        let (tx, rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

        log::info!("demo running until Ctrl-C...");
        let mut seq = 0u64;
        while rx.try_recv().is_err() {
            let now = now_ms()?;
            session.tick(now);
            let frame = Frame::new(Vec::new(), dims, seq);
            session.process_frame_concurrent(&registry, &frame, now);
            seq += 1;
            std::thread::sleep(Duration::from_millis(frame_interval_ms));
        }
    } else {
        let total_frames = args.seconds.saturating_mul(u64::from(args.fps));
        let mut emitted = 0usize;
        for seq in 0..total_frames {
            let now = seq * frame_interval_ms;
            session.tick(now);
            let frame = Frame::new(Vec::new(), dims, seq);
            emitted += session.process_frame_concurrent(&registry, &frame, now).len();
        }
        session.tick(total_frames * frame_interval_ms + 1_000);
        log::info!("{} frame(s) analysed, {} action(s) emitted", total_frames, emitted);
    }

    session.end();
    Ok(())
}
