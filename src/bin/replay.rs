//! replay - feed a recorded detection trace through fusion and dispatch
//!
//! The trace is a JSON array of frames:
//! `{ "t_ms", "width", "height", "boxes", "labels", "text", "box_error", "label_error", "text_error" }`.
//! Every emitted action is printed as one JSON line.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use guide_kernel::fusion::Join;
use guide_kernel::{
    Action, BoxResult, DetectionMode, Frame, FrameDims, GuideConfig, LabelResult, Outputs,
    Session, TextResult,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Trace file (JSON array of frames).
    #[arg(long)]
    trace: PathBuf,
    /// Optional config file; falls back to GUIDE_CONFIG.
    #[arg(long, env = "GUIDE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct TraceFrame {
    t_ms: u64,
    width: u32,
    height: u32,
    #[serde(default)]
    boxes: Vec<BoxResult>,
    #[serde(default)]
    labels: Vec<LabelResult>,
    text: Option<String>,
    /// Simulates a failed box pass.
    box_error: Option<String>,
    /// Simulates a failed label pass.
    label_error: Option<String>,
    /// Simulates a failed text-recognition pass.
    text_error: Option<String>,
}

#[derive(Serialize)]
struct ActionLine<'a> {
    t_ms: u64,
    seq: u64,
    #[serde(flatten)]
    action: &'a Action,
}

fn pass<T>(value: T, error: Option<String>) -> Result<T> {
    match error {
        Some(message) => Err(anyhow!(message)),
        None => Ok(value),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = GuideConfig::load_from(args.config.as_deref())?;
    let raw = std::fs::read_to_string(&args.trace)
        .map_err(|e| anyhow!("failed to read trace {}: {}", args.trace.display(), e))?;
    let trace: Vec<TraceFrame> = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid trace {}: {}", args.trace.display(), e))?;

    let mut session = Session::start(&config, Outputs::logging())?;
    let mut last_t = 0;
    for (seq, entry) in trace.into_iter().enumerate() {
        let seq = seq as u64;
        if entry.t_ms < last_t {
            return Err(anyhow!("trace timestamps must not go backwards (frame {})", seq));
        }
        last_t = entry.t_ms;
        session.tick(entry.t_ms);

        let frame = Frame::new(Vec::new(), FrameDims::new(entry.width, entry.height)?, seq);
        let actions = match session.mode() {
            DetectionMode::Text => {
                let Some(ticket) = session.begin_frame(&frame) else {
                    continue;
                };
                let text = entry.text.unwrap_or_default();
                session.complete_text(ticket, pass(TextResult { text }, entry.text_error), entry.t_ms)
            }
            DetectionMode::Object => {
                let Some((ticket, pending)) = session.begin_object_frame(&frame) else {
                    continue;
                };
                let passes = match pending.with_boxes(pass(entry.boxes, entry.box_error)) {
                    Join::Ready(passes) => passes,
                    Join::Waiting(pending) => {
                        match pending.with_labels(pass(entry.labels, entry.label_error)) {
                            Join::Ready(passes) => passes,
                            Join::Waiting(_) => {
                                session.abandon_frame(ticket);
                                continue;
                            }
                        }
                    }
                };
                session.complete_object(ticket, passes, entry.t_ms)
            }
        };

        for action in &actions {
            let line = ActionLine {
                t_ms: entry.t_ms,
                seq,
                action,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
    }
    session.tick(last_t.saturating_add(10_000));
    session.end();
    Ok(())
}
