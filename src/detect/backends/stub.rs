use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::{VisionBackend, VisionCapability};
use crate::detect::result::{BoxResult, LabelResult, TextResult};
use crate::frame::Frame;

/// Scripted backend for tests, demos and trace replay.
///
/// Each pass pops the next scripted response; an exhausted script yields an
/// empty result. A scripted `Err(message)` makes that call fail.
#[derive(Default)]
pub struct StubBackend {
    boxes: VecDeque<Result<Vec<BoxResult>, String>>,
    labels: VecDeque<Result<Vec<LabelResult>, String>>,
    texts: VecDeque<Result<String, String>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_boxes(&mut self, boxes: Vec<BoxResult>) -> &mut Self {
        self.boxes.push_back(Ok(boxes));
        self
    }

    pub fn push_box_failure(&mut self, message: &str) -> &mut Self {
        self.boxes.push_back(Err(message.to_string()));
        self
    }

    pub fn push_labels(&mut self, labels: Vec<LabelResult>) -> &mut Self {
        self.labels.push_back(Ok(labels));
        self
    }

    pub fn push_label_failure(&mut self, message: &str) -> &mut Self {
        self.labels.push_back(Err(message.to_string()));
        self
    }

    pub fn push_text(&mut self, text: &str) -> &mut Self {
        self.texts.push_back(Ok(text.to_string()));
        self
    }
}

impl VisionBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, _capability: VisionCapability) -> bool {
        true
    }

    fn detect_boxes(&mut self, _frame: &Frame) -> Result<Vec<BoxResult>> {
        match self.boxes.pop_front() {
            Some(scripted) => scripted.map_err(|e| anyhow!(e)),
            None => Ok(vec![]),
        }
    }

    fn label(&mut self, _frame: &Frame) -> Result<Vec<LabelResult>> {
        match self.labels.pop_front() {
            Some(scripted) => scripted.map_err(|e| anyhow!(e)),
            None => Ok(vec![]),
        }
    }

    fn recognize_text(&mut self, _frame: &Frame) -> Result<TextResult> {
        match self.texts.pop_front() {
            Some(scripted) => scripted
                .map(|text| TextResult { text })
                .map_err(|e| anyhow!(e)),
            None => Ok(TextResult::default()),
        }
    }
}
