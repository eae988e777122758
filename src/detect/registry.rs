use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::result::{BoxResult, LabelResult, TextResult};
use crate::frame::Frame;

use super::backend::{VisionBackend, VisionCapability};

pub type SharedBackend = Arc<Mutex<dyn VisionBackend>>;

/// Thread-safe registry of vision backends.
///
/// Backends are wrapped in `Mutex` because every pass takes `&mut self`. The
/// two object-mode passes for one frame may run on separate threads, each
/// locking only the backend it needs.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: VisionBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability.
    pub fn backend_for_capability(&self, capability: VisionCapability) -> Result<SharedBackend> {
        if let Some(default_backend) = self.default_backend() {
            let supports = {
                let guard = default_backend
                    .lock()
                    .map_err(|_| anyhow!("default backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            let Some(backend) = self.backends.get(&name) else {
                continue;
            };
            let supports = {
                let guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(backend.clone());
            }
        }

        Err(anyhow!(
            "no registered backend supports capability {:?}",
            capability
        ))
    }

    pub fn detect_boxes(&self, frame: &Frame) -> Result<Vec<BoxResult>> {
        let backend = self.backend_for_capability(VisionCapability::ObjectDetection)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.detect_boxes(frame)
    }

    pub fn label(&self, frame: &Frame) -> Result<Vec<LabelResult>> {
        let backend = self.backend_for_capability(VisionCapability::ImageLabeling)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.label(frame)
    }

    pub fn recognize_text(&self, frame: &Frame) -> Result<TextResult> {
        let backend = self.backend_for_capability(VisionCapability::TextRecognition)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.recognize_text(frame)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
