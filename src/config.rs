use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::dispatch::CooldownSettings;
use crate::fusion::ResultFuser;
use crate::hazard::{HazardClassifier, DEFAULT_HAZARD_KEYWORDS};
use crate::position::{PositionResolver, PositionThresholds};
use crate::DetectionMode;

const DEFAULT_LABEL_MIN_CONFIDENCE: f32 = 0.45;
const DEFAULT_BOX_MIN_CONFIDENCE: f32 = 0.0;

#[derive(Debug, Deserialize, Default)]
struct GuideConfigFile {
    vision: Option<VisionConfigFile>,
    cooldowns: Option<CooldownConfigFile>,
    hazards: Option<HazardConfigFile>,
    position: Option<PositionConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    label_min_confidence: Option<f32>,
    box_min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CooldownConfigFile {
    object_speech_ms: Option<u64>,
    text_speech_ms: Option<u64>,
    direction_ms: Option<u64>,
    hazard_ms: Option<u64>,
    hazard_stagger_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HazardConfigFile {
    keywords: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct PositionConfigFile {
    left_ratio: Option<f32>,
    right_ratio: Option<f32>,
    very_close_area: Option<f32>,
    nearby_area: Option<f32>,
    few_meters_area: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    mode: Option<DetectionMode>,
    speech_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionSettings {
    /// Free-form labels below this confidence are ignored.
    pub label_min_confidence: f32,
    /// Coarse box labels below this confidence are ignored.
    pub box_min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct GuideConfig {
    pub vision: VisionSettings,
    pub cooldowns: CooldownSettings,
    pub hazard_keywords: Vec<String>,
    pub position: PositionThresholds,
    pub mode: DetectionMode,
    /// False for users who cannot hear speech; haptics and display still run.
    pub speech_enabled: bool,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            vision: VisionSettings {
                label_min_confidence: DEFAULT_LABEL_MIN_CONFIDENCE,
                box_min_confidence: DEFAULT_BOX_MIN_CONFIDENCE,
            },
            cooldowns: CooldownSettings::default(),
            hazard_keywords: DEFAULT_HAZARD_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            position: PositionThresholds::default(),
            mode: DetectionMode::Object,
            speech_enabled: true,
        }
    }
}

impl GuideConfig {
    /// File named by `GUIDE_CONFIG` (if set), then `GUIDE_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GUIDE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuideConfigFile) -> Self {
        let defaults = Self::default();
        let vision = file.vision.unwrap_or_default();
        let cooldowns = file.cooldowns.unwrap_or_default();
        let position = file.position.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        Self {
            vision: VisionSettings {
                label_min_confidence: vision
                    .label_min_confidence
                    .unwrap_or(defaults.vision.label_min_confidence),
                box_min_confidence: vision
                    .box_min_confidence
                    .unwrap_or(defaults.vision.box_min_confidence),
            },
            cooldowns: CooldownSettings {
                object_speech_ms: cooldowns
                    .object_speech_ms
                    .unwrap_or(defaults.cooldowns.object_speech_ms),
                text_speech_ms: cooldowns
                    .text_speech_ms
                    .unwrap_or(defaults.cooldowns.text_speech_ms),
                direction_ms: cooldowns
                    .direction_ms
                    .unwrap_or(defaults.cooldowns.direction_ms),
                hazard_ms: cooldowns.hazard_ms.unwrap_or(defaults.cooldowns.hazard_ms),
                hazard_stagger_ms: cooldowns
                    .hazard_stagger_ms
                    .unwrap_or(defaults.cooldowns.hazard_stagger_ms),
            },
            hazard_keywords: file
                .hazards
                .and_then(|hazards| hazards.keywords)
                .unwrap_or(defaults.hazard_keywords),
            position: PositionThresholds {
                left_ratio: position.left_ratio.unwrap_or(defaults.position.left_ratio),
                right_ratio: position.right_ratio.unwrap_or(defaults.position.right_ratio),
                very_close_area: position
                    .very_close_area
                    .unwrap_or(defaults.position.very_close_area),
                nearby_area: position.nearby_area.unwrap_or(defaults.position.nearby_area),
                few_meters_area: position
                    .few_meters_area
                    .unwrap_or(defaults.position.few_meters_area),
            },
            mode: session.mode.unwrap_or(defaults.mode),
            speech_enabled: session.speech_enabled.unwrap_or(defaults.speech_enabled),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_parsed::<f32>("GUIDE_LABEL_MIN_CONFIDENCE", "a number")? {
            self.vision.label_min_confidence = value;
        }
        if let Some(value) = env_parsed::<f32>("GUIDE_BOX_MIN_CONFIDENCE", "a number")? {
            self.vision.box_min_confidence = value;
        }
        for (key, slot) in [
            (
                "GUIDE_OBJECT_SPEECH_COOLDOWN_MS",
                &mut self.cooldowns.object_speech_ms,
            ),
            (
                "GUIDE_TEXT_SPEECH_COOLDOWN_MS",
                &mut self.cooldowns.text_speech_ms,
            ),
            ("GUIDE_DIRECTION_COOLDOWN_MS", &mut self.cooldowns.direction_ms),
            ("GUIDE_HAZARD_INTERVAL_MS", &mut self.cooldowns.hazard_ms),
            ("GUIDE_HAZARD_STAGGER_MS", &mut self.cooldowns.hazard_stagger_ms),
        ] {
            if let Some(value) = env_parsed::<u64>(key, "an integer number of milliseconds")? {
                *slot = value;
            }
        }
        if let Ok(keywords) = std::env::var("GUIDE_HAZARD_KEYWORDS") {
            let parsed = split_csv(&keywords);
            if !parsed.is_empty() {
                self.hazard_keywords = parsed;
            }
        }
        if let Ok(mode) = std::env::var("GUIDE_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.parse()?;
            }
        }
        if let Some(enabled) = env_parsed::<bool>("GUIDE_SPEECH_ENABLED", "true or false")? {
            self.speech_enabled = enabled;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("label_min_confidence", self.vision.label_min_confidence),
            ("box_min_confidence", self.vision.box_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        for (name, value) in [
            ("object_speech_ms", self.cooldowns.object_speech_ms),
            ("text_speech_ms", self.cooldowns.text_speech_ms),
            ("direction_ms", self.cooldowns.direction_ms),
            ("hazard_ms", self.cooldowns.hazard_ms),
        ] {
            if value == 0 {
                return Err(anyhow!("cooldown {} must be greater than zero", name));
            }
        }
        if self.hazard_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(anyhow!("hazard keyword list must not be empty"));
        }
        self.position.validate()
    }

    pub fn hazard_classifier(&self) -> HazardClassifier {
        HazardClassifier::new(&self.hazard_keywords)
    }

    pub fn fuser(&self) -> ResultFuser {
        ResultFuser::new(
            PositionResolver::new(self.position),
            self.hazard_classifier(),
            self.vision.label_min_confidence,
            self.vision.box_min_confidence,
        )
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, expected)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<GuideConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
