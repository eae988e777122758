//! Hazard keyword classification.
//!
//! A label is a hazard when its lower-cased text contains any keyword as a
//! substring. Compound labels ("speed bump") may match several keywords; the
//! result is boolean so no precedence is needed. Substring matching also
//! produces known false positives ("waterfall" contains "wall" and "water").

/// Built-in hazard vocabulary: steps and curbs, barriers, vehicles, people and
/// animals, water and rough ground, construction, drops and holes.
pub const DEFAULT_HAZARD_KEYWORDS: &[&str] = &[
    "hole",
    "gap",
    "crack",
    "step",
    "stairs",
    "staircase",
    "curb",
    "kerb",
    "slope",
    "ramp",
    "obstacle",
    "barrier",
    "wall",
    "fence",
    "pole",
    "pillar",
    "column",
    "door",
    "gate",
    "car",
    "vehicle",
    "motorcycle",
    "bicycle",
    "truck",
    "bus",
    "scooter",
    "person",
    "human",
    "crowd",
    "dog",
    "cat",
    "animal",
    "puddle",
    "water",
    "mud",
    "rock",
    "stone",
    "pit",
    "ditch",
    "construction",
    "cone",
    "traffic cone",
    "bump",
    "speed bump",
    "manhole",
];

#[derive(Clone, Debug)]
pub struct HazardClassifier {
    keywords: Vec<String>,
}

impl HazardClassifier {
    /// Keywords are lower-cased and blanks are dropped.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_hazard(&self, label: &str) -> bool {
        if label.is_empty() {
            return false;
        }
        let label = label.to_lowercase();
        self.keywords.iter().any(|k| label.contains(k.as_str()))
    }
}

impl Default for HazardClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_HAZARD_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitive_substrings() {
        let c = HazardClassifier::default();
        assert!(c.is_hazard("Hole"));
        assert!(c.is_hazard("speed bump"));
        assert!(c.is_hazard("Stairway steps"));
        assert!(c.is_hazard("PARKED CAR"));
        assert!(!c.is_hazard("chair"));
        assert!(!c.is_hazard("wheelchair"));
        assert!(!c.is_hazard(""));
    }

    #[test]
    fn substring_policy_keeps_known_false_positives() {
        let c = HazardClassifier::default();
        assert!(c.is_hazard("waterfall"));
        // "carpet" contains "car"
        assert!(c.is_hazard("carpet"));
    }

    #[test]
    fn custom_vocabulary_replaces_defaults() {
        let c = HazardClassifier::new(["  Ladder ", "", "ice"]);
        assert_eq!(c.keywords(), &["ladder".to_string(), "ice".to_string()]);
        assert!(c.is_hazard("Black ice"));
        assert!(!c.is_hazard("hole"));
    }
}
