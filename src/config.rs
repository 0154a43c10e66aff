use serde::{Deserialize, Serialize};

use crate::error::SanitizeError;
use crate::patterns::PatternPack;

/// Default minimum confidence for NER-sourced detections.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Default hard cap on input length, counted in characters.
pub const DEFAULT_MAX_INPUT_CHARACTERS: usize = 50_000;

/// Default placeholder affixes, forming `<<KIND_HASH>>` tokens.
pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "<<";
pub const DEFAULT_PLACEHOLDER_SUFFIX: &str = ">>";

/// Pipeline configuration.
///
/// Immutable once a [`Sanitizer`](crate::Sanitizer) is constructed: pattern
/// packs and whitelist terms are compiled at construction (terms into
/// case-insensitive word-bounded matchers; the stored strings keep their
/// original casing), and the resulting sanitizer can be shared by
/// reference across threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Enables the structured-pattern regex detector.
    pub enable_regex: bool,
    /// Enables the NER detector for free-text entities (PERSON,
    /// ORGANIZATION, LOCATION). The model loads lazily on first use.
    pub enable_ner: bool,
    /// Inclusive minimum confidence for NER emission.
    pub confidence_threshold: f32,
    /// Terms never reported as PII. Matching is case-insensitive and
    /// word-bounded, against the matched text only.
    pub whitelist: Vec<String>,
    pub placeholder_prefix: String,
    pub placeholder_suffix: String,
    /// Inputs longer than this (in characters) fail fast with
    /// [`SanitizeError::InputTooLarge`].
    pub max_input_characters: usize,
    /// Extra pattern packs, composed in order; a later pack's pattern
    /// replaces an earlier pattern with the same kind name.
    pub pattern_packs: Vec<PatternPack>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            enable_regex: true,
            enable_ner: true,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            whitelist: Vec::new(),
            placeholder_prefix: DEFAULT_PLACEHOLDER_PREFIX.to_string(),
            placeholder_suffix: DEFAULT_PLACEHOLDER_SUFFIX.to_string(),
            max_input_characters: DEFAULT_MAX_INPUT_CHARACTERS,
            pattern_packs: Vec::new(),
        }
    }
}

impl SanitizerConfig {
    /// Validate enumerated options. Called once at pipeline construction;
    /// pattern-pack contents are validated separately when compiled.
    pub fn validate(&self) -> Result<(), SanitizeError> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(SanitizeError::InvalidConfig(format!(
                "confidence_threshold must be within [0.0, 1.0], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_input_characters == 0 {
            return Err(SanitizeError::InvalidConfig(
                "max_input_characters must be positive".to_string(),
            ));
        }
        if self.placeholder_prefix.is_empty() || self.placeholder_suffix.is_empty() {
            return Err(SanitizeError::InvalidConfig(
                "placeholder affixes must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SanitizerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.confidence_threshold, 0.85);
        assert_eq!(config.max_input_characters, 50_000);
        assert_eq!(config.placeholder_prefix, "<<");
        assert_eq!(config.placeholder_suffix, ">>");
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = SanitizerConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SanitizeError::InvalidConfig(_))
        ));

        let config = SanitizerConfig {
            confidence_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_affixes() {
        let config = SanitizerConfig {
            placeholder_prefix: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
