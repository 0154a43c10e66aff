use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SanitizerConfig;
use crate::detectors::{NerDetector, NerTagger, RegexDetector};
use crate::entity::Detection;
use crate::error::SanitizeError;
use crate::masking::{Masker, RehydrationMap};
use crate::parsers::{self, Format};
use crate::patterns::PatternRegistry;
use crate::resolver;
use crate::whitelist::Whitelist;

/// Outcome of a sanitize call: the masked document plus the map that
/// restores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeResult {
    pub sanitized: String,
    pub map: RehydrationMap,
}

/// The sanitization pipeline.
///
/// Construction validates the configuration and compiles patterns and
/// whitelist once; the resulting value is immutable and safe to share by
/// reference across worker threads. Sanitization itself is a pure
/// function of (configuration, input).
pub struct Sanitizer {
    config: SanitizerConfig,
    regex_detector: Option<RegexDetector>,
    ner_detector: Option<NerDetector>,
    whitelist: Whitelist,
    masker: Masker,
}

impl Sanitizer {
    /// Build a pipeline using the process-global NER model (loaded lazily
    /// on the first NER-enabled call).
    pub fn new(config: SanitizerConfig) -> Result<Self, SanitizeError> {
        Self::build(config, None)
    }

    /// Build a pipeline around an externally supplied NER backend.
    pub fn with_tagger(
        config: SanitizerConfig,
        tagger: Arc<dyn NerTagger>,
    ) -> Result<Self, SanitizeError> {
        Self::build(config, Some(tagger))
    }

    fn build(
        config: SanitizerConfig,
        tagger: Option<Arc<dyn NerTagger>>,
    ) -> Result<Self, SanitizeError> {
        config.validate()?;

        let regex_detector = if config.enable_regex {
            let registry = PatternRegistry::with_packs(&config.pattern_packs)?;
            Some(RegexDetector::new(registry))
        } else {
            None
        };

        let ner_detector = if config.enable_ner {
            Some(match tagger {
                Some(tagger) => NerDetector::with_tagger(config.confidence_threshold, tagger),
                None => NerDetector::new(config.confidence_threshold),
            })
        } else {
            None
        };

        let whitelist = Whitelist::compile(&config.whitelist)?;
        let masker = Masker::new(&config.placeholder_prefix, &config.placeholder_suffix);

        Ok(Self {
            config,
            regex_detector,
            ner_detector,
            whitelist,
            masker,
        })
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Mask all PII in `content` and return the sanitized document with
    /// its rehydration map.
    pub fn sanitize(&self, content: &str, format: Format) -> Result<SanitizeResult, SanitizeError> {
        self.check_length(content)?;

        let parsed = parsers::parse(format, content)?;
        let mut map = RehydrationMap::new();
        let mut masked_segments = Vec::with_capacity(parsed.segments.len());

        for segment in &parsed.segments {
            let spans = self.resolved_spans(segment);
            masked_segments.push(self.masker.mask_segment(segment, &spans, &mut map));
        }

        let sanitized = parsed.reconstruct(masked_segments)?;
        debug!(%format, entries = map.len(), "sanitize complete");
        Ok(SanitizeResult { sanitized, map })
    }

    /// Resolved detections for `content` without masking anything.
    pub fn detect(&self, content: &str, format: Format) -> Result<Vec<Detection>, SanitizeError> {
        self.check_length(content)?;
        let parsed = parsers::parse(format, content)?;
        Ok(parsed
            .segments
            .iter()
            .flat_map(|segment| self.resolved_spans(segment))
            .collect())
    }

    /// Count of resolved detections per kind.
    pub fn statistics(
        &self,
        content: &str,
        format: Format,
    ) -> Result<HashMap<String, usize>, SanitizeError> {
        let mut stats = HashMap::new();
        for detection in self.detect(content, format)? {
            *stats.entry(detection.kind.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Restore originals using this pipeline's placeholder affixes.
    ///
    /// With `Format::Html`, placeholders that came back entity-escaped are
    /// also recovered; no other byte of the document is rewritten.
    pub fn rehydrate(
        &self,
        masked: &str,
        map: &RehydrationMap,
        format: Format,
    ) -> Result<String, SanitizeError> {
        let restored = self.masker.rehydrate(masked, map)?;
        Ok(match format {
            Format::Html => self.masker.rehydrate_escaped_placeholders(&restored, map),
            Format::Text | Format::Json => restored,
        })
    }

    fn check_length(&self, content: &str) -> Result<(), SanitizeError> {
        let actual = content.chars().count();
        if actual > self.config.max_input_characters {
            return Err(SanitizeError::InputTooLarge {
                limit: self.config.max_input_characters,
                actual,
            });
        }
        Ok(())
    }

    /// Detect, whitelist-filter, and conflict-resolve one segment.
    fn resolved_spans(&self, segment: &str) -> Vec<Detection> {
        let mut candidates = Vec::new();
        if let Some(detector) = &self.regex_detector {
            candidates.extend(detector.detect(segment));
        }
        if let Some(detector) = &self.ner_detector {
            candidates.extend(detector.detect(segment));
        }
        let candidates = self.whitelist.filter(candidates);
        resolver::resolve(candidates)
    }
}

/// Sanitize `content` with a one-off pipeline.
pub fn sanitize(
    content: &str,
    format: Format,
    config: SanitizerConfig,
) -> Result<SanitizeResult, SanitizeError> {
    Sanitizer::new(config)?.sanitize(content, format)
}

/// Restore a masked document using only its rehydration map.
///
/// Placeholders are expected in the default `<<KIND_HASH>>` wire shape;
/// the format argument controls post-processing only. With `html`,
/// placeholders that a downstream tool entity-escaped
/// (`&lt;&lt;KIND_HASH&gt;&gt;`) are recovered as well — surrounding
/// source bytes are never rewritten. Everything else is identity.
pub fn rehydrate(
    masked: &str,
    map: &RehydrationMap,
    format: Format,
) -> Result<String, SanitizeError> {
    let masker = Masker::default();
    let restored = masker.rehydrate(masked, map)?;
    Ok(match format {
        Format::Html => masker.rehydrate_escaped_placeholders(&restored, map),
        Format::Text | Format::Json => restored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizer_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sanitizer>();
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let config = SanitizerConfig {
            confidence_threshold: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            Sanitizer::new(config),
            Err(SanitizeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversize_input_fails_before_parsing() {
        let config = SanitizerConfig {
            max_input_characters: 10,
            enable_ner: false,
            ..Default::default()
        };
        let sanitizer = Sanitizer::new(config).unwrap();
        // Invalid JSON, but the length gate must fire first.
        let err = sanitizer.sanitize("{broken json that is long", Format::Json);
        assert!(matches!(
            err,
            Err(SanitizeError::InputTooLarge {
                limit: 10,
                actual: 25
            })
        ));
    }

    #[test]
    fn length_limit_counts_characters_not_bytes() {
        let config = SanitizerConfig {
            max_input_characters: 4,
            enable_ner: false,
            ..Default::default()
        };
        let sanitizer = Sanitizer::new(config).unwrap();
        // Four two-byte characters: eight bytes, four characters.
        assert!(sanitizer.sanitize("éééé", Format::Text).is_ok());
        assert!(sanitizer.sanitize("ééééé", Format::Text).is_err());
    }

    #[test]
    fn html_rehydrate_never_touches_preexisting_entities() {
        let map = RehydrationMap::new();
        let content = "a &amp; b &lt; c";
        assert_eq!(rehydrate(content, &map, Format::Text).unwrap(), content);
        assert_eq!(rehydrate(content, &map, Format::Html).unwrap(), content);
    }

    #[test]
    fn html_rehydrate_recovers_entity_escaped_placeholders() {
        let mut map = RehydrationMap::new();
        map.insert("<<EMAIL_a1b2c3d4>>".to_string(), "j@x.com".to_string());
        let masked = "mail &lt;&lt;EMAIL_a1b2c3d4&gt;&gt; today";
        assert_eq!(
            rehydrate(masked, &map, Format::Html).unwrap(),
            "mail j@x.com today"
        );
        // Text format leaves the escaped rendering alone.
        assert_eq!(rehydrate(masked, &map, Format::Text).unwrap(), masked);
    }
}
