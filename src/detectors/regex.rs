use tracing::debug;

use crate::entity::{Detection, DetectionSource};
use crate::patterns::PatternRegistry;

/// Runs every registry pattern against a segment and emits offset-tagged
/// candidates with confidence 1.0.
#[derive(Debug, Clone)]
pub struct RegexDetector {
    registry: PatternRegistry,
}

impl RegexDetector {
    pub fn new(registry: PatternRegistry) -> Self {
        Self { registry }
    }

    /// Scan `segment` with each pattern in declaration order.
    ///
    /// Matches are emitted as the engine reports them (leftmost,
    /// non-overlapping per pattern); cross-pattern ordering is fixed by the
    /// conflict resolver. Zero-width matches are skipped. A match must pass
    /// the pattern's validator and context-keyword gate, if any.
    pub fn detect(&self, segment: &str) -> Vec<Detection> {
        if segment.is_empty() {
            return Vec::new();
        }

        let mut detections = Vec::new();

        for pattern in self.registry.patterns() {
            for m in pattern.regex.find_iter(segment) {
                if m.start() == m.end() {
                    continue;
                }
                if let Some(validator) = &pattern.validator {
                    if !validator.accepts(m.as_str()) {
                        debug!(kind = %pattern.kind, start = m.start(), "validator rejected match");
                        continue;
                    }
                }
                if !pattern.context_matches(segment, m.start(), m.end()) {
                    debug!(kind = %pattern.kind, start = m.start(), "no context keyword near match");
                    continue;
                }
                detections.push(Detection {
                    kind: pattern.kind.clone(),
                    text: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                    confidence: 1.0,
                    source: DetectionSource::Regex,
                });
            }
        }

        detections
    }
}
