use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::detectors::candle::{CandleTagger, DEFAULT_NER_MODEL};
use crate::entity::{Detection, DetectionSource, EntityKind};

/// A labeled span reported by a token-classification backend.
///
/// `start`/`end` are byte offsets into the tagged text and `score` is in
/// [0, 1]. The backend owns tokenization/detokenization alignment; the core
/// trusts the offsets it receives.
#[derive(Debug, Clone)]
pub struct TaggedSpan {
    pub label: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// The narrow capability the pipeline consumes from an NER model.
///
/// Implementations must be shareable across worker threads. Errors never
/// propagate past the detector: a failing backend degrades to an empty
/// candidate list.
pub trait NerTagger: Send + Sync {
    fn tag(&self, text: &str) -> anyhow::Result<Vec<TaggedSpan>>;
}

// Process-wide default backend. Initialization is serialized by the cell,
// so concurrent first-callers produce exactly one loaded model; afterwards
// reads are lock-free. A failed load is cached as absent for the process
// lifetime and the pipeline runs regex-only from then on.
static DEFAULT_TAGGER: OnceCell<Option<Arc<dyn NerTagger>>> = OnceCell::new();

fn default_tagger() -> Option<Arc<dyn NerTagger>> {
    DEFAULT_TAGGER
        .get_or_init(|| match CandleTagger::from_hub(DEFAULT_NER_MODEL) {
            Ok(tagger) => {
                info!(model = DEFAULT_NER_MODEL, "NER model loaded");
                Some(Arc::new(tagger) as Arc<dyn NerTagger>)
            }
            Err(e) => {
                warn!(model = DEFAULT_NER_MODEL, error = %e,
                      "NER model unavailable, continuing with regex detection only");
                None
            }
        })
        .clone()
}

/// Adapter around a token-classification backend.
///
/// Emits PERSON / ORGANIZATION / LOCATION candidates at or above the
/// configured confidence threshold, with model-specific labels normalized
/// at ingress and adjacent same-kind spans merged.
pub struct NerDetector {
    threshold: f32,
    tagger: Option<Arc<dyn NerTagger>>,
}

impl NerDetector {
    /// Detector backed by the process-global lazily loaded model.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            tagger: None,
        }
    }

    /// Detector backed by an externally supplied model.
    pub fn with_tagger(threshold: f32, tagger: Arc<dyn NerTagger>) -> Self {
        Self {
            threshold,
            tagger: Some(tagger),
        }
    }

    pub fn detect(&self, segment: &str) -> Vec<Detection> {
        if segment.is_empty() {
            return Vec::new();
        }

        let tagger = match &self.tagger {
            Some(tagger) => Some(Arc::clone(tagger)),
            None => default_tagger(),
        };
        let Some(tagger) = tagger else {
            return Vec::new();
        };

        // A fault in the backend must reduce coverage, never crash the
        // sanitize call.
        let spans = match catch_unwind(AssertUnwindSafe(|| tagger.tag(segment))) {
            Ok(Ok(spans)) => spans,
            Ok(Err(e)) => {
                warn!(error = %e, "NER tagging failed, emitting no candidates");
                return Vec::new();
            }
            Err(_) => {
                warn!("NER backend panicked, emitting no candidates");
                return Vec::new();
            }
        };

        let mut detections = Vec::new();
        for span in spans {
            let kind = EntityKind::normalize(&span.label);
            if !matches!(
                kind,
                EntityKind::Person | EntityKind::Organization | EntityKind::Location
            ) {
                continue;
            }
            if span.score < self.threshold {
                debug!(kind = %kind, score = span.score, "below confidence threshold");
                continue;
            }
            // Offsets come from the backend; skip anything that does not
            // address a real slice of the segment.
            let text = match segment.get(span.start..span.end) {
                Some(text) if !text.is_empty() => text,
                _ => {
                    debug!(start = span.start, end = span.end, "span offsets out of bounds");
                    continue;
                }
            };
            detections.push(Detection {
                kind,
                text: text.to_string(),
                start: span.start,
                end: span.end,
                confidence: span.score.clamp(0.0, 1.0),
                source: DetectionSource::Ner,
            });
        }

        merge_adjacent(segment, detections)
    }
}

/// Merge candidates of the same kind whose gap is at most one byte.
/// The merged span takes the maximum of the two confidences and its text
/// is re-sliced from the segment so `text == segment[start..end]` holds.
fn merge_adjacent(segment: &str, mut detections: Vec<Detection>) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by_key(|d| d.start);

    let mut merged: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        let mergeable = matches!(
            merged.last(),
            Some(last) if last.kind == detection.kind
                && detection.start.saturating_sub(last.end) <= 1
        );
        if !mergeable {
            merged.push(detection);
            continue;
        }
        let last = merged.last_mut().expect("non-empty");
        if detection.end > last.end {
            last.end = detection.end;
            last.text = segment[last.start..last.end].to_string();
        }
        last.confidence = last.confidence.max(detection.confidence);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTagger {
        spans: Vec<TaggedSpan>,
    }

    impl NerTagger for FixedTagger {
        fn tag(&self, _text: &str) -> anyhow::Result<Vec<TaggedSpan>> {
            Ok(self.spans.clone())
        }
    }

    struct FailingTagger;

    impl NerTagger for FailingTagger {
        fn tag(&self, _text: &str) -> anyhow::Result<Vec<TaggedSpan>> {
            anyhow::bail!("model exploded")
        }
    }

    struct PanickingTagger;

    impl NerTagger for PanickingTagger {
        fn tag(&self, _text: &str) -> anyhow::Result<Vec<TaggedSpan>> {
            panic!("index out of range")
        }
    }

    fn span(label: &str, text: &str, start: usize, end: usize, score: f32) -> TaggedSpan {
        TaggedSpan {
            label: label.to_string(),
            text: text.to_string(),
            start,
            end,
            score,
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let text = "Alice met Bobby";
        let tagger = Arc::new(FixedTagger {
            spans: vec![
                span("PER", "Alice", 0, 5, 0.85),
                span("PER", "Bobby", 10, 15, 0.84),
            ],
        });
        let detector = NerDetector::with_tagger(0.85, tagger);
        let detections = detector.detect(text);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "Alice");
        assert_eq!(detections[0].source, DetectionSource::Ner);
    }

    #[test]
    fn aliases_are_normalized() {
        let text = "Paris is home to Acme";
        let tagger = Arc::new(FixedTagger {
            spans: vec![
                span("GPE", "Paris", 0, 5, 0.99),
                span("ORG", "Acme", 17, 21, 0.95),
            ],
        });
        let detections = NerDetector::with_tagger(0.5, tagger).detect(text);
        assert_eq!(detections[0].kind, EntityKind::Location);
        assert_eq!(detections[1].kind, EntityKind::Organization);
    }

    #[test]
    fn non_pii_labels_are_dropped() {
        let text = "World Cup 2026";
        let tagger = Arc::new(FixedTagger {
            spans: vec![span("MISC", "World Cup", 0, 9, 0.99)],
        });
        assert!(NerDetector::with_tagger(0.5, tagger).detect(text).is_empty());
    }

    #[test]
    fn adjacent_same_kind_spans_merge_with_max_confidence() {
        let text = "John Smith called";
        let tagger = Arc::new(FixedTagger {
            spans: vec![
                span("PER", "John", 0, 4, 0.90),
                span("PER", "Smith", 5, 10, 0.96),
            ],
        });
        let detections = NerDetector::with_tagger(0.5, tagger).detect(text);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "John Smith");
        assert_eq!(detections[0].start, 0);
        assert_eq!(detections[0].end, 10);
        assert!((detections[0].confidence - 0.96).abs() < f32::EPSILON);
    }

    #[test]
    fn distant_spans_stay_separate() {
        let text = "John went to Paris with Jane";
        let tagger = Arc::new(FixedTagger {
            spans: vec![
                span("PER", "John", 0, 4, 0.9),
                span("PER", "Jane", 24, 28, 0.9),
            ],
        });
        let detections = NerDetector::with_tagger(0.5, tagger).detect(text);
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn backend_errors_yield_empty_list() {
        let detector = NerDetector::with_tagger(0.5, Arc::new(FailingTagger));
        assert!(detector.detect("anything at all").is_empty());
    }

    #[test]
    fn backend_panics_are_contained() {
        let detector = NerDetector::with_tagger(0.5, Arc::new(PanickingTagger));
        assert!(detector.detect("anything at all").is_empty());
    }

    #[test]
    fn out_of_bounds_offsets_are_skipped() {
        let text = "short";
        let tagger = Arc::new(FixedTagger {
            spans: vec![span("PER", "ghost", 2, 99, 0.9)],
        });
        assert!(NerDetector::with_tagger(0.5, tagger).detect(text).is_empty());
    }
}
