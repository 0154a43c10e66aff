use regex::Regex;
use tracing::debug;

use crate::entity::Detection;
use crate::error::SanitizeError;

/// Terms that must never be reported as PII.
///
/// Each term is compiled once into a case-insensitive, word-bounded
/// pattern (Unicode letter/digit classes). Matching is a property of the
/// candidate's matched text only; surrounding context is never inspected.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    terms: Vec<Regex>,
}

impl Whitelist {
    pub fn compile(terms: &[String]) -> Result<Self, SanitizeError> {
        let terms = terms
            .iter()
            .map(|term| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))).map_err(|e| {
                    SanitizeError::InvalidConfig(format!("bad whitelist term '{term}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Drop candidates whose matched text contains any whitelisted term.
    pub fn filter(&self, detections: Vec<Detection>) -> Vec<Detection> {
        if self.terms.is_empty() {
            return detections;
        }
        detections
            .into_iter()
            .filter(|d| {
                let keep = !self.terms.iter().any(|t| t.is_match(&d.text));
                if !keep {
                    debug!(kind = %d.kind, start = d.start, "whitelisted candidate dropped");
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DetectionSource, EntityKind};

    fn detection(text: &str) -> Detection {
        Detection {
            kind: EntityKind::Organization,
            text: text.to_string(),
            start: 0,
            end: text.len(),
            confidence: 0.9,
            source: DetectionSource::Ner,
        }
    }

    #[test]
    fn matches_case_insensitively() {
        let wl = Whitelist::compile(&["acme corp".to_string()]).unwrap();
        assert!(wl.filter(vec![detection("Acme Corp")]).is_empty());
        assert!(wl.filter(vec![detection("ACME CORP")]).is_empty());
    }

    #[test]
    fn requires_word_boundaries() {
        let wl = Whitelist::compile(&["acme".to_string()]).unwrap();
        // "acmeish" should not be suppressed; "Acme Corp" contains the
        // whole word.
        assert_eq!(wl.filter(vec![detection("acmeish")]).len(), 1);
        assert!(wl.filter(vec![detection("Acme Corp")]).is_empty());
    }

    #[test]
    fn ignores_surrounding_context() {
        // The whitelist never looks past the candidate text itself.
        let wl = Whitelist::compile(&["example".to_string()]).unwrap();
        let kept = wl.filter(vec![detection("John Smith")]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn empty_whitelist_keeps_everything() {
        let wl = Whitelist::compile(&[]).unwrap();
        assert_eq!(wl.filter(vec![detection("anything")]).len(), 1);
    }
}
