use std::cmp::Reverse;

use crate::entity::Detection;

/// Reduce overlapping candidates from heterogeneous sources to a total
/// order of pairwise disjoint spans, sorted by start, suitable for
/// left-to-right substitution.
///
/// Candidates are ordered by `(start asc, end desc, priority desc)` and
/// swept with a moving `last_end`. A candidate overlapping the previously
/// accepted one replaces it only when both its priority and its end
/// strictly exceed the accepted candidate's. Candidates are never split:
/// partial overlaps resolve by whole-candidate replacement, so every
/// placeholder's stored value is the real matched text.
pub fn resolve(mut candidates: Vec<Detection>) -> Vec<Detection> {
    if candidates.is_empty() {
        return candidates;
    }

    candidates.sort_by_key(|d| (d.start, Reverse(d.end), Reverse(d.priority())));

    let mut accepted: Vec<Detection> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let overlaps = accepted
            .last()
            .is_some_and(|last| candidate.start < last.end);
        if !overlaps {
            accepted.push(candidate);
            continue;
        }
        let index = accepted.len() - 1;
        let last = &accepted[index];
        if candidate.priority() > last.priority() && candidate.end > last.end {
            accepted[index] = candidate;
        }
        // Otherwise dropped: lower priority, or contained within the
        // accepted span.
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DetectionSource, EntityKind};

    fn candidate(kind: EntityKind, start: usize, end: usize, source: DetectionSource) -> Detection {
        Detection {
            kind,
            text: "x".repeat(end - start),
            start,
            end,
            confidence: 1.0,
            source,
        }
    }

    fn assert_disjoint_sorted(spans: &[Detection]) {
        for pair in spans.windows(2) {
            assert!(pair[0].end <= pair[1].start, "overlap: {pair:?}");
        }
    }

    #[test]
    fn empty_input_empty_output() {
        assert!(resolve(Vec::new()).is_empty());
    }

    #[test]
    fn disjoint_candidates_pass_through_sorted() {
        let resolved = resolve(vec![
            candidate(EntityKind::Phone, 20, 32, DetectionSource::Regex),
            candidate(EntityKind::Email, 0, 10, DetectionSource::Regex),
        ]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].start, 0);
        assert_disjoint_sorted(&resolved);
    }

    #[test]
    fn duplicate_spans_collapse_to_highest_priority() {
        let resolved = resolve(vec![
            candidate(EntityKind::Person, 5, 15, DetectionSource::Ner),
            candidate(EntityKind::Email, 5, 15, DetectionSource::Regex),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].kind, EntityKind::Email);
    }

    #[test]
    fn contained_candidate_is_dropped_never_truncated() {
        // A PERSON span swallowing an inner EMAIL: the email has higher
        // priority but does not extend past the person span, so the person
        // span (seen first, longer) wins whole; nothing is truncated.
        let resolved = resolve(vec![
            candidate(EntityKind::Person, 0, 30, DetectionSource::Ner),
            candidate(EntityKind::Email, 10, 20, DetectionSource::Regex),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!((resolved[0].start, resolved[0].end), (0, 30));
    }

    #[test]
    fn higher_priority_extending_candidate_replaces_whole() {
        // NER starts first but a structured match extends beyond it:
        // replace the accepted span wholesale.
        let resolved = resolve(vec![
            candidate(EntityKind::Person, 0, 12, DetectionSource::Ner),
            candidate(EntityKind::Email, 4, 25, DetectionSource::Regex),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].kind, EntityKind::Email);
        assert_eq!((resolved[0].start, resolved[0].end), (4, 25));
    }

    #[test]
    fn lower_priority_overlap_is_dropped() {
        let resolved = resolve(vec![
            candidate(EntityKind::Email, 0, 20, DetectionSource::Regex),
            candidate(EntityKind::Person, 10, 40, DetectionSource::Ner),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].kind, EntityKind::Email);
    }

    #[test]
    fn chain_of_overlaps_stays_disjoint() {
        let resolved = resolve(vec![
            candidate(EntityKind::Person, 0, 10, DetectionSource::Ner),
            candidate(EntityKind::Phone, 5, 18, DetectionSource::Regex),
            candidate(EntityKind::Email, 15, 30, DetectionSource::Regex),
            candidate(EntityKind::Location, 29, 35, DetectionSource::Ner),
        ]);
        assert_disjoint_sorted(&resolved);
    }
}
