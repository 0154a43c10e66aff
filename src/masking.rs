use std::collections::HashMap;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::{DEFAULT_PLACEHOLDER_PREFIX, DEFAULT_PLACEHOLDER_SUFFIX};
use crate::entity::{Detection, EntityKind};
use crate::error::SanitizeError;

/// Placeholder -> original text. Keys are unique; values need not be (two
/// different originals of the same kind produce two different keys).
/// Round-trip correctness depends only on the mapping, not on order.
pub type RehydrationMap = HashMap<String, String>;

/// Hex digits of the content digest embedded in a placeholder.
const PLACEHOLDER_HASH_WIDTH: usize = 8;

/// Deterministic placeholder synthesis and its inverse.
///
/// A placeholder is `PREFIX + KIND + "_" + HASH + SUFFIX` where HASH is
/// the leading hex of a SHA-256 digest of the original text, so the same
/// kind and original yield the same placeholder in any process.
#[derive(Debug, Clone)]
pub struct Masker {
    prefix: String,
    suffix: String,
    key_grammar: Regex,
}

impl Default for Masker {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_PREFIX, DEFAULT_PLACEHOLDER_SUFFIX)
    }
}

impl Masker {
    pub fn new(prefix: &str, suffix: &str) -> Self {
        let key_grammar = Regex::new(&format!(
            "^{}[A-Z][A-Z0-9_]*_[0-9a-f]{{6,8}}{}$",
            regex::escape(prefix),
            regex::escape(suffix)
        ))
        .expect("CRITICAL: placeholder grammar regex is invalid - this should never fail");
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            key_grammar,
        }
    }

    pub fn placeholder(&self, kind: &EntityKind, original: &str) -> String {
        let digest = Sha256::digest(original.as_bytes());
        let hash = &hex::encode(digest)[..PLACEHOLDER_HASH_WIDTH];
        format!("{}{}_{}{}", self.prefix, kind, hash, self.suffix)
    }

    /// Substitute resolved spans (disjoint, sorted by start) in `segment`,
    /// recording every placeholder in `map`. Spans are replaced in
    /// descending start order so earlier offsets remain valid.
    pub fn mask_segment(
        &self,
        segment: &str,
        spans: &[Detection],
        map: &mut RehydrationMap,
    ) -> String {
        let mut masked = segment.to_string();
        for detection in spans.iter().rev() {
            let placeholder = self.placeholder(&detection.kind, &detection.text);
            masked.replace_range(detection.start..detection.end, &placeholder);
            map.insert(placeholder, detection.text.clone());
        }
        masked
    }

    /// Replace every placeholder occurrence with its original.
    ///
    /// Keys are validated against the placeholder grammar first; the
    /// sanitizer configuration that produced the map is not needed.
    /// Replacement runs longest-key-first so no key can shadow another
    /// that it prefixes.
    pub fn rehydrate(&self, masked: &str, map: &RehydrationMap) -> Result<String, SanitizeError> {
        self.validate_map(map)?;

        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut restored = masked.to_string();
        for key in keys {
            if restored.contains(key.as_str()) {
                restored = restored.replace(key.as_str(), &map[key]);
            }
        }
        Ok(restored)
    }

    /// Recover placeholders that a downstream tool has HTML-entity-escaped
    /// (`&lt;&lt;KIND_HASH&gt;&gt;` for the default affixes).
    ///
    /// Only the escaped rendering of a map key is rewritten; every other
    /// byte of `restored`, pre-existing entities included, is left alone.
    pub fn rehydrate_escaped_placeholders(
        &self,
        restored: &str,
        map: &RehydrationMap,
    ) -> String {
        let mut entries: Vec<(String, &str)> = map
            .iter()
            .filter_map(|(key, value)| {
                let escaped = html_escape::encode_text(key.as_str()).into_owned();
                // Affixes without escapable characters render unchanged and
                // were already handled by the plain replacement pass.
                (escaped != key.as_str()).then_some((escaped, value.as_str()))
            })
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut result = restored.to_string();
        for (escaped, original) in entries {
            if result.contains(escaped.as_str()) {
                result = result.replace(escaped.as_str(), original);
            }
        }
        result
    }

    pub fn validate_map(&self, map: &RehydrationMap) -> Result<(), SanitizeError> {
        for key in map.keys() {
            if !self.key_grammar.is_match(key) {
                return Err(SanitizeError::MalformedMap(format!(
                    "key '{key}' does not match the {}KIND_HASH{} placeholder shape",
                    self.prefix, self.suffix
                )));
            }
        }
        Ok(())
    }
}

/// Merge rehydration maps from several sanitize calls (e.g. one session).
/// Identical keys always carry the same original unless affixes were
/// reused across incompatible configurations; the later value wins and the
/// conflict is logged.
pub fn merge_maps<I>(maps: I) -> RehydrationMap
where
    I: IntoIterator<Item = RehydrationMap>,
{
    let mut merged = RehydrationMap::new();
    for map in maps {
        for (key, value) in map {
            if let Some(existing) = merged.get(&key) {
                if existing != &value {
                    warn!(%key, "conflicting rehydration entries, keeping the later value");
                }
            }
            merged.insert(key, value);
        }
    }
    merged
}
