use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::error::SanitizeError;

/// Bytes of surrounding text inspected for context keywords when a pattern
/// does not set its own window.
pub const DEFAULT_CONTEXT_WINDOW: usize = 50;

lazy_static! {
    // Compiled regex patterns for performance
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b")
            .expect("CRITICAL: Email regex pattern is invalid - this should never fail");
    static ref PHONE_PATTERN: Regex =
        Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")
            .expect("CRITICAL: Phone regex pattern is invalid - this should never fail");
    static ref SSN_PATTERN: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b")
        .expect("CRITICAL: SSN regex pattern is invalid - this should never fail");
    static ref CREDIT_CARD_PATTERN: Regex =
        Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b|\b3[47]\d{2}[-\s]?\d{6}[-\s]?\d{5}\b")
            .expect("CRITICAL: Credit card regex pattern is invalid - this should never fail");
    static ref IPV4_PATTERN: Regex = Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b"
    )
    .expect("CRITICAL: IPv4 regex pattern is invalid - this should never fail");
    static ref IPV6_PATTERN: Regex = Regex::new(
        r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b|\b(?:[0-9a-fA-F]{1,4}:){1,6}:[0-9a-fA-F]{1,4}\b"
    )
    .expect("CRITICAL: IPv6 regex pattern is invalid - this should never fail");
}

/// Post-match validation applied before a regex match may be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validator {
    /// Strip non-digits, require 13-19 digits, Luhn checksum 0 mod 10.
    Luhn,
}

impl Validator {
    pub fn accepts(&self, matched: &str) -> bool {
        match self {
            Validator::Luhn => luhn_valid(matched),
        }
    }

    fn from_name(name: &str) -> Option<Validator> {
        match name.to_ascii_lowercase().as_str() {
            "luhn" => Some(Validator::Luhn),
            _ => None,
        }
    }
}

/// Luhn checksum over the digits of `number`, ignoring separators.
fn luhn_valid(number: &str) -> bool {
    let digits: Vec<u32> = number
        .chars()
        .filter(|c| c.is_ascii_digit())
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }

    let mut sum = 0;
    let mut alternate = false;

    for digit in digits.iter().rev() {
        let mut d = *digit;
        if alternate {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        alternate = !alternate;
    }

    sum % 10 == 0
}

/// A single named detection pattern: regex plus optional validator and
/// context-keyword gate.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub kind: EntityKind,
    pub regex: Regex,
    pub validator: Option<Validator>,
    /// Lower-cased keywords; at least one must occur near the match for it
    /// to be emitted. `None` means unconditional emit.
    pub context_keywords: Option<Vec<String>>,
    pub window: usize,
}

impl Pattern {
    fn new(kind: EntityKind, regex: Regex) -> Self {
        Self {
            kind,
            regex,
            validator: None,
            context_keywords: None,
            window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Context-keyword gate for a match at `[start, end)` in `segment`.
    /// The inspected region is `window` bytes on each side, clamped to
    /// char boundaries; matching is case-insensitive.
    pub fn context_matches(&self, segment: &str, start: usize, end: usize) -> bool {
        let keywords = match &self.context_keywords {
            Some(keywords) => keywords,
            None => return true,
        };

        let lo = floor_char_boundary(segment, start.saturating_sub(self.window));
        let hi = ceil_char_boundary(segment, (end + self.window).min(segment.len()));
        let context = segment[lo..hi].to_lowercase();

        keywords.iter().any(|k| context.contains(k.as_str()))
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// One pattern entry inside a pack file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub regex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,
}

impl PatternSpec {
    fn compile(&self, pack_name: &str) -> Result<Pattern, SanitizeError> {
        let kind = EntityKind::normalize(&self.name);
        if let EntityKind::Custom(name) = &kind {
            if !EntityKind::is_valid_custom_name(name) {
                return Err(SanitizeError::InvalidConfig(format!(
                    "pattern pack '{}': kind name '{}' does not fit the placeholder grammar [A-Z][A-Z0-9_]*",
                    pack_name, self.name
                )));
            }
        }

        let regex = Regex::new(&self.regex).map_err(|e| {
            SanitizeError::InvalidConfig(format!(
                "pattern pack '{}': bad regex for '{}': {}",
                pack_name, self.name, e
            ))
        })?;

        let validator = match &self.validator {
            Some(name) => Some(Validator::from_name(name).ok_or_else(|| {
                SanitizeError::InvalidConfig(format!(
                    "pattern pack '{}': unknown validator '{}' for '{}'",
                    pack_name, name, self.name
                ))
            })?),
            None => None,
        };

        let context_keywords = self
            .context_keywords
            .as_ref()
            .map(|ks| ks.iter().map(|k| k.to_lowercase()).collect::<Vec<_>>());

        Ok(Pattern {
            kind,
            regex,
            validator,
            context_keywords,
            window: self.window.unwrap_or(DEFAULT_CONTEXT_WINDOW),
        })
    }
}

/// A declarative bundle of detection patterns, typically loaded from TOML.
///
/// Packs compose in declaration order: a later definition with the same
/// kind name replaces the earlier one (built-ins included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternPack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

impl PatternPack {
    pub fn from_toml_str(raw: &str) -> Result<Self, SanitizeError> {
        toml::from_str(raw)
            .map_err(|e| SanitizeError::InvalidConfig(format!("malformed pattern pack: {e}")))
    }
}

/// The ordered set of compiled patterns the regex detector runs.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<Pattern>,
}

impl PatternRegistry {
    /// Built-in patterns only.
    pub fn builtin() -> Self {
        Self {
            patterns: vec![
                Pattern::new(EntityKind::Email, EMAIL_PATTERN.clone()),
                Pattern::new(EntityKind::Phone, PHONE_PATTERN.clone()),
                Pattern::new(EntityKind::Ssn, SSN_PATTERN.clone()),
                Pattern::new(EntityKind::CreditCard, CREDIT_CARD_PATTERN.clone())
                    .with_validator(Validator::Luhn),
                Pattern::new(EntityKind::Ipv4, IPV4_PATTERN.clone()),
                Pattern::new(EntityKind::Ipv6, IPV6_PATTERN.clone()),
            ],
        }
    }

    /// Built-ins composed with `packs` in declaration order.
    pub fn with_packs(packs: &[PatternPack]) -> Result<Self, SanitizeError> {
        let mut registry = Self::builtin();
        for pack in packs {
            for spec in &pack.patterns {
                let pattern = spec.compile(&pack.name)?;
                match registry.patterns.iter().position(|p| p.kind == pattern.kind) {
                    Some(index) => registry.patterns[index] = pattern,
                    None => registry.patterns.push(pattern),
                }
            }
        }
        Ok(registry)
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}
