use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Semantic tag for a detected PII span.
///
/// The closed set covers the built-in detectors; pattern packs may declare
/// additional kinds, which are carried as `Custom`. The string form is
/// SCREAMING_SNAKE and is what appears inside placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Ipv4,
    Ipv6,
    Person,
    Organization,
    Location,
    Custom(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Email => "EMAIL",
            EntityKind::Phone => "PHONE",
            EntityKind::Ssn => "SSN",
            EntityKind::CreditCard => "CREDIT_CARD",
            EntityKind::Ipv4 => "IPV4",
            EntityKind::Ipv6 => "IPV6",
            EntityKind::Person => "PERSON",
            EntityKind::Organization => "ORGANIZATION",
            EntityKind::Location => "LOCATION",
            EntityKind::Custom(name) => name,
        }
    }

    /// Normalize a raw label into the closed kind set.
    ///
    /// NER backends report model-specific tags (`PER`, `ORG`, `GPE`, ...);
    /// these are folded into their canonical kinds at ingress. Unknown
    /// labels become `Custom` in upper-case form.
    pub fn normalize(label: &str) -> EntityKind {
        let upper = label.trim().to_ascii_uppercase();
        match upper.as_str() {
            "EMAIL" => EntityKind::Email,
            "PHONE" => EntityKind::Phone,
            "SSN" => EntityKind::Ssn,
            "CREDIT_CARD" => EntityKind::CreditCard,
            "IPV4" => EntityKind::Ipv4,
            "IPV6" => EntityKind::Ipv6,
            "PERSON" | "PER" => EntityKind::Person,
            "ORGANIZATION" | "ORG" => EntityKind::Organization,
            "LOCATION" | "LOC" | "GPE" => EntityKind::Location,
            _ => EntityKind::Custom(upper),
        }
    }

    /// Resolution priority when spans from different sources overlap.
    /// Structured kinds beat semi-structured kinds beat NER kinds.
    pub fn priority(&self) -> u8 {
        match self {
            EntityKind::Email | EntityKind::Ssn | EntityKind::CreditCard => 10,
            EntityKind::Phone | EntityKind::Ipv4 | EntityKind::Ipv6 => 8,
            EntityKind::Person | EntityKind::Organization | EntityKind::Location => 5,
            EntityKind::Custom(_) => 1,
        }
    }

    /// Whether a user-declared kind name fits the placeholder grammar
    /// (`[A-Z][A-Z0-9_]*`).
    pub fn is_valid_custom_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_uppercase() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Kinds serialize as their flat string form so detections and pack files
// read naturally ("CREDIT_CARD", not a tagged enum).
impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EntityKind::normalize(&s))
    }
}

/// Which detector produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Regex,
    Ner,
}

/// A candidate PII span within one text segment.
///
/// `start`/`end` are byte offsets into the segment the detector was given,
/// `end > start`, and `text` always equals `segment[start..end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub kind: EntityKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub source: DetectionSource,
}

impl Detection {
    pub fn priority(&self) -> u8 {
        self.kind.priority()
    }
}
