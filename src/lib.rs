//! textmask: deterministic PII masking and rehydration.
//!
//! The pipeline detects PII with composable regex patterns and an optional
//! NER model, replaces each occurrence with a content-addressed
//! `<<KIND_HASH>>` placeholder, and returns a rehydration map that restores
//! the original byte-for-byte. JSON and HTML inputs are parsed so only
//! their text content is masked and the surrounding structure survives
//! reconstruction.
//!
//! ```no_run
//! use textmask::{sanitize, rehydrate, Format, SanitizerConfig};
//!
//! let config = SanitizerConfig { enable_ner: false, ..Default::default() };
//! let result = sanitize("Mail me at jane@example.com", Format::Text, config)?;
//! assert!(result.sanitized.contains("<<EMAIL_"));
//! let original = rehydrate(&result.sanitized, &result.map, Format::Text)?;
//! assert_eq!(original, "Mail me at jane@example.com");
//! # Ok::<(), textmask::SanitizeError>(())
//! ```

pub mod config;
pub mod detectors;
pub mod entity;
pub mod error;
pub mod masking;
pub mod parsers;
pub mod patterns;
pub mod pipeline;
pub mod resolver;
pub mod whitelist;

// Re-export commonly used types
pub use config::SanitizerConfig;
pub use detectors::{NerDetector, NerTagger, RegexDetector, TaggedSpan};
pub use entity::{Detection, DetectionSource, EntityKind};
pub use error::SanitizeError;
pub use masking::{merge_maps, Masker, RehydrationMap};
pub use parsers::Format;
pub use patterns::{PatternPack, PatternRegistry, Validator};
pub use pipeline::{rehydrate, sanitize, SanitizeResult, Sanitizer};
