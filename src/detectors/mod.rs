//! Detection layer: heterogeneous detectors emitting a uniform candidate
//! stream. The conflict resolver downstream is agnostic to which
//! implementations produced a candidate.

pub mod candle;
pub mod ner;
pub mod regex;

pub use self::ner::{NerDetector, NerTagger, TaggedSpan};
pub use self::regex::RegexDetector;
