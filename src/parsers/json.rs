use serde_json::Value;

use crate::error::SanitizeError;

/// Parsed JSON tree plus the pointer path of every string leaf, in
/// depth-first order (matching segment order).
pub struct JsonDocument {
    root: Value,
    pointers: Vec<String>,
}

/// Decode `content` and yield every string leaf as an independent segment.
/// Non-string leaves (numbers, booleans, null) and object keys are not
/// masking-eligible.
pub fn parse(content: &str) -> Result<(Vec<String>, JsonDocument), SanitizeError> {
    let root: Value = serde_json::from_str(content)
        .map_err(|e| SanitizeError::invalid_format("json", e.to_string()))?;

    let mut segments = Vec::new();
    let mut pointers = Vec::new();
    collect_strings(&root, String::new(), &mut segments, &mut pointers);

    Ok((segments, JsonDocument { root, pointers }))
}

fn collect_strings(
    value: &Value,
    path: String,
    segments: &mut Vec<String>,
    pointers: &mut Vec<String>,
) {
    match value {
        Value::String(s) => {
            segments.push(s.clone());
            pointers.push(path);
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_strings(item, format!("{path}/{index}"), segments, pointers);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_strings(item, format!("{path}/{}", escape_pointer(key)), segments, pointers);
            }
        }
        _ => {}
    }
}

// JSON pointer escaping (RFC 6901): '~' -> "~0", '/' -> "~1".
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

impl JsonDocument {
    /// Write each masked segment back at its pointer path and re-serialize.
    /// Key order is preserved; whitespace follows compact serialization.
    pub fn reconstruct(mut self, masked_segments: Vec<String>) -> Result<String, SanitizeError> {
        for (pointer, replacement) in self.pointers.iter().zip(masked_segments) {
            if let Some(slot) = self.root.pointer_mut(pointer) {
                *slot = Value::String(replacement);
            }
        }
        serde_json::to_string(&self.root)
            .map_err(|e| SanitizeError::invalid_format("json", e.to_string()))
    }
}
