use crate::error::SanitizeError;

/// Original HTML source plus the byte range of every extracted text node
/// (whitespace-trimmed), in document order.
///
/// Reconstruction splices sanitized text back into the source at those
/// ranges, so markup, attribute values, entities, and the whitespace
/// stripped during extraction all survive untouched.
pub struct HtmlDocument {
    source: String,
    spans: Vec<(usize, usize)>,
}

/// Raw-text elements whose content runs to the matching close tag without
/// nested markup.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Tokenize `content` at tag boundaries and yield each non-empty text node
/// as a segment. Attribute values are not masking-eligible.
///
/// Inputs whose structure cannot be reconstructed faithfully (unterminated
/// tag, comment, or raw-text element) are refused.
pub fn parse(content: &str) -> Result<(Vec<String>, HtmlDocument), SanitizeError> {
    let bytes = content.as_bytes();
    let mut segments = Vec::new();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if is_markup_start(bytes, i) {
            if content[i..].starts_with("<!--") {
                match content[i + 4..].find("-->") {
                    Some(rel) => i += 4 + rel + 3,
                    None => {
                        return Err(SanitizeError::invalid_format("html", "unterminated comment"))
                    }
                }
            } else if content[i..].starts_with("<!") || content[i..].starts_with("<?") {
                match content[i..].find('>') {
                    Some(rel) => i += rel + 1,
                    None => {
                        return Err(SanitizeError::invalid_format(
                            "html",
                            "unterminated declaration",
                        ))
                    }
                }
            } else {
                let tag = scan_tag(content, i)?;
                i = tag.end;
                if !tag.closing && !tag.self_closing {
                    if let Some(name) = RAW_TEXT_ELEMENTS
                        .iter()
                        .find(|n| tag.name.eq_ignore_ascii_case(n))
                    {
                        let close = format!("</{name}");
                        let rel = find_ascii_ci(&bytes[i..], close.as_bytes()).ok_or_else(|| {
                            SanitizeError::invalid_format(
                                "html",
                                format!("unterminated <{name}> element"),
                            )
                        })?;
                        push_text_node(content, i, i + rel, &mut segments, &mut spans);
                        i += rel;
                    }
                }
            }
        } else {
            // Text node: run until the next markup start. A lone '<' that
            // does not open markup is ordinary text.
            let start = i;
            let mut j = i + 1;
            while j < bytes.len() && !is_markup_start(bytes, j) {
                j += 1;
            }
            push_text_node(content, start, j, &mut segments, &mut spans);
            i = j;
        }
    }

    Ok((
        segments,
        HtmlDocument {
            source: content.to_string(),
            spans,
        },
    ))
}

fn is_markup_start(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'<'
        && matches!(
            bytes.get(i + 1),
            Some(c) if c.is_ascii_alphabetic() || *c == b'/' || *c == b'!' || *c == b'?'
        )
}

struct Tag {
    /// Byte offset just past the closing `>`.
    end: usize,
    name: String,
    closing: bool,
    self_closing: bool,
}

/// Scan a tag starting at the `<` at `start`, honoring quoted attribute
/// values (a `>` inside quotes does not close the tag).
fn scan_tag(content: &str, start: usize) -> Result<Tag, SanitizeError> {
    let bytes = content.as_bytes();
    let mut j = start + 1;
    let closing = bytes.get(j) == Some(&b'/');
    if closing {
        j += 1;
    }

    let name_start = j;
    while j < bytes.len() && bytes[j].is_ascii_alphanumeric() {
        j += 1;
    }
    let name = content[name_start..j].to_string();

    let mut quote: Option<u8> = None;
    while j < bytes.len() {
        let b = bytes[j];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    let self_closing = bytes[start + 1..j].ends_with(b"/");
                    return Ok(Tag {
                        end: j + 1,
                        name,
                        closing,
                        self_closing,
                    });
                }
                _ => {}
            },
        }
        j += 1;
    }

    Err(SanitizeError::invalid_format("html", "unterminated tag"))
}

/// Case-insensitive (ASCII) byte search.
fn find_ascii_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Record the trimmed, non-empty part of `content[start..end]` as a text
/// node. The trimmed-off whitespace stays in the source and is restored by
/// the splice, not the segment.
fn push_text_node(
    content: &str,
    start: usize,
    end: usize,
    segments: &mut Vec<String>,
    spans: &mut Vec<(usize, usize)>,
) {
    let slice = &content[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing >= slice.len() {
        return; // whitespace-only
    }
    let s = start + leading;
    let e = end - trailing;
    segments.push(content[s..e].to_string());
    spans.push((s, e));
}

impl HtmlDocument {
    /// Splice masked segments back at their recorded ranges, highest
    /// offset first so earlier ranges stay valid.
    pub fn reconstruct(self, masked_segments: Vec<String>) -> String {
        let mut result = self.source;
        for ((start, end), replacement) in self.spans.iter().zip(masked_segments.iter()).rev() {
            result.replace_range(*start..*end, replacement);
        }
        result
    }
}
