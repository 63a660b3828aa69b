//! Front-matter fence splitting.
//!
//! Documents open with a `+++` fence, TOML metadata, and a closing `+++`.
//! The splitter returns the verbatim text between the fences plus the body;
//! it never parses the metadata itself, so the raw text can feed the input
//! hash before any deserialization happens.

/// Fence line delimiting TOML front-matter.
pub const FRONTMATTER_FENCE: &str = "+++";

/// Split `text` into `(raw_frontmatter, body)`.
///
/// The front-matter is the verbatim text between an opening fence on the
/// first line and the next closing fence line (both excluded). Files without
/// a leading fence, or with an unterminated fence, yield an empty
/// front-matter and the full text as body.
pub fn split_frontmatter(text: &str) -> (&str, &str) {
    let rest = match text.strip_prefix(FRONTMATTER_FENCE) {
        Some(r) => r,
        None => return ("", text),
    };
    // The fence must occupy the whole first line.
    let rest = match rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) {
        Some(r) => r,
        None => return ("", text),
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FRONTMATTER_FENCE {
            let raw = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (raw, body);
        }
        offset += line.len();
    }
    ("", text)
}
