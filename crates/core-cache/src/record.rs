//! Per-document and per-feed cache records.

use serde::{Deserialize, Serialize};

/// Everything the cache remembers about one document, keyed by path.
///
/// `input_hash` was computed from the exact `(content, raw_frontmatter,
/// template)` triple that produced the cached artifacts; any field here is
/// only meaningful while that holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub input_hash: String,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    /// Hash of the markdown body alone; keys the rendered-article side-car.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_html_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_html_path: Option<String>,
    /// Filesystem mtime in nanoseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Cached outbound link targets extracted from the rendered article.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_hrefs_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_hrefs: Vec<String>,
    /// Hash of the sorted slugs of this document's feed co-members. A change
    /// means the document's sidebar changed even though its content did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_membership_hash: Option<String>,
    // Transform sub-caches: each hash records the input state that produced
    // the paired output; a mismatch means re-run the transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeds_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeds_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_avatars_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_avatars_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_html_path: Option<String>,
    // Semantic hashes distinguishing feed-only and tag-only changes from
    // full-document changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_item_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_index_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garden_hash: Option<String>,
}

/// Per-feed cache entry, keyed by feed slug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// Membership hash over the feed's member slugs at last build.
    #[serde(default)]
    pub membership_hash: String,
    #[serde(default)]
    pub output_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
}

/// Which transform a sub-cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Embeds,
    Glossary,
    LinkAvatars,
    Encrypted,
}

impl TransformKind {
    pub fn name(self) -> &'static str {
        match self {
            TransformKind::Embeds => "embeds",
            TransformKind::Glossary => "glossary",
            TransformKind::LinkAvatars => "link_avatars",
            TransformKind::Encrypted => "encrypted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_omits_empty_optionals() {
        let record = PostRecord {
            input_hash: "abc".into(),
            template: "post.html".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("input_hash"));
        assert!(!json.contains("content_hash"), "got: {json}");
        assert!(!json.contains("link_hrefs"), "got: {json}");
    }

    #[test]
    fn record_round_trips() {
        let record = PostRecord {
            input_hash: "ih".into(),
            slug: Some("a".into()),
            link_hrefs: vec!["b".into()],
            mod_time: Some(1_700_000_000_000_000_000),
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: PostRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
