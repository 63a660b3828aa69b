//! Feeds: named ordered projections of the document set.

use serde::{Deserialize, Serialize};

use crate::Document;

/// An ordered projection of documents, e.g. `tag:go` or `author:alice`.
/// Produced at the collect stage, consumed at the write stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    /// Stable feed identifier (`tag:<slug>`, `author:<slug>`, custom).
    pub name: String,
    /// Human-readable title for listing pages.
    pub title: String,
    /// Output path relative to the site root.
    pub output_path: String,
    /// Member documents in feed order (snapshot taken at collect time).
    pub posts: Vec<Document>,
}

impl Feed {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            output_path: output_path.into(),
            posts: Vec::new(),
        }
    }

    /// Member slugs in feed order.
    pub fn member_slugs(&self) -> Vec<String> {
        self.posts.iter().map(|p| p.slug.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_slugs_preserve_feed_order() {
        let mut feed = Feed::new("tag:go", "go", "tags/go/index.html");
        for slug in ["b", "a", "c"] {
            feed.posts.push(Document {
                slug: slug.into(),
                ..Default::default()
            });
        }
        assert_eq!(feed.member_slugs(), vec!["b", "a", "c"]);
    }
}
