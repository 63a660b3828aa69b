//! Built-in page shell.
//!
//! A deliberately small HTML frame around the rendered article. Template
//! engines plug in by registering a write-stage plugin at an earlier
//! priority and marking documents as written; this shell is the fallback
//! that keeps the engine usable with zero templates.

use core_model::{Document, Feed};

/// Source text of the shell. Hashed as the templates hash, so editing the
/// shell invalidates every cached document record.
pub const PAGE_SHELL: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<main>
<article>
<h1>{title}</h1>
{article}
</article>
</main>
</body>
</html>
"#;

/// Render one document into the shell.
pub fn render_page(site_title: &str, doc: &Document, article_html: &str) -> String {
    let title = match (doc.title.as_deref(), site_title) {
        (Some(t), "") => t.to_string(),
        (Some(t), site) => format!("{t} — {site}"),
        (None, site) => site.to_string(),
    };
    PAGE_SHELL
        .replacen("{title}", &escape(&title), 1)
        .replacen("{title}", &escape(doc.title.as_deref().unwrap_or(&title)), 1)
        .replace("{article}", article_html)
}

/// Render a feed listing page.
pub fn render_feed_page(site_title: &str, feed: &Feed) -> String {
    let mut items = String::new();
    for doc in &feed.posts {
        let title = doc.title.as_deref().unwrap_or(&doc.slug);
        items.push_str(&format!(
            "<li><a href=\"{}\">{}</a>{}</li>\n",
            doc.href,
            escape(title),
            doc.date
                .as_deref()
                .map(|d| format!(" <time>{}</time>", escape(d)))
                .unwrap_or_default(),
        ));
    }
    let listing = format!("<ul class=\"feed\">\n{items}</ul>");
    let title = if site_title.is_empty() {
        feed.title.clone()
    } else {
        format!("{} — {}", feed.title, site_title)
    };
    PAGE_SHELL
        .replacen("{title}", &escape(&title), 1)
        .replacen("{title}", &escape(&feed.title), 1)
        .replace("{article}", &listing)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
