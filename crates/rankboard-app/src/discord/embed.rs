// Leaderboard page embeds.

use chrono::{DateTime, Utc};
use rankboard_core::reconcile::RenderedPage;
use serde_json::{json, Value};

pub const EMBED_COLOR: u32 = 0x2b2d31;

/// Static decoration shared by every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedStyle {
    pub title: String,
    pub footer_label: String,
}

impl EmbedStyle {
    pub fn new(title: impl Into<String>, footer_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            footer_label: footer_label.into(),
        }
    }

    pub fn footer(&self, page: &RenderedPage) -> String {
        format!("{} — Page {}/{}", self.footer_label, page.number, page.total)
    }

    /// Embed object for one page.
    pub fn embed(&self, page: &RenderedPage, at: DateTime<Utc>) -> Value {
        json!({
            "title": self.title,
            "description": page.body,
            "color": EMBED_COLOR,
            "footer": { "text": self.footer(page) },
            "timestamp": at.to_rfc3339(),
        })
    }

    /// Full message body for creating or editing a page. The empty content
    /// clears any text left on a message from older versions.
    pub fn message(&self, page: &RenderedPage, at: DateTime<Utc>) -> Value {
        json!({
            "content": "",
            "embeds": [self.embed(page, at)],
        })
    }
}
