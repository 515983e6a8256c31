//! Path template tokens such as `[node:nid]` or `[date:custom:Y-m]`.

use chrono::{DateTime, Datelike, Timelike, Utc};
use curator_core::models::{Media, Node, Term};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\s\[\]:]+):([^\[\]]+)\]").expect("token pattern is valid")
});

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Entities available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    pub node: Option<&'a Node>,
    pub media: Option<&'a Media>,
    pub term: Option<&'a Term>,
    pub now: DateTime<Utc>,
}

impl<'a> TokenContext<'a> {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            node: None,
            media: None,
            term: None,
            now,
        }
    }

    pub fn with_node(mut self, node: &'a Node) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_media(mut self, media: &'a Media) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_term(mut self, term: &'a Term) -> Self {
        self.term = Some(term);
        self
    }

    fn resolve(&self, group: &str, name: &str) -> Option<String> {
        match (group, name) {
            ("node", "nid") => self.node.map(|n| n.id.to_string()),
            ("node", "title") => self.node.map(|n| n.title.clone()),
            ("node", "type") => self.node.map(|n| n.node_type.clone()),
            ("media", "mid") => self.media.map(|m| m.id.to_string()),
            ("media", "name") => self.media.map(|m| m.name.clone()),
            ("media", "bundle") => self.media.map(|m| m.media_type.clone()),
            ("term", "tid") => self.term.map(|t| t.id.to_string()),
            ("term", "name") => self.term.map(|t| t.name.clone()),
            ("date", rest) => rest
                .strip_prefix("custom:")
                .map(|format| format_date(&self.now, format)),
            _ => None,
        }
    }
}

/// Replaces every known token in `template`. Unknown tokens, and tokens whose
/// entity is absent from the context, are left as written.
pub fn expand_tokens(template: &str, context: &TokenContext<'_>) -> String {
    TOKEN_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            context
                .resolve(&caps[1], &caps[2])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Formats `now` with PHP-style date characters. Unsupported characters are
/// copied through; `\` escapes the next character.
fn format_date(now: &DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        match c {
            'Y' => out.push_str(&format!("{:04}", now.year())),
            'y' => out.push_str(&format!("{:02}", now.year() % 100)),
            'm' => out.push_str(&format!("{:02}", now.month())),
            'n' => out.push_str(&now.month().to_string()),
            'd' => out.push_str(&format!("{:02}", now.day())),
            'j' => out.push_str(&now.day().to_string()),
            'H' => out.push_str(&format!("{:02}", now.hour())),
            'i' => out.push_str(&format!("{:02}", now.minute())),
            's' => out.push_str(&format!("{:02}", now.second())),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use curator_core::models::FileReference;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    fn node() -> Node {
        Node {
            id: 42,
            node_type: "page".to_string(),
            title: "Letter".to_string(),
            member_of: None,
            model: None,
            owner_id: 1,
            published: true,
        }
    }

    #[test]
    fn test_default_derivative_path() {
        let node = node();
        let ctx = TokenContext::new(now()).with_node(&node);
        assert_eq!(
            expand_tokens("[date:custom:Y]-[date:custom:m]/[node:nid].bin", &ctx),
            "2024-03/42.bin"
        );
    }

    #[test]
    fn test_date_characters() {
        let ctx = TokenContext::new(now());
        assert_eq!(
            expand_tokens("[date:custom:y/n/j H:i:s]", &ctx),
            "24/3/7 09:05:02"
        );
        assert_eq!(
            expand_tokens("[date:custom:y.n.j-H\\hi]", &ctx),
            "24.3.7-09h05"
        );
    }

    #[test]
    fn test_media_and_term_tokens() {
        let media = Media {
            id: 8,
            media_type: "image".to_string(),
            name: "scan".to_string(),
            media_of: Some(42),
            usage: vec![],
            owner_id: 1,
            published: true,
            source_field: "field_media_image".to_string(),
            source: FileReference::new(3),
        };
        let term = Term {
            id: 11,
            vocabulary: "islandora_media_use".to_string(),
            name: "Service File".to_string(),
            external_uri: None,
        };
        let ctx = TokenContext::new(now()).with_media(&media).with_term(&term);
        assert_eq!(
            expand_tokens("[media:bundle]/[media:mid]-[media:name]-[term:tid]", &ctx),
            "image/8-scan-11"
        );
        assert_eq!(expand_tokens("[term:name]", &ctx), "Service File");
    }

    #[test]
    fn test_unknown_tokens_are_left_intact() {
        let ctx = TokenContext::new(now());
        assert_eq!(
            expand_tokens("[node:nid]/[site:name]/[node:bogus]", &ctx),
            "[node:nid]/[site:name]/[node:bogus]"
        );
    }
}
