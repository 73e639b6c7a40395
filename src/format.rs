//! Turns a bot reply into bullet, heading and text lines for display.
//!
//! The model is told to answer in plain `- ` bullets, but it still slips in
//! markdown now and then; that is stripped here.
use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    Bullet(String),
    Heading(String),
    Text(String),
}

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]|\d+[.)])(?:\s+(.*))?$").unwrap());
static HEADING_MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s*").unwrap());

/// Remove markdown emphasis markers and stray asterisks.
fn strip_markdown(text: &str) -> String {
    text.replace("**", "")
        .replace("__", "")
        .replace('*', "")
        .trim()
        .to_string()
}

#[must_use]
pub fn format_reply(text: &str) -> Vec<ReplyLine> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = BULLET_RE.captures(line) {
            let body = strip_markdown(caps.get(1).map_or("", |m| m.as_str()));
            if !body.is_empty() {
                lines.push(ReplyLine::Bullet(body));
            }
            continue;
        }

        let had_heading_mark = HEADING_MARK_RE.is_match(line);
        let cleaned = strip_markdown(&HEADING_MARK_RE.replace(line, ""));
        if cleaned.is_empty() {
            continue;
        }
        if had_heading_mark || cleaned.ends_with(':') {
            lines.push(ReplyLine::Heading(cleaned));
        } else {
            lines.push(ReplyLine::Text(cleaned));
        }
    }

    lines
}

/// Plain-text rendering for a terminal.
#[must_use]
pub fn render_plain(lines: &[ReplyLine]) -> String {
    let mut out = String::new();
    for line in lines {
        match line {
            ReplyLine::Bullet(s) => {
                out.push_str("  • ");
                out.push_str(s);
            }
            ReplyLine::Heading(s) => {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(s);
            }
            ReplyLine::Text(s) => out.push_str(s),
        }
        out.push('\n');
    }
    out
}
