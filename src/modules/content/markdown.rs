use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pulldown_cmark::{html, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Table-of-contents entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocItem {
    pub id: String,
    pub text: String,
    pub level: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Frontmatter {
    /// `date` as UTC, accepting RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.as_deref()?.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            })
    }
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Anchor ids for headings, unique within one document
#[derive(Default)]
struct AnchorIds {
    seen: HashSet<String>,
}

impl AnchorIds {
    fn next(&mut self, text: &str) -> String {
        let base = anchor_base(text);
        let mut id = base.clone();
        let mut n = 1;
        while self.seen.contains(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        self.seen.insert(id.clone());
        id
    }
}

fn anchor_base(text: &str) -> String {
    let mut id = String::new();
    for c in text.trim().chars() {
        if c.is_whitespace() {
            if !id.ends_with('-') {
                id.push('-');
            }
        } else if c.is_alphanumeric() || c == '-' || c == '_' {
            id.extend(c.to_lowercase());
        }
    }
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        "section".to_string()
    } else {
        id
    }
}

/// Walk the document once, yielding each heading's level, text and anchor
fn collect_headings(markdown: &str) -> Vec<(u8, String, String)> {
    let mut anchors = AnchorIds::default();
    let mut headings = Vec::new();
    let mut current: Option<(u8, Option<String>, String)> = None;

    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(Tag::Heading { level, id, .. }) => {
                current = Some((heading_number(level), id.map(|s| s.to_string()), String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, buf)) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, explicit, text)) = current.take() {
                    let anchor = match explicit {
                        Some(id) => {
                            anchors.seen.insert(id.clone());
                            id
                        }
                        None => anchors.next(&text),
                    };
                    headings.push((level, text.trim().to_string(), anchor));
                }
            }
            _ => {}
        }
    }
    headings
}

/// Render Markdown to HTML; every heading carries the anchor used by the TOC
pub fn render_markdown(markdown: &str) -> String {
    let mut anchors = collect_headings(markdown).into_iter().map(|(_, _, id)| id);
    let mut events: Vec<Event> = Vec::new();
    let mut heading: Option<(HeadingLevel, Vec<Event>)> = None;

    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading = Some((level, Vec::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, inner)) = heading.take() {
                    let n = heading_number(level);
                    let id = anchors.next().unwrap_or_else(|| "section".to_string());
                    let mut inner_html = String::new();
                    html::push_html(&mut inner_html, inner.into_iter());
                    events.push(Event::Html(CowStr::from(format!(
                        "<h{n} id=\"{id}\">{inner_html}</h{n}>\n"
                    ))));
                }
            }
            other => match heading.as_mut() {
                Some((_, inner)) => inner.push(other),
                None => events.push(other),
            },
        }
    }

    let mut output = String::new();
    html::push_html(&mut output, events.into_iter());
    output
}

/// Headings of level 1–3, with the ids `render_markdown` assigns
pub fn extract_toc(markdown: &str) -> Vec<TocItem> {
    collect_headings(markdown)
        .into_iter()
        .filter(|(level, _, _)| *level <= 3)
        .map(|(level, text, id)| TocItem { id, text, level })
        .collect()
}

/// Plain text of a Markdown document, whitespace collapsed, cut at `max_chars`
pub fn plain_excerpt(markdown: &str, max_chars: usize) -> String {
    let mut text = String::new();
    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::TableCell
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote,
            ) => text.push(' '),
            _ => {}
        }
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Split YAML frontmatter (between `---` lines) from the Markdown body
pub fn parse_frontmatter(content: &str) -> Result<(Frontmatter, &str), Box<dyn std::error::Error>> {
    let content = content.trim_start_matches('\u{feff}');
    let Some(rest) = content.strip_prefix("---") else {
        return Ok((Frontmatter::default(), content));
    };

    let end = rest
        .find("\n---")
        .ok_or("No closing frontmatter separator")?;
    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('-').trim_start();

    let frontmatter: Frontmatter = if yaml.trim().is_empty() {
        Frontmatter::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    Ok((frontmatter, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_assigns_heading_ids() {
        let html = render_markdown("# Hello World\n\nText\n\n## Hello World\n");
        assert!(html.contains("<h1 id=\"hello-world\">Hello World</h1>"));
        assert!(html.contains("<h2 id=\"hello-world-1\">Hello World</h2>"));
        assert!(html.contains("<p>Text</p>"));
    }

    #[test]
    fn test_toc_matches_rendered_ids() {
        let md = "# 简介\n\n## Setup `cargo`\n\n#### Deep\n\n### 简介\n";
        let toc = extract_toc(md);
        assert_eq!(
            toc,
            vec![
                TocItem { id: "简介".into(), text: "简介".into(), level: 1 },
                TocItem { id: "setup-cargo".into(), text: "Setup cargo".into(), level: 2 },
                TocItem { id: "简介-1".into(), text: "简介".into(), level: 3 },
            ]
        );

        let html = render_markdown(md);
        for item in &toc {
            assert!(html.contains(&format!("id=\"{}\"", item.id)), "{}", item.id);
        }
        assert!(html.contains("id=\"deep\""));
    }

    #[test]
    fn test_symbol_only_heading_gets_fallback_id() {
        let toc = extract_toc("## +++\n\n## !!!\n");
        assert_eq!(toc[0].id, "section");
        assert_eq!(toc[1].id, "section-1");
    }

    #[test]
    fn test_tables_and_strikethrough() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn test_plain_excerpt() {
        let md = "# Title\n\nSome **bold** text and `code`.\n\n- item";
        assert_eq!(plain_excerpt(md, 200), "Title Some bold text and code. item");
        assert_eq!(plain_excerpt("abcdef", 3), "abc...");
        assert_eq!(plain_excerpt("你好世界", 2), "你好...");
    }

    #[test]
    fn test_parse_frontmatter() {
        let content = r#"---
title: Test Post
date: 2024-01-08
tags: [rust, web]
draft: true
---

# Hello World

This is a test post."#;

        let (fm, body) = parse_frontmatter(content).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Test Post"));
        assert_eq!(fm.tags, Some(vec!["rust".to_string(), "web".to_string()]));
        assert_eq!(fm.draft, Some(true));
        assert_eq!(
            fm.parsed_date().unwrap().format("%Y-%m-%d").to_string(),
            "2024-01-08"
        );
        assert!(body.starts_with("# Hello World"));
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let (fm, body) = parse_frontmatter("# Hello\n\ntext").unwrap();
        assert!(fm.title.is_none());
        assert_eq!(body, "# Hello\n\ntext");
    }

    #[test]
    fn test_unclosed_frontmatter_is_an_error() {
        assert!(parse_frontmatter("---\ntitle: x\n\nbody").is_err());
    }
}
