//! Content format conversion and HTML sanitization
//!
//! Converts request bodies between TEXT, MARKDOWN and HTML. The Markdown
//! side covers the CommonMark constructs people actually put in posts:
//! headings, emphasis, strikethrough, inline and fenced code, links, images,
//! blockquotes, lists, paragraphs and hard breaks.
//!
//! Everything here is pure: no I/O, no shared state.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ValidationError;
use crate::types::BodyFormat;

/// Tags that survive sanitization
pub const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "del", "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "i", "img", "li", "ol", "p", "pre", "s", "span", "strong", "tg-spoiler", "u", "ul",
];

/// Attributes that survive sanitization on allowed tags
pub const ALLOWED_ATTRIBUTES: &[&str] = &["href", "src", "alt", "title", "class"];

/// Elements removed together with their contents
const DANGEROUS_ELEMENTS: &[&str] = &["script", "style", "iframe", "object", "embed"];

const UNSAFE_URL_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:"];

// Break markers used while flattening HTML. They never appear in real text.
const LINE_BREAK: char = '\u{2}';
const BLOCK_BREAK: char = '\u{3}';
const ROW_BREAK: char = '\u{4}';

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static DANGEROUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DANGEROUS_ELEMENTS
        .iter()
        .map(|name| {
            Regex::new(&format!(r"(?is)<{name}\b[^>]*>.*?</{name}\s*>")).expect("valid regex")
        })
        .collect()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("valid regex")
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
    )
    .expect("valid regex")
});
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\n]+").expect("valid regex"));
static MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ ]*[\x02\x03\x04][ \x02\x03\x04]*").expect("valid regex")
});
static PRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<pre\b[^>]*>(.*?)</pre\s*>").expect("valid regex")
});
static CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<code\b[^>]*>(.*?)</code\s*>").expect("valid regex")
});
static BR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static HR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<hr\b[^>]*>").expect("valid regex"));
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|h[1-6]|blockquote|ul|ol|table)\s*>").expect("valid regex")
});
static BLOCK_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:p|h[1-6]|blockquote|ul|ol|table)\b[^>]*>").expect("valid regex")
});
static ROW_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:li|div|tr)\s*>").expect("valid regex")
});
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid regex")
});
static STRONG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:strong|b)\b[^>]*>(.*?)</(?:strong|b)\s*>").expect("valid regex")
});
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:em|i)\b[^>]*>(.*?)</(?:em|i)\s*>").expect("valid regex")
});
static STRIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:del|s|strike)\b[^>]*>(.*?)</(?:del|s|strike)\s*>").expect("valid regex")
});
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid regex")
});
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b([^>]*)>").expect("valid regex"));
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<blockquote\b[^>]*>(.*?)</blockquote\s*>").expect("valid regex")
});
static LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(ul|ol)\b[^>]*>(.*?)</(?:ul|ol)\s*>").expect("valid regex")
});
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<li\b[^>]*>(.*?)(?:</li\s*>|$)").expect("valid regex")
});

// Markdown side
static MD_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?[ \t#]*$").expect("valid regex")
});
static MD_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:\*[ \t]*){3,}|(?:-[ \t]*){3,}|(?:_[ \t]*){3,})$").expect("valid regex")
});
static MD_BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}[-*+][ \t]+(.*)$").expect("valid regex"));
static MD_ORDERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}[0-9]{1,9}[.)][ \t]+(.*)$").expect("valid regex")
});
static MD_CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
static MD_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex")
});
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex")
});
static MD_STRONG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*]+?)\*\*|__([^_]+?)__").expect("valid regex")
});
static MD_STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^~]+?)~~").expect("valid regex"));
static MD_EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*([^*\s](?:[^*]*[^*\s])?)\*|\b_([^_]+)_\b").expect("valid regex")
});

/// Converter carrying the content configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentConverter {
    strip_all_html: bool,
}

impl ContentConverter {
    pub fn new(strip_all_html: bool) -> Self {
        Self { strip_all_html }
    }

    /// Whether HTML output is reduced to plain text
    pub fn strips_all_html(&self) -> bool {
        self.strip_all_html
    }

    pub fn convert(
        &self,
        text: &str,
        from: BodyFormat,
        to: BodyFormat,
    ) -> Result<String, ValidationError> {
        convert(text, from, to)
    }

    /// Sanitize HTML, or strip it to plain text when configured to
    pub fn sanitize_html(&self, html: &str) -> String {
        if self.strip_all_html {
            html_to_text(html)
        } else {
            sanitize_html(html)
        }
    }

    /// Convert and, for HTML targets, sanitize the result
    pub fn render(
        &self,
        text: &str,
        from: BodyFormat,
        to: BodyFormat,
    ) -> Result<String, ValidationError> {
        let converted = convert(text, from, to)?;
        match to {
            BodyFormat::Html => Ok(self.sanitize_html(&converted)),
            _ => Ok(converted),
        }
    }
}

/// Convert `text` from one body format to another
///
/// # Errors
///
/// Returns `ValidationError::ConversionUnavailable` for a path with no
/// converter rather than passing the text through untouched.
pub fn convert(text: &str, from: BodyFormat, to: BodyFormat) -> Result<String, ValidationError> {
    use BodyFormat::*;

    match (from, to) {
        (from, to) if from == to => Ok(text.to_string()),
        (Text, Markdown) => Ok(text.to_string()),
        (Text, Html) => Ok(text_to_html(text)),
        (Markdown, Html) => Ok(markdown_to_html(text)),
        (Markdown, Text) => Ok(html_to_text(&markdown_to_html(text))),
        (Html, Markdown) => Ok(html_to_markdown(text)),
        (Html, Text) => Ok(html_to_text(text)),
        (from, to) => Err(ValidationError::ConversionUnavailable { from, to }),
    }
}

/// Escape HTML special characters
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape plain text and turn newlines into `<br>`
pub fn text_to_html(text: &str) -> String {
    escape_html(&text.replace("\r\n", "\n")).replace('\n', "<br>")
}

/// Decode named and numeric character references
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Strip disallowed tags and attributes, keeping the allow-listed set
///
/// Script-like elements are removed with their contents. Event handler
/// attributes never survive because only `ALLOWED_ATTRIBUTES` are kept, and
/// URLs with executable schemes are dropped.
pub fn sanitize_html(html: &str) -> String {
    let cleaned = remove_dangerous(html);
    TAG.replace_all(&cleaned, |caps: &Captures| {
        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }
        if &caps[1] == "/" {
            return format!("</{name}>");
        }

        let raw_attrs = &caps[3];
        let mut tag = format!("<{name}");
        for attr in ATTRIBUTE.captures_iter(raw_attrs) {
            let attr_name = attr[1].to_ascii_lowercase();
            let Some(value) = attr.get(2).or(attr.get(3)).or(attr.get(4)) else {
                continue;
            };
            if !ALLOWED_ATTRIBUTES.contains(&attr_name.as_str()) || !is_safe_value(value.as_str()) {
                continue;
            }
            tag.push_str(&format!(" {}=\"{}\"", attr_name, value.as_str().replace('"', "&quot;")));
        }
        if raw_attrs.trim_end().ends_with('/') {
            tag.push_str(" /");
        }
        tag.push('>');
        tag
    })
    .into_owned()
}

/// Reduce HTML to plain text, keeping line structure
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_dangerous(&html.replace("\r\n", "\n"));

    let mut preformatted = Vec::new();
    text = PRE
        .replace_all(&text, |caps: &Captures| {
            preformatted.push(decode_entities(&TAG.replace_all(&caps[1], "")));
            format!("{BLOCK_BREAK}\u{0}{}\u{0}{BLOCK_BREAK}", preformatted.len() - 1)
        })
        .into_owned();

    text = WHITESPACE.replace_all(&text, " ").into_owned();
    text = BR.replace_all(&text, LINE_BREAK.to_string()).into_owned();
    text = HR.replace_all(&text, BLOCK_BREAK.to_string()).into_owned();
    text = BLOCK_END.replace_all(&text, BLOCK_BREAK.to_string()).into_owned();
    text = ROW_END.replace_all(&text, ROW_BREAK.to_string()).into_owned();
    text = TAG.replace_all(&text, "").into_owned();
    text = decode_entities(&text);
    text = collapse_markers(&text, "\n");
    text = restore_placeholders(&text, &preformatted);

    text.trim().to_string()
}

/// Convert Markdown to HTML
pub fn markdown_to_html(markdown: &str) -> String {
    let normalized = markdown.replace("\r\n", "\n");
    let mut blocks = BlockBuilder::default();
    let mut lines = normalized.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();

        if let Some(info) = trimmed.strip_prefix("```") {
            blocks.flush();
            let mut code = Vec::new();
            for code_line in lines.by_ref() {
                if code_line.trim_start().starts_with("```") {
                    break;
                }
                code.push(code_line);
            }
            let body = escape_html(&code.join("\n"));
            let language = info.trim();
            if language.is_empty() {
                blocks.out.push(format!("<pre><code>{body}</code></pre>"));
            } else {
                blocks.out.push(format!(
                    "<pre><code class=\"language-{}\">{body}</code></pre>",
                    escape_html(language)
                ));
            }
            continue;
        }

        if trimmed.is_empty() {
            blocks.flush();
            continue;
        }

        if let Some(quoted) = trimmed.strip_prefix('>') {
            blocks.flush_paragraph();
            blocks.flush_list();
            blocks
                .quote
                .push(quoted.strip_prefix(' ').unwrap_or(quoted).to_string());
            continue;
        }
        blocks.flush_quote();

        if let Some(caps) = MD_HEADING.captures(line) {
            blocks.flush();
            let level = caps[1].len();
            let content = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            blocks
                .out
                .push(format!("<h{level}>{}</h{level}>", render_inline(content.trim())));
            continue;
        }

        if MD_RULE.is_match(line) {
            blocks.flush();
            blocks.out.push("<hr />".to_string());
            continue;
        }

        if let Some(caps) = MD_BULLET.captures(line) {
            blocks.flush_paragraph();
            blocks.push_item(ListKind::Bullet, &caps[1]);
            continue;
        }

        if let Some(caps) = MD_ORDERED.captures(line) {
            blocks.flush_paragraph();
            blocks.push_item(ListKind::Ordered, &caps[1]);
            continue;
        }

        blocks.flush_list();
        blocks.paragraph.push(line.to_string());
    }

    blocks.flush();
    blocks.out.join("\n")
}

/// Convert HTML to Markdown
pub fn html_to_markdown(html: &str) -> String {
    let mut md = remove_dangerous(&html.replace("\r\n", "\n"));
    let mut placeholders = Vec::new();

    md = PRE
        .replace_all(&md, |caps: &Captures| {
            let code = decode_entities(&TAG.replace_all(&caps[1], ""));
            placeholders.push(format!("```\n{}\n```", code.trim_end_matches('\n')));
            format!("{BLOCK_BREAK}\u{0}{}\u{0}{BLOCK_BREAK}", placeholders.len() - 1)
        })
        .into_owned();
    md = CODE
        .replace_all(&md, |caps: &Captures| {
            placeholders.push(format!("`{}`", decode_entities(&TAG.replace_all(&caps[1], ""))));
            format!("\u{0}{}\u{0}", placeholders.len() - 1)
        })
        .into_owned();

    md = WHITESPACE.replace_all(&md, " ").into_owned();

    md = BLOCKQUOTE
        .replace_all(&md, |caps: &Captures| {
            let inner = html_to_markdown(&caps[1]);
            let quoted: Vec<String> = inner
                .lines()
                .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
                .collect();
            format!("{BLOCK_BREAK}{}{BLOCK_BREAK}", quoted.join("\n"))
        })
        .into_owned();

    md = LIST
        .replace_all(&md, |caps: &Captures| {
            let ordered = caps[1].eq_ignore_ascii_case("ol");
            let items: Vec<String> = LIST_ITEM
                .captures_iter(&caps[2])
                .enumerate()
                .map(|(i, item)| {
                    let marker = if ordered { format!("{}.", i + 1) } else { "-".to_string() };
                    format!("{marker} {}", item[1].trim())
                })
                .collect();
            format!("{BLOCK_BREAK}{}{BLOCK_BREAK}", items.join(&ROW_BREAK.to_string()))
        })
        .into_owned();

    md = HEADING
        .replace_all(&md, |caps: &Captures| {
            let level: usize = caps[1].parse().unwrap_or(1);
            format!("{BLOCK_BREAK}{} {}{BLOCK_BREAK}", "#".repeat(level), caps[2].trim())
        })
        .into_owned();

    md = STRONG.replace_all(&md, "**${1}**").into_owned();
    md = EMPHASIS.replace_all(&md, "*${1}*").into_owned();
    md = STRIKE.replace_all(&md, "~~${1}~~").into_owned();
    md = IMAGE
        .replace_all(&md, |caps: &Captures| {
            let src = attribute(&caps[1], "src").unwrap_or_default();
            let alt = attribute(&caps[1], "alt").unwrap_or_default();
            format!("![{alt}]({src})")
        })
        .into_owned();
    md = ANCHOR
        .replace_all(&md, |caps: &Captures| match attribute(&caps[1], "href") {
            Some(href) => format!("[{}]({href})", caps[2].trim()),
            None => caps[2].to_string(),
        })
        .into_owned();

    md = BR.replace_all(&md, LINE_BREAK.to_string()).into_owned();
    md = HR
        .replace_all(&md, format!("{BLOCK_BREAK}---{BLOCK_BREAK}"))
        .into_owned();
    md = BLOCK_START.replace_all(&md, BLOCK_BREAK.to_string()).into_owned();
    md = BLOCK_END.replace_all(&md, BLOCK_BREAK.to_string()).into_owned();
    md = ROW_END.replace_all(&md, ROW_BREAK.to_string()).into_owned();
    md = TAG.replace_all(&md, "").into_owned();
    md = decode_entities(&md);
    md = collapse_markers(&md, "\\\n");
    md = restore_placeholders(&md, &placeholders);

    md.trim().to_string()
}

fn remove_dangerous(html: &str) -> String {
    let mut cleaned = COMMENT.replace_all(html, "").into_owned();
    for element in DANGEROUS.iter() {
        cleaned = element.replace_all(&cleaned, "").into_owned();
    }
    cleaned
}

/// Rounds of entity decoding applied to attribute values before the scheme check
const MAX_DECODE_ROUNDS: usize = 4;

fn is_safe_value(value: &str) -> bool {
    let mut decoded = value.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        let next = decode_entities(&decoded);
        if next == decoded {
            break;
        }
        decoded = next;
    }
    // Numeric references left over (unterminated or nested too deep) are refused
    if decoded.contains("&#") {
        return false;
    }

    let normalized: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !UNSAFE_URL_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

fn attribute(raw_attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE
        .captures_iter(raw_attrs)
        .find(|attr| attr[1].eq_ignore_ascii_case(name))
        .and_then(|attr| attr.get(2).or(attr.get(3)).or(attr.get(4)))
        .map(|value| value.as_str().to_string())
}

/// Turn runs of break markers into newlines
///
/// A run containing a block break becomes a blank line, a row break a single
/// newline, and bare `<br>`s become one `line_break` each.
fn collapse_markers(text: &str, line_break: &str) -> String {
    MARKERS
        .replace_all(text, |caps: &Captures| {
            let run = &caps[0];
            if run.contains(BLOCK_BREAK) {
                "\n\n".to_string()
            } else if run.contains(ROW_BREAK) {
                "\n".to_string()
            } else {
                line_break.repeat(run.matches(LINE_BREAK).count())
            }
        })
        .into_owned()
}

fn restore_placeholders(text: &str, placeholders: &[String]) -> String {
    let mut restored = text.to_string();
    for (i, value) in placeholders.iter().enumerate() {
        restored = restored.replace(&format!("\u{0}{i}\u{0}"), value);
    }
    restored
}

fn render_inline(text: &str) -> String {
    let mut spans = Vec::new();
    let extracted = MD_CODE_SPAN.replace_all(text, |caps: &Captures| {
        spans.push(format!("<code>{}</code>", escape_html(&caps[1])));
        format!("\u{0}{}\u{0}", spans.len() - 1)
    });

    let mut html = escape_html(&extracted);
    html = MD_IMAGE
        .replace_all(&html, r#"<img src="${2}" alt="${1}" />"#)
        .into_owned();
    html = MD_LINK
        .replace_all(&html, r#"<a href="${2}">${1}</a>"#)
        .into_owned();
    html = MD_STRONG
        .replace_all(&html, |caps: &Captures| {
            let inner = caps.get(1).or(caps.get(2)).map(|m| m.as_str()).unwrap_or("");
            format!("<strong>{inner}</strong>")
        })
        .into_owned();
    html = MD_STRIKE.replace_all(&html, "<del>${1}</del>").into_owned();
    html = MD_EMPHASIS
        .replace_all(&html, |caps: &Captures| {
            let inner = caps.get(1).or(caps.get(2)).map(|m| m.as_str()).unwrap_or("");
            format!("<em>{inner}</em>")
        })
        .into_owned();

    restore_placeholders(&html, &spans)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
}

#[derive(Default)]
struct BlockBuilder {
    out: Vec<String>,
    paragraph: Vec<String>,
    list: Option<(ListKind, Vec<String>)>,
    quote: Vec<String>,
}

impl BlockBuilder {
    fn push_item(&mut self, kind: ListKind, item: &str) {
        if matches!(self.list, Some((current, _)) if current != kind) {
            self.flush_list();
        }
        self.list
            .get_or_insert_with(|| (kind, Vec::new()))
            .1
            .push(render_inline(item.trim()));
    }

    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            return;
        }
        let last = self.paragraph.len() - 1;
        let mut html = String::new();
        for (i, line) in self.paragraph.drain(..).enumerate() {
            let hard_break = i < last && (line.ends_with("  ") || line.ends_with('\\'));
            let content = line.trim_end_matches(' ').trim_end_matches('\\').trim();
            html.push_str(&render_inline(content));
            if i < last {
                html.push_str(if hard_break { "<br />\n" } else { "\n" });
            }
        }
        self.out.push(format!("<p>{html}</p>"));
    }

    fn flush_list(&mut self) {
        let Some((kind, items)) = self.list.take() else {
            return;
        };
        let tag = match kind {
            ListKind::Bullet => "ul",
            ListKind::Ordered => "ol",
        };
        let items: Vec<String> = items.iter().map(|item| format!("<li>{item}</li>")).collect();
        self.out.push(format!("<{tag}>\n{}\n</{tag}>", items.join("\n")));
    }

    fn flush_quote(&mut self) {
        if self.quote.is_empty() {
            return;
        }
        let inner = markdown_to_html(&self.quote.join("\n"));
        self.quote.clear();
        self.out.push(format!("<blockquote>\n{inner}\n</blockquote>"));
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
        self.flush_quote();
    }
}
