//! Telegram platform implementation
//!
//! Shapes Bot API calls (`sendMessage`, `sendPhoto`, `sendMediaGroup`, ...)
//! from a resolved request. The transport is injected through
//! [`TelegramApi`]; the crate ships [`OutboxApi`], which writes each call as
//! a JSON line instead of sending it.

use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use regex::{Captures, Regex};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

use crate::convert::{decode_entities, escape_html, html_to_text, ContentConverter};
use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{
    BodyFormat, MediaInput, PostRequest, PostType, PreviewResult, PublishResult,
    ResolvedChannelConfig,
};

/// Maximum length of a text message
pub const MESSAGE_LIMIT: usize = 4096;

/// Maximum length of a media caption
pub const CAPTION_LIMIT: usize = 1024;

pub const ALBUM_MIN_ITEMS: usize = 2;
pub const ALBUM_MAX_ITEMS: usize = 10;

const SUPPORTED_TYPES: &[PostType] = &[
    PostType::Post,
    PostType::Image,
    PostType::Video,
    PostType::Audio,
    PostType::Document,
    PostType::Album,
];

static BLOCK_NEWLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(</?(?:p|ul|ol|li|h[1-6]|blockquote)\b[^>]*>|<br\s*/?>|<hr\b[^>]*>)\n")
        .expect("valid regex")
});
static ORDERED_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<ol\b[^>]*>(.*?)</ol\s*>").expect("valid regex")
});
static LIST_ITEM_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"));
static HEADING_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<h[1-6]\b[^>]*>").expect("valid regex"));
static HEADING_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</h[1-6]\s*>").expect("valid regex"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid regex"));
static IMAGE_ALT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)\balt="([^"]*)""#).expect("valid regex"));
static UNSUPPORTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|ul|ol|li|hr)\b[^>]*>|<br\s*/?>").expect("valid regex")
});
static QUOTE_TRAILING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+(</blockquote>)").expect("valid regex"));
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Bot API transport
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Invoke `method` with `params`, returning the `result` field of the reply
    async fn call(&self, bot_token: &SecretString, method: &str, params: Value) -> Result<Value>;
}

/// Transport that records calls as JSON lines instead of sending them
///
/// Each call is written as `{"method": ..., "params": ...}` and answered with
/// locally numbered message ids. The bot token is never written.
pub struct OutboxApi<W> {
    writer: Mutex<W>,
    next_message_id: AtomicI64,
}

impl<W: Write + Send> OutboxApi<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            next_message_id: AtomicI64::new(1),
        }
    }

    /// Consume the outbox and return the writer
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl OutboxApi<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> TelegramApi for OutboxApi<W> {
    async fn call(&self, _bot_token: &SecretString, method: &str, params: Value) -> Result<Value> {
        let count = match params.get("media") {
            Some(Value::Array(items)) if method == "sendMediaGroup" => items.len().max(1),
            _ => 1,
        };
        let first_id = self
            .next_message_id
            .fetch_add(count as i64, Ordering::SeqCst);

        let line = json!({ "method": method, "params": params });
        {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| PlatformError::Network("Outbox writer is poisoned".to_string()))?;
            writeln!(writer, "{}", line)
                .and_then(|_| writer.flush())
                .map_err(|e| PlatformError::Network(format!("Failed to write outbox: {}", e)))?;
        }

        tracing::debug!(method = %method, message_id = first_id, "Recorded Telegram call");

        if method == "sendMediaGroup" {
            let messages: Vec<Value> = (0..count as i64)
                .map(|offset| json!({ "message_id": first_id + offset }))
                .collect();
            Ok(Value::Array(messages))
        } else {
            Ok(json!({ "message_id": first_id }))
        }
    }
}

/// A Bot API call ready to send, plus everything preview needs to report
#[derive(Debug, Clone, Default)]
struct PreparedCall {
    method: &'static str,
    params: Map<String, Value>,
    content: Option<String>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Telegram platform adapter
pub struct TelegramPlatform {
    api: Arc<dyn TelegramApi>,
    converter: ContentConverter,
}

impl TelegramPlatform {
    pub fn new(api: Arc<dyn TelegramApi>, converter: ContentConverter) -> Self {
        Self { api, converter }
    }

    fn render_body(&self, request: &PostRequest, call: &mut PreparedCall) -> Option<String> {
        let body = request.body_text()?;
        match self
            .converter
            .render(body, request.body_format, BodyFormat::Html)
        {
            Ok(rendered) if self.converter.strips_all_html() => Some(rendered),
            Ok(rendered) => Some(telegram_html(&rendered)),
            Err(e) => {
                call.errors.push(e.to_string());
                None
            }
        }
    }

    fn prepare(&self, request: &PostRequest, channel: &ResolvedChannelConfig) -> PreparedCall {
        let mut call = PreparedCall::default();

        match channel.auth.get("chat_id") {
            Some(chat_id @ (Value::String(_) | Value::Number(_))) => {
                call.params.insert("chat_id".into(), chat_id.clone());
            }
            _ => call.errors.push("chat_id is required".to_string()),
        }

        let text = self.render_body(request, &mut call);
        let html = !self.converter.strips_all_html();

        let (method, text_key, limit) = match request.post_type {
            PostType::Album => ("sendMediaGroup", None, CAPTION_LIMIT),
            PostType::Post | PostType::Auto => ("sendMessage", Some("text"), MESSAGE_LIMIT),
            PostType::Image => ("sendPhoto", Some("caption"), CAPTION_LIMIT),
            PostType::Video => ("sendVideo", Some("caption"), CAPTION_LIMIT),
            PostType::Audio => ("sendAudio", Some("caption"), CAPTION_LIMIT),
            PostType::Document => ("sendDocument", Some("caption"), CAPTION_LIMIT),
        };
        call.method = method;

        if let Some(text) = &text {
            // Telegram counts characters after entity parsing
            let visible = if html { html_to_text(text) } else { text.clone() };
            let length = visible.chars().count();
            if length > limit {
                let what = if text_key == Some("text") { "Message" } else { "Caption" };
                call.errors.push(format!(
                    "{} exceeds {} character limit (got {} characters)",
                    what, limit, length
                ));
            }
        }

        match request.post_type {
            PostType::Album => self.prepare_album(request, text.as_deref(), html, &mut call),
            PostType::Post | PostType::Auto => {
                if text.is_none() {
                    call.errors.push("POST requires a non-empty body".to_string());
                }
            }
            single => self.prepare_single(request, single, &mut call),
        }

        if let (Some(key), Some(text)) = (text_key, &text) {
            call.params.insert(key.into(), Value::String(text.clone()));
            if html {
                call.params.insert("parse_mode".into(), json!("HTML"));
            }
        }

        for (key, value) in &request.options {
            call.params.entry(key.clone()).or_insert_with(|| value.clone());
        }

        call.content = text;
        call
    }

    fn prepare_single(&self, request: &PostRequest, post_type: PostType, call: &mut PreparedCall) {
        let (field, param) = match post_type {
            PostType::Image => ("cover", "photo"),
            PostType::Video => ("video", "video"),
            PostType::Audio => ("audio", "audio"),
            _ => ("document", "document"),
        };

        match request.media_field(field).and_then(MediaInput::reference) {
            Some(reference) => {
                call.params.insert(param.into(), json!(reference));
            }
            None => {
                call.errors
                    .push(format!("{} post requires '{}' with a url or fileId", post_type, field));
                return;
            }
        }

        if let Some(media) = request.media_field(field) {
            if media.has_spoiler() {
                if matches!(post_type, PostType::Image | PostType::Video) {
                    call.params.insert("has_spoiler".into(), json!(true));
                } else {
                    call.warnings
                        .push(format!("hasSpoiler is ignored for {} posts", post_type));
                }
            }
        }

        if post_type == PostType::Video {
            if let Some(cover) = request.media_field("cover").and_then(MediaInput::reference) {
                call.params.insert("cover".into(), json!(cover));
            }
        }
    }

    fn prepare_album(
        &self,
        request: &PostRequest,
        caption: Option<&str>,
        html: bool,
        call: &mut PreparedCall,
    ) {
        let count = request.media.len();
        if !(ALBUM_MIN_ITEMS..=ALBUM_MAX_ITEMS).contains(&count) {
            call.errors.push(format!(
                "ALBUM requires between {} and {} media items (got {})",
                ALBUM_MIN_ITEMS, ALBUM_MAX_ITEMS, count
            ));
        }

        let ignored: Vec<&str> = ["cover", "video", "audio", "document"]
            .into_iter()
            .filter(|field| request.media_field(field).is_some())
            .collect();
        if !ignored.is_empty() {
            call.warnings.push(format!(
                "Fields {} are ignored for ALBUM posts",
                ignored
                    .iter()
                    .map(|f| format!("'{}'", f))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let mut items = Vec::with_capacity(count);
        for (index, media) in request.media.iter().enumerate() {
            let Some(reference) = media.reference() else {
                call.errors
                    .push(format!("media[{}] has no url or fileId", index));
                continue;
            };

            let kind = AlbumItemKind::infer(reference);
            let mut item = Map::new();
            item.insert("type".into(), json!(kind.as_str()));
            item.insert("media".into(), json!(reference));
            if media.has_spoiler() {
                item.insert("has_spoiler".into(), json!(true));
            }
            if index == 0 {
                if let Some(caption) = caption {
                    item.insert("caption".into(), json!(caption));
                    if html {
                        item.insert("parse_mode".into(), json!("HTML"));
                    }
                }
            }
            items.push((kind, Value::Object(item)));
        }

        let visual = items.iter().filter(|(kind, _)| kind.is_visual()).count();
        if visual > 0 && visual < items.len() {
            call.errors
                .push("ALBUM cannot mix audio or documents with photos and videos".to_string());
        } else if visual == 0 && items.len() > 1 {
            let first = items[0].0;
            if items.iter().any(|(kind, _)| *kind != first) {
                call.errors
                    .push("ALBUM cannot mix audio files with documents".to_string());
            }
        }

        call.params.insert(
            "media".into(),
            Value::Array(items.into_iter().map(|(_, item)| item).collect()),
        );
    }
}

#[async_trait]
impl Platform for TelegramPlatform {
    fn name(&self) -> &str {
        "telegram"
    }

    fn supported_types(&self) -> &[PostType] {
        SUPPORTED_TYPES
    }

    async fn preview(
        &self,
        request: &PostRequest,
        channel: &ResolvedChannelConfig,
    ) -> Result<PreviewResult> {
        let call = self.prepare(request, channel);
        Ok(PreviewResult {
            valid: call.errors.is_empty(),
            errors: call.errors,
            warnings: call.warnings,
            content: call.content,
        })
    }

    async fn publish(
        &self,
        request: &PostRequest,
        channel: &ResolvedChannelConfig,
    ) -> Result<PublishResult> {
        let call = self.prepare(request, channel);
        if !call.errors.is_empty() {
            return Err(PlatformError::Validation(call.errors.join("; ")).into());
        }

        let token = match channel.auth.get("bot_token").and_then(Value::as_str) {
            Some(token) => SecretString::from(token.to_string()),
            None => {
                return Err(PlatformError::Authentication("bot_token is missing".to_string()).into())
            }
        };

        tracing::debug!(
            method = call.method,
            bot = %bot_id(&token),
            "Calling Telegram Bot API"
        );
        let raw = self
            .api
            .call(&token, call.method, Value::Object(call.params.clone()))
            .await?;

        let message_id = match &raw {
            Value::Array(messages) => messages.first().and_then(|m| m.get("message_id")),
            other => other.get("message_id"),
        }
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            PlatformError::Posting("Telegram response did not include a message_id".to_string())
        })?;

        let url = call
            .params
            .get("chat_id")
            .and_then(Value::as_str)
            .and_then(|chat| chat.strip_prefix('@'))
            .map(|username| format!("https://t.me/{}/{}", username, message_id));

        Ok(PublishResult {
            post_id: message_id.to_string(),
            url,
            raw,
        })
    }
}

/// Rewrite sanitized HTML into the subset Telegram's HTML parse mode accepts
///
/// Paragraphs and headings become line breaks (headings in bold), list items
/// become bullet or numbered lines and images collapse to their alt text.
pub fn telegram_html(html: &str) -> String {
    let mut text = BLOCK_NEWLINE.replace_all(html, "${1}").into_owned();

    text = ORDERED_LIST
        .replace_all(&text, |caps: &Captures| {
            let mut n = 0;
            LIST_ITEM_OPEN
                .replace_all(&caps[1], |_: &Captures| {
                    n += 1;
                    format!("{}. ", n)
                })
                .into_owned()
        })
        .into_owned();
    text = LIST_ITEM_OPEN.replace_all(&text, "• ").into_owned();
    text = HEADING_OPEN.replace_all(&text, "<b>").into_owned();
    text = HEADING_CLOSE.replace_all(&text, "</b>\n\n").into_owned();
    text = IMAGE
        .replace_all(&text, |caps: &Captures| {
            IMAGE_ALT
                .captures(&caps[0])
                .map(|alt| escape_html(&decode_entities(&alt[1])))
                .unwrap_or_default()
        })
        .into_owned();
    text = UNSUPPORTED
        .replace_all(&text, |caps: &Captures| {
            let tag = caps[0].to_ascii_lowercase();
            if tag.starts_with("</p") {
                "\n\n"
            } else if tag.starts_with("</li") || tag.starts_with("<br") || tag.starts_with("<hr") {
                "\n"
            } else {
                ""
            }
        })
        .into_owned();
    text = QUOTE_TRAILING.replace_all(&text, "${1}").into_owned();
    text = EXCESS_NEWLINES.replace_all(&text, "\n\n").into_owned();

    text.trim().to_string()
}

/// Public part of a bot token, safe to log
fn bot_id(token: &SecretString) -> String {
    token
        .expose_secret()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlbumItemKind {
    Photo,
    Video,
    Audio,
    Document,
}

impl AlbumItemKind {
    /// Infer the media group item type from the file extension
    ///
    /// File ids carry no extension and are treated as photos.
    fn infer(reference: &str) -> Self {
        let path = reference.split(['?', '#']).next().unwrap_or(reference);
        let file = path.rsplit('/').next().unwrap_or(path);
        let Some((_, ext)) = file.rsplit_once('.') else {
            return Self::Photo;
        };

        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => Self::Photo,
            "mp4" | "mov" | "webm" | "mkv" | "m4v" => Self::Video,
            "mp3" | "m4a" | "ogg" | "oga" | "flac" | "wav" => Self::Audio,
            _ => Self::Document,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    fn is_visual(&self) -> bool {
        matches!(self, Self::Photo | Self::Video)
    }
}
