//! Core types for Postgate

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{exit_code_for, is_authentication_message, GateError};

/// Credential map, sorted by key so serialization is deterministic
pub type AuthMap = Map<String, Value>;

/// Kind of post a request produces on the target platform
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostType {
    /// Infer the type from the populated media fields
    #[default]
    #[serde(alias = "auto")]
    Auto,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "image")]
    Image,
    #[serde(alias = "video")]
    Video,
    #[serde(alias = "audio")]
    Audio,
    #[serde(alias = "document")]
    Document,
    #[serde(alias = "album")]
    Album,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Post => "POST",
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Audio => "AUDIO",
            Self::Document => "DOCUMENT",
            Self::Album => "ALBUM",
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Markup flavour of a request body
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BodyFormat {
    #[default]
    #[serde(alias = "text")]
    Text,
    #[serde(alias = "markdown")]
    Markdown,
    #[serde(alias = "html")]
    Html,
}

impl std::fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Markdown => write!(f, "MARKDOWN"),
            Self::Html => write!(f, "HTML"),
        }
    }
}

/// A media reference: either a bare URL or a descriptor object
///
/// An explicit `false` is accepted so clients can clear a field; it counts as
/// absent everywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MediaInput {
    Url(String),
    Flag(bool),
    Object(MediaObject),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_spoiler: Option<bool>,
}

impl MediaInput {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Truthiness of the field: empty strings and `false` are absent
    pub fn is_present(&self) -> bool {
        match self {
            Self::Url(url) => !url.trim().is_empty(),
            Self::Flag(flag) => *flag,
            Self::Object(_) => true,
        }
    }

    /// Platform file id if given, otherwise the URL
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Url(url) if !url.trim().is_empty() => Some(url.as_str()),
            Self::Object(obj) => obj
                .file_id
                .as_deref()
                .or(obj.url.as_deref())
                .filter(|s| !s.trim().is_empty()),
            _ => None,
        }
    }

    pub fn has_spoiler(&self) -> bool {
        matches!(self, Self::Object(MediaObject { has_spoiler: Some(true), .. }))
    }
}

/// Normalized "post a message" request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    #[serde(default)]
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub body_format: BodyFormat,
    #[serde(default, rename = "type")]
    pub post_type: PostType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<MediaInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<MediaInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl PostRequest {
    /// Create a text-only request for a platform
    pub fn new(platform: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Named channel, falling back to the `account` alias
    pub fn channel_name(&self) -> Option<&str> {
        self.channel
            .as_deref()
            .or(self.account.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    /// Body text if it is non-blank after trimming
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().filter(|body| !body.trim().is_empty())
    }

    /// Look up a single-value media field by its request name
    pub fn media_field(&self, name: &str) -> Option<&MediaInput> {
        let field = match name {
            "cover" => self.cover.as_ref(),
            "video" => self.video.as_ref(),
            "audio" => self.audio.as_ref(),
            "document" => self.document.as_ref(),
            _ => None,
        };
        field.filter(|m| m.is_present())
    }

    /// Whether `media[]` holds at least one entry
    pub fn has_album(&self) -> bool {
        !self.media.is_empty()
    }
}

/// Where the credentials of a resolved request came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelSource {
    Channel,
    Inline,
}

/// Per-request platform and credential pairing, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedChannelConfig {
    pub platform: String,
    pub auth: AuthMap,
    pub source: ChannelSource,
}

/// What a platform adapter reports after publishing
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub post_id: String,
    pub url: Option<String>,
    pub raw: Value,
}

/// What a platform adapter reports for a dry run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Body after conversion to the platform's target format
    pub content: Option<String>,
}

/// Successful publish response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub success: bool,
    pub platform: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub post_id: String,
    pub url: Option<String>,
    pub raw: Value,
}

impl PublishResponse {
    pub fn new(platform: &str, post_type: PostType, result: PublishResult) -> Self {
        Self {
            success: true,
            platform: platform.to_string(),
            post_type,
            post_id: result.post_id,
            url: result.url,
            raw: result.raw,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Failed request response; never carries a backtrace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn exit_code(&self) -> i32 {
        exit_code_for(
            &self.error.code,
            is_authentication_message(&self.error.message),
        )
    }
}

impl From<&GateError> for ErrorResponse {
    fn from(error: &GateError) -> Self {
        Self::new(error.code(), error.message())
    }
}

impl From<GateError> for ErrorResponse {
    fn from(error: GateError) -> Self {
        Self::from(&error)
    }
}

/// Result of the publish operation, cached verbatim under idempotency keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PublishOutcome {
    Published(PublishResponse),
    Failed(ErrorResponse),
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Published(_) => 0,
            Self::Failed(err) => err.exit_code(),
        }
    }
}

impl From<GateError> for PublishOutcome {
    fn from(error: GateError) -> Self {
        Self::Failed(error.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub post_type: Option<PostType>,
    /// The would-be converted content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewResponse {
    pub success: bool,
    pub data: PreviewData,
}

/// Result of the preview operation
///
/// Validation problems are reported inside `Previewed` with `valid: false`;
/// `Rejected` is only produced when the request could not be admitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PreviewOutcome {
    Previewed(PreviewResponse),
    Rejected(ErrorResponse),
}

impl PreviewOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Previewed(resp) if resp.data.valid)
    }
}
