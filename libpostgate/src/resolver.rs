//! Request resolution
//!
//! Turns an inbound request into a platform adapter, merged credentials and
//! an effective post type. Every gate runs before any side effect, in this
//! order: platform lookup, channel lookup, auth merge, platform match, auth
//! shape, content presence, media ambiguity, type support.

use std::sync::Arc;

use crate::auth::AuthValidatorRegistry;
use crate::channels::ChannelStore;
use crate::detection::{detect_type, validate_content, validate_media_ambiguity};
use crate::error::{GateError, Result, ValidationError};
use crate::platforms::{Platform, PlatformRegistry};
use crate::types::{ChannelSource, PostRequest, ResolvedChannelConfig};

/// A request that passed every gate
#[derive(Clone)]
pub struct Resolution {
    pub platform: Arc<dyn Platform>,
    pub channel: ResolvedChannelConfig,
    /// Copy of the request with `post_type` set to the effective type and
    /// `platform` set to the adapter's canonical name
    pub request: PostRequest,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("platform", &self.platform.name())
            .field("source", &self.channel.source)
            .field("post_type", &self.request.post_type)
            .finish()
    }
}

pub struct RequestResolver {
    platforms: PlatformRegistry,
    validators: AuthValidatorRegistry,
    channels: Arc<dyn ChannelStore>,
}

impl RequestResolver {
    pub fn new(
        platforms: PlatformRegistry,
        validators: AuthValidatorRegistry,
        channels: Arc<dyn ChannelStore>,
    ) -> Self {
        Self {
            platforms,
            validators,
            channels,
        }
    }

    pub fn platforms(&self) -> &PlatformRegistry {
        &self.platforms
    }

    /// Resolve and validate `request`
    ///
    /// # Errors
    ///
    /// - `ValidationError` for every user-correctable problem
    /// - `GateError::NotFound` when the named channel does not exist
    pub async fn resolve(&self, request: &PostRequest) -> Result<Resolution> {
        let requested = request.platform.trim();
        if requested.is_empty() {
            return Err(ValidationError::MissingPlatform.into());
        }

        let platform = self
            .platforms
            .get(requested)
            .ok_or_else(|| ValidationError::NotSupported(requested.to_string()))?;

        let channel = self.resolve_channel(request).await?;

        if !channel.platform.trim().eq_ignore_ascii_case(requested) {
            return Err(ValidationError::PlatformMismatch {
                channel: channel.platform.clone(),
                requested: requested.to_string(),
            }
            .into());
        }

        if let Some(errors) = self.validators.validate(platform.name(), &channel.auth) {
            if !errors.is_empty() {
                return Err(ValidationError::InvalidAuth(errors.join("; ")).into());
            }
        }

        validate_content(request)?;
        validate_media_ambiguity(request)?;

        let post_type = detect_type(request);
        if !platform.supports(post_type) {
            return Err(ValidationError::UnsupportedType {
                platform: platform.name().to_string(),
                post_type,
            }
            .into());
        }

        let mut resolved = request.clone();
        resolved.platform = platform.name().to_string();
        resolved.post_type = post_type;

        tracing::debug!(
            platform = %platform.name(),
            source = ?channel.source,
            post_type = %post_type,
            "Resolved request"
        );

        Ok(Resolution {
            platform,
            channel,
            request: resolved,
        })
    }

    async fn resolve_channel(&self, request: &PostRequest) -> Result<ResolvedChannelConfig> {
        if let Some(name) = request.channel_name() {
            let stored = self
                .channels
                .get_channel(name)
                .await?
                .ok_or_else(|| GateError::NotFound(format!("Channel '{}' not found", name)))?;

            let mut auth = stored.auth;
            if let Some(inline) = &request.auth {
                for (key, value) in inline {
                    auth.insert(key.clone(), value.clone());
                }
            }

            return Ok(ResolvedChannelConfig {
                platform: stored.platform,
                auth,
                source: ChannelSource::Channel,
            });
        }

        match &request.auth {
            Some(auth) => Ok(ResolvedChannelConfig {
                platform: request.platform.trim().to_string(),
                auth: auth.clone(),
                source: ChannelSource::Inline,
            }),
            None => Err(ValidationError::MissingCredentials.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelConfig, ConfigChannelStore};
    use crate::platforms::mock::MockPlatform;
    use crate::types::{AuthMap, MediaInput, PostType};
    use serde_json::{json, Value};

    fn auth(value: Value) -> AuthMap {
        value.as_object().cloned().unwrap()
    }

    fn resolver() -> RequestResolver {
        let platforms = PlatformRegistry::new()
            .with(Arc::new(MockPlatform::success("telegram")))
            .with(Arc::new(MockPlatform::with_types("textonly", &[PostType::Post])));

        let mut channels = ConfigChannelStore::default();
        channels.insert(
            "news",
            ChannelConfig::new(
                "telegram",
                auth(json!({ "bot_token": "123:abc", "chat_id": "@news" })),
            ),
        );
        channels.insert("notes", ChannelConfig::new("textonly", AuthMap::new()));

        RequestResolver::new(
            platforms,
            AuthValidatorRegistry::with_defaults(),
            Arc::new(channels),
        )
    }

    fn request(body: &str) -> PostRequest {
        let mut request = PostRequest::new("telegram", body);
        request.channel = Some("news".into());
        request
    }

    fn validation(err: GateError) -> ValidationError {
        match err {
            GateError::Validation(e) => e,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolves_stored_channel() {
        let resolution = resolver().resolve(&request("hi")).await.unwrap();

        assert_eq!(resolution.platform.name(), "telegram");
        assert_eq!(resolution.channel.source, ChannelSource::Channel);
        assert_eq!(resolution.channel.auth["chat_id"], json!("@news"));
        assert_eq!(resolution.request.post_type, PostType::Post);
    }

    #[tokio::test]
    async fn test_platform_is_required_and_must_exist() {
        let resolver = resolver();

        let mut req = request("hi");
        req.platform = "  ".into();
        assert_eq!(
            validation(resolver.resolve(&req).await.unwrap_err()),
            ValidationError::MissingPlatform
        );

        req.platform = "myspace".into();
        let err = resolver.resolve(&req).await.unwrap_err();
        assert_eq!(err.message(), "Platform 'myspace' is not supported");
    }

    #[tokio::test]
    async fn test_platform_lookup_is_case_insensitive() {
        let mut req = request("hi");
        req.platform = "TeleGram".into();
        let resolution = resolver().resolve(&req).await.unwrap();
        assert_eq!(resolution.request.platform, "telegram");
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let mut req = request("hi");
        req.channel = None;
        assert_eq!(
            validation(resolver().resolve(&req).await.unwrap_err()),
            ValidationError::MissingCredentials
        );
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let mut req = request("hi");
        req.channel = Some("sports".into());
        let err = resolver().resolve(&req).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.message().contains("sports"));
    }

    #[tokio::test]
    async fn test_account_alias() {
        let mut req = request("hi");
        req.channel = None;
        req.account = Some("news".into());
        let resolution = resolver().resolve(&req).await.unwrap();
        assert_eq!(resolution.channel.source, ChannelSource::Channel);
    }

    #[tokio::test]
    async fn test_request_auth_overrides_channel_auth() {
        let mut req = request("hi");
        req.auth = Some(auth(json!({ "chat_id": "@other", "extra": 1 })));

        let resolution = resolver().resolve(&req).await.unwrap();
        assert_eq!(resolution.channel.auth["chat_id"], json!("@other"));
        assert_eq!(resolution.channel.auth["bot_token"], json!("123:abc"));
        assert_eq!(resolution.channel.auth["extra"], json!(1));
    }

    #[tokio::test]
    async fn test_inline_auth() {
        let mut req = PostRequest::new("telegram", "hi");
        req.auth = Some(auth(json!({ "bot_token": "1:x", "chat_id": 42 })));

        let resolution = resolver().resolve(&req).await.unwrap();
        assert_eq!(resolution.channel.source, ChannelSource::Inline);
        assert_eq!(resolution.channel.platform, "telegram");
    }

    #[tokio::test]
    async fn test_platform_mismatch_names_both() {
        let mut req = request("hi");
        req.channel = Some("notes".into());

        let err = validation(resolver().resolve(&req).await.unwrap_err());
        assert_eq!(
            err,
            ValidationError::PlatformMismatch {
                channel: "textonly".into(),
                requested: "telegram".into()
            }
        );
    }

    #[tokio::test]
    async fn test_auth_errors_are_joined() {
        let mut req = PostRequest::new("telegram", "hi");
        req.auth = Some(AuthMap::new());

        let err = resolver().resolve(&req).await.unwrap_err();
        assert_eq!(
            err.message(),
            "Invalid credentials: bot_token is required; chat_id is required"
        );
    }

    #[tokio::test]
    async fn test_platform_without_validator_skips_auth_check() {
        let mut req = PostRequest::new("textonly", "hi");
        req.auth = Some(AuthMap::new());
        assert!(resolver().resolve(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_content() {
        let req = request("   ");
        assert_eq!(
            validation(resolver().resolve(&req).await.unwrap_err()),
            ValidationError::MissingContent
        );
    }

    #[tokio::test]
    async fn test_audio_and_video_are_ambiguous() {
        let mut req = request("hi");
        req.audio = Some(MediaInput::url("https://example.com/a.mp3"));
        req.video = Some(MediaInput::url("https://example.com/b.mp4"));

        let err = resolver().resolve(&req).await.unwrap_err();
        assert!(err
            .message()
            .contains("cannot use 'audio' and 'video' together"));
    }

    #[tokio::test]
    async fn test_album_wins_over_document() {
        let mut req = request("hi");
        req.media = vec![MediaInput::url("1.jpg"), MediaInput::url("2.jpg")];
        req.document = Some(MediaInput::url("d.pdf"));

        let resolution = resolver().resolve(&req).await.unwrap();
        assert_eq!(resolution.request.post_type, PostType::Album);
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let mut req = PostRequest::new("textonly", "hi");
        req.channel = Some("notes".into());
        req.cover = Some(MediaInput::url("c.jpg"));

        let err = validation(resolver().resolve(&req).await.unwrap_err());
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                platform: "textonly".into(),
                post_type: PostType::Image
            }
        );
    }

    #[tokio::test]
    async fn test_gate_order_platform_before_channel() {
        let mut req = request("hi");
        req.platform = "myspace".into();
        req.channel = Some("missing".into());

        let err = resolver().resolve(&req).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
