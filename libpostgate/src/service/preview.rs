//! Preview orchestration
//!
//! Runs the same resolution as publishing and asks the adapter for a dry
//! run. Never publishes and never touches the idempotency cache.

use std::sync::Arc;

use crate::resolver::RequestResolver;
use crate::types::{PostRequest, PreviewData};

#[derive(Clone)]
pub struct PreviewService {
    resolver: Arc<RequestResolver>,
}

impl PreviewService {
    pub fn new(resolver: Arc<RequestResolver>) -> Self {
        Self { resolver }
    }

    /// Validate and render a request without publishing it
    ///
    /// Problems are reported as `valid: false` with messages in `errors`;
    /// this method does not fail.
    pub async fn preview(&self, request: &PostRequest) -> PreviewData {
        let resolution = match self.resolver.resolve(request).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::debug!(platform = %request.platform, "Preview rejected: {}", e);
                return PreviewData {
                    valid: false,
                    errors: vec![e.message()],
                    ..Default::default()
                };
            }
        };

        let platform = resolution.request.platform.clone();
        let post_type = resolution.request.post_type;

        match resolution
            .platform
            .preview(&resolution.request, &resolution.channel)
            .await
        {
            Ok(result) => PreviewData {
                valid: result.valid && result.errors.is_empty(),
                errors: result.errors,
                warnings: result.warnings,
                platform: Some(platform),
                post_type: Some(post_type),
                content: result.content,
            },
            Err(e) => PreviewData {
                valid: false,
                errors: vec![e.message()],
                platform: Some(platform),
                post_type: Some(post_type),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthValidatorRegistry;
    use crate::channels::ConfigChannelStore;
    use crate::platforms::mock::{MockConfig, MockPlatform};
    use crate::platforms::PlatformRegistry;
    use crate::types::{AuthMap, MediaInput, PostType};

    fn service(platform: MockPlatform) -> PreviewService {
        let resolver = RequestResolver::new(
            PlatformRegistry::new().with(Arc::new(platform)),
            AuthValidatorRegistry::new(),
            Arc::new(ConfigChannelStore::default()),
        );
        PreviewService::new(Arc::new(resolver))
    }

    fn request(body: &str) -> PostRequest {
        let mut request = PostRequest::new("mock", body);
        request.auth = Some(AuthMap::new());
        request
    }

    #[tokio::test]
    async fn test_valid_preview_never_publishes() {
        let platform = MockPlatform::success("mock");
        let data = service(platform.clone()).preview(&request("hi")).await;

        assert!(data.valid);
        assert_eq!(data.platform.as_deref(), Some("mock"));
        assert_eq!(data.post_type, Some(PostType::Post));
        assert_eq!(data.content.as_deref(), Some("hi"));
        assert_eq!(platform.preview_call_count(), 1);
        assert_eq!(platform.publish_call_count(), 0);
    }

    #[tokio::test]
    async fn test_resolution_errors_become_invalid() {
        let platform = MockPlatform::success("mock");
        let mut req = request("hi");
        req.audio = Some(MediaInput::url("a.mp3"));
        req.video = Some(MediaInput::url("b.mp4"));

        let data = service(platform.clone()).preview(&req).await;
        assert!(!data.valid);
        assert_eq!(
            data.errors,
            vec!["Ambiguous media fields: cannot use 'audio' and 'video' together".to_string()]
        );
        assert_eq!(data.platform, None);
        assert_eq!(platform.preview_call_count(), 0);
    }

    #[tokio::test]
    async fn test_adapter_problems_are_reported() {
        let platform = MockPlatform::new(MockConfig {
            name: "mock".into(),
            preview_errors: vec!["Caption too long".into()],
            preview_warnings: vec!["Spoiler ignored".into()],
            ..Default::default()
        });

        let data = service(platform).preview(&request("hi")).await;
        assert!(!data.valid);
        assert_eq!(data.errors, vec!["Caption too long".to_string()]);
        assert_eq!(data.warnings, vec!["Spoiler ignored".to_string()]);
        assert_eq!(data.post_type, Some(PostType::Post));
    }
}
