//! Platform abstraction and registry
//!
//! Each adapter turns a resolved request into a platform call. Adapters are
//! registered by name at startup and looked up case-insensitively by the
//! resolver.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libpostgate::platforms::{mock::MockPlatform, PlatformRegistry};
//!
//! let mut registry = PlatformRegistry::new();
//! registry.register(Arc::new(MockPlatform::success("mock")));
//!
//! assert!(registry.get("MOCK").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PostRequest, PostType, PreviewResult, PublishResult, ResolvedChannelConfig};

pub mod telegram;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Platform trait for publishing a resolved request
///
/// The request handed to `preview` and `publish` has already been resolved:
/// credentials are merged, content and ambiguity are validated and
/// `post_type` holds the effective type, never AUTO.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier used for registry lookup (e.g. "telegram")
    fn name(&self) -> &str;

    /// Post types this platform can publish
    fn supported_types(&self) -> &[PostType];

    fn supports(&self, post_type: PostType) -> bool {
        self.supported_types().contains(&post_type)
    }

    /// Dry run: validate and render the request without side effects
    ///
    /// Problems the platform would reject are reported in
    /// `PreviewResult::errors` rather than as an `Err`.
    async fn preview(
        &self,
        request: &PostRequest,
        channel: &ResolvedChannelConfig,
    ) -> Result<PreviewResult>;

    /// Publish the request
    ///
    /// # Errors
    ///
    /// Returns `PlatformError` variants for upstream failures. Transient ones
    /// (`Network`, `RateLimit`, `Timeout`) may be retried by the caller.
    async fn publish(
        &self,
        request: &PostRequest,
        channel: &ResolvedChannelConfig,
    ) -> Result<PublishResult>;
}

/// Name-keyed set of platform adapters
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its lowercased name, replacing any previous one
    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        let name = platform.name().to_lowercase();
        tracing::debug!(platform = %name, "Registered platform adapter");
        self.platforms.insert(name, platform);
    }

    pub fn with(mut self, platform: Arc<dyn Platform>) -> Self {
        self.register(platform);
        self
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<Arc<dyn Platform>> {
        self.platforms.get(&name.trim().to_lowercase()).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.platforms.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPlatform;
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = PlatformRegistry::new().with(Arc::new(MockPlatform::success("Mock")));

        assert!(registry.get("mock").is_some());
        assert!(registry.get("MOCK").is_some());
        assert!(registry.get(" mock ").is_some());
        assert!(registry.get("telegram").is_none());
        assert_eq!(registry.names(), vec!["mock".to_string()]);
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = PlatformRegistry::new();
        registry.register(Arc::new(MockPlatform::success("mock")));
        registry.register(Arc::new(MockPlatform::with_types("mock", &[PostType::Post])));

        let platform = registry.get("mock").unwrap();
        assert!(platform.supports(PostType::Post));
        assert!(!platform.supports(PostType::Image));
    }

    #[test]
    fn test_empty_registry() {
        let registry = PlatformRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
    }
}
