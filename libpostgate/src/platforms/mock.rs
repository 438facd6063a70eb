//! Mock platform implementation for testing
//!
//! A configurable adapter that can simulate successes, permanent failures,
//! transient failures that clear after a number of attempts, and latency.
//! Clones share their counters so a test can keep a handle after handing the
//! platform to a registry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{PostRequest, PostType, PreviewResult, PublishResult, ResolvedChannelConfig};

const ALL_TYPES: &[PostType] = &[
    PostType::Post,
    PostType::Image,
    PostType::Video,
    PostType::Audio,
    PostType::Document,
    PostType::Album,
];

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name used for registry lookup
    pub name: String,

    pub supported_types: Vec<PostType>,

    /// Error returned by every publish call
    pub publish_error: Option<PlatformError>,

    /// Number of leading publish calls that fail with `transient_error`
    pub transient_failures: usize,

    pub transient_error: PlatformError,

    /// Delay before completing publish (simulates network latency)
    pub delay: Duration,

    /// Errors reported by preview
    pub preview_errors: Vec<String>,

    /// Warnings reported by preview
    pub preview_warnings: Vec<String>,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Number of times preview has been called
    pub preview_call_count: Arc<Mutex<usize>>,

    /// Requests that have been published (for verification)
    pub published: Arc<Mutex<Vec<PostRequest>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            supported_types: ALL_TYPES.to_vec(),
            publish_error: None,
            transient_failures: 0,
            transient_error: PlatformError::Network("Mock network error".to_string()),
            delay: Duration::from_millis(0),
            preview_errors: Vec::new(),
            preview_warnings: Vec::new(),
            publish_call_count: Arc::new(Mutex::new(0)),
            preview_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform whose publish always fails with `error`
    pub fn failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            publish_error: Some(error),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails `failures` times with `error`, then succeeds
    pub fn flaky(name: &str, failures: usize, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            transient_failures: failures,
            transient_error: error,
            ..Default::default()
        })
    }

    /// Create a mock platform with a publish delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock platform restricted to the given post types
    pub fn with_types(name: &str, types: &[PostType]) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            supported_types: types.to_vec(),
            ..Default::default()
        })
    }

    /// Get the number of times publish was called
    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    /// Get the number of times preview was called
    pub fn preview_call_count(&self) -> usize {
        *self.config.preview_call_count.lock().unwrap()
    }

    /// Get all requests that were published
    pub fn published(&self) -> Vec<PostRequest> {
        self.config.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supported_types(&self) -> &[PostType] {
        &self.config.supported_types
    }

    async fn preview(
        &self,
        request: &PostRequest,
        _channel: &ResolvedChannelConfig,
    ) -> Result<PreviewResult> {
        *self.config.preview_call_count.lock().unwrap() += 1;

        Ok(PreviewResult {
            valid: self.config.preview_errors.is_empty(),
            errors: self.config.preview_errors.clone(),
            warnings: self.config.preview_warnings.clone(),
            content: request.body.clone(),
        })
    }

    async fn publish(
        &self,
        request: &PostRequest,
        _channel: &ResolvedChannelConfig,
    ) -> Result<PublishResult> {
        let attempt = {
            let mut count = self.config.publish_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        // Simulate delay
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if attempt <= self.config.transient_failures {
            return Err(self.config.transient_error.clone().into());
        }

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        self.config.published.lock().unwrap().push(request.clone());

        // Generate mock post ID
        let post_id = format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4());
        Ok(PublishResult {
            url: None,
            raw: json!({ "id": post_id, "attempt": attempt }),
            post_id,
        })
    }
}
