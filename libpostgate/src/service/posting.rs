//! Publish orchestration
//!
//! Runs a request through resolution, the idempotency gate and the adapter
//! call. The adapter call is bounded by a timeout, retried on transient
//! failures and raced against the caller's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::error::{GateError, PlatformError, Result};
use crate::idempotency::{Admission, IdempotencyCoordinator};
use crate::resolver::{RequestResolver, Resolution};
use crate::types::{PostRequest, PublishOutcome, PublishResponse, PublishResult};

/// Timeout and retry settings for adapter calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub request_timeout: Duration,
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl DispatchPolicy {
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        Ok(Self {
            request_timeout: config.request_timeout()?,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay()?,
        })
    }
}

/// Service for publishing requests to platforms
#[derive(Clone)]
pub struct PostingService {
    resolver: Arc<RequestResolver>,
    idempotency: Arc<IdempotencyCoordinator>,
    policy: DispatchPolicy,
}

impl PostingService {
    pub fn new(
        resolver: Arc<RequestResolver>,
        idempotency: Arc<IdempotencyCoordinator>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            resolver,
            idempotency,
            policy,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Publish a request
    ///
    /// Never fails: every error is turned into `PublishOutcome::Failed`.
    /// Validation errors are returned before the idempotency gate and are not
    /// cached. Once a key is claimed, whatever the dispatch produces (success,
    /// upstream error, timeout, cancellation) is stored as the key's response.
    pub async fn publish(&self, request: &PostRequest, cancel: &CancellationToken) -> PublishOutcome {
        let resolution = match self.resolver.resolve(request).await {
            Ok(resolution) => resolution,
            Err(e) => {
                info!(platform = %request.platform, "Rejected request: {}", e);
                return e.into();
            }
        };

        let key = match self.idempotency.begin(request).await {
            Ok(Admission::Replay(outcome)) => return outcome,
            Ok(Admission::Claimed(key)) => Some(key),
            Ok(Admission::Untracked) => None,
            Err(e) => return e.into(),
        };

        let outcome = match self.dispatch(&resolution, cancel).await {
            Ok(result) => {
                info!(
                    platform = %resolution.request.platform,
                    post_type = %resolution.request.post_type,
                    post_id = %result.post_id,
                    "Published"
                );
                PublishOutcome::Published(PublishResponse::new(
                    &resolution.request.platform,
                    resolution.request.post_type,
                    result,
                ))
            }
            Err(e) => {
                error!(platform = %resolution.request.platform, "Publish failed: {}", e);
                e.into()
            }
        };

        if let Some(key) = key {
            if let Err(e) = self.idempotency.set_completed(&key, &outcome).await {
                warn!(key = %key, "Failed to record idempotent response: {}", e);
            }
        }

        outcome
    }

    /// Call the adapter with timeout, retry and cancellation
    async fn dispatch(
        &self,
        resolution: &Resolution,
        cancel: &CancellationToken,
    ) -> Result<PublishResult> {
        let platform = resolution.platform.as_ref();
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.request_timeout;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                result = tokio::time::timeout(
                    timeout,
                    platform.publish(&resolution.request, &resolution.channel),
                ) => match result {
                    Ok(result) => result,
                    Err(_) => Err(PlatformError::Timeout(format!(
                        "{} did not respond within {}",
                        platform.name(),
                        humantime::format_duration(timeout)
                    ))
                    .into()),
                },
            };

            match result {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            "Successfully posted to {} on attempt {}",
                            platform.name(),
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "Transient error posting to {} (attempt {}/{}): {}. Retrying in {}...",
                        platform.name(),
                        attempt,
                        max_attempts,
                        e,
                        humantime::format_duration(self.policy.retry_delay)
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = sleep(self.policy.retry_delay) => {}
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        platform.name(),
                        max_attempts,
                        e
                    );
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn cancelled() -> GateError {
    GateError::Cancelled("Client cancelled the request".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthValidatorRegistry;
    use crate::channels::ConfigChannelStore;
    use crate::idempotency::MemoryTtlCache;
    use crate::platforms::mock::MockPlatform;
    use crate::platforms::PlatformRegistry;
    use crate::types::{AuthMap, PostType};

    fn policy() -> DispatchPolicy {
        DispatchPolicy {
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn service_with(platform: MockPlatform, policy: DispatchPolicy) -> (PostingService, Arc<MemoryTtlCache>) {
        let resolver = RequestResolver::new(
            PlatformRegistry::new().with(Arc::new(platform)),
            AuthValidatorRegistry::new(),
            Arc::new(ConfigChannelStore::default()),
        );
        let cache = Arc::new(MemoryTtlCache::new());
        let idempotency = IdempotencyCoordinator::new(cache.clone(), Duration::from_secs(60));
        (
            PostingService::new(Arc::new(resolver), Arc::new(idempotency), policy),
            cache,
        )
    }

    fn request(body: &str) -> PostRequest {
        let mut request = PostRequest::new("mock", body);
        request.auth = Some(AuthMap::new());
        request
    }

    fn error_code(outcome: &PublishOutcome) -> &str {
        match outcome {
            PublishOutcome::Failed(e) => &e.error.code,
            PublishOutcome::Published(_) => panic!("expected a failure"),
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy = DispatchPolicy::from_config(&DispatchConfig::default()).unwrap();
        assert_eq!(policy, DispatchPolicy::default());
    }

    #[tokio::test]
    async fn test_publish_success() {
        let platform = MockPlatform::success("mock");
        let (service, cache) = service_with(platform.clone(), policy());

        let outcome = service.publish(&request("hi"), &CancellationToken::new()).await;

        let PublishOutcome::Published(response) = outcome else {
            panic!("expected success");
        };
        assert!(response.success);
        assert_eq!(response.platform, "mock");
        assert_eq!(response.post_type, PostType::Post);
        assert!(response.post_id.starts_with("mock:mock-"));
        assert_eq!(platform.publish_call_count(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_cached() {
        let platform = MockPlatform::success("mock");
        let (service, cache) = service_with(platform.clone(), policy());
        let mut req = request("  ");
        req.idempotency_key = Some("k".into());

        let outcome = service.publish(&req, &CancellationToken::new()).await;
        assert_eq!(error_code(&outcome), "VALIDATION_ERROR");
        assert_eq!(platform.publish_call_count(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let platform = MockPlatform::flaky("mock", 2, PlatformError::Network("reset".into()));
        let (service, _) = service_with(platform.clone(), policy());

        let outcome = service.publish(&request("hi"), &CancellationToken::new()).await;
        assert!(outcome.is_success());
        assert_eq!(platform.publish_call_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let platform = MockPlatform::flaky("mock", 10, PlatformError::RateLimit("slow".into()));
        let (service, _) = service_with(platform.clone(), policy());

        let outcome = service.publish(&request("hi"), &CancellationToken::new()).await;
        assert_eq!(error_code(&outcome), "UPSTREAM_ERROR");
        assert_eq!(platform.publish_call_count(), 3);

        // The last adapter error is surfaced as-is
        let PublishOutcome::Failed(response) = outcome else {
            panic!("expected a failure");
        };
        assert_eq!(response.error.message, "Rate limit exceeded: slow");
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let platform = MockPlatform::failure("mock", PlatformError::Authentication("revoked".into()));
        let (service, _) = service_with(platform.clone(), policy());

        let outcome = service.publish(&request("hi"), &CancellationToken::new()).await;
        assert_eq!(error_code(&outcome), "UPSTREAM_ERROR");
        assert_eq!(platform.publish_call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let platform = MockPlatform::with_delay("mock", Duration::from_millis(500));
        let (service, _) = service_with(
            platform.clone(),
            DispatchPolicy {
                request_timeout: Duration::from_millis(20),
                max_attempts: 2,
                retry_delay: Duration::from_millis(1),
            },
        );

        let outcome = service.publish(&request("hi"), &CancellationToken::new()).await;
        assert_eq!(error_code(&outcome), "TIMEOUT");
        assert_eq!(platform.publish_call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_is_recorded_for_the_key() {
        let platform = MockPlatform::with_delay("mock", Duration::from_millis(500));
        let (service, _) = service_with(platform.clone(), policy());
        let mut req = request("hi");
        req.idempotency_key = Some("cancel-me".into());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = service.publish(&req, &cancel).await;
        assert_eq!(error_code(&outcome), "CANCELLED");

        // The retry gets the recorded cancellation, not a second dispatch
        let replay = service.publish(&req, &CancellationToken::new()).await;
        assert_eq!(replay, outcome);
        assert_eq!(platform.publish_call_count(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_dispatch() {
        let platform = MockPlatform::success("mock");
        let (service, _) = service_with(platform.clone(), policy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = service.publish(&request("hi"), &cancel).await;
        assert_eq!(error_code(&outcome), "CANCELLED");
        assert_eq!(platform.publish_call_count(), 0);
    }

    #[tokio::test]
    async fn test_idempotent_replay() {
        let platform = MockPlatform::success("mock");
        let (service, _) = service_with(platform.clone(), policy());
        let mut req = request("hi");
        req.idempotency_key = Some("order-1".into());

        let first = service.publish(&req, &CancellationToken::new()).await;
        let second = service.publish(&req, &CancellationToken::new()).await;

        assert!(first.is_success());
        assert_eq!(first, second);
        assert_eq!(platform.publish_call_count(), 1);
    }
}
