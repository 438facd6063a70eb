//! Service layer for Postgate
//!
//! `GateService` is the entry point transports talk to. It owns the shutdown
//! coordinator and hands admitted requests to the sub-services:
//!
//! - `PostingService`: resolution, idempotency gate, dispatch with retry
//! - `PreviewService`: resolution and adapter dry run
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libpostgate::platforms::{mock::MockPlatform, PlatformRegistry};
//! use libpostgate::service::GateService;
//! use libpostgate::{Config, PostRequest};
//!
//! # async fn example() -> libpostgate::Result<()> {
//! let platforms = PlatformRegistry::new().with(Arc::new(MockPlatform::success("mock")));
//! let service = GateService::from_config(&Config::default(), platforms)?;
//!
//! let mut request = PostRequest::new("mock", "Hello!");
//! request.auth = Some(Default::default());
//!
//! let outcome = service.publish(&request).await;
//! println!("{}", serde_json::to_string(&outcome).unwrap());
//!
//! service.begin_shutdown("SIGTERM").await;
//! # Ok(())
//! # }
//! ```

pub mod posting;
pub mod preview;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use self::posting::{DispatchPolicy, PostingService};
use self::preview::PreviewService;
use crate::auth::AuthValidatorRegistry;
use crate::channels::{ChannelStore, ConfigChannelStore};
use crate::config::Config;
use crate::error::Result;
use crate::idempotency::{IdempotencyCoordinator, MemoryTtlCache, TtlCache};
use crate::platforms::PlatformRegistry;
use crate::resolver::RequestResolver;
use crate::shutdown::{RequestGuard, ShutdownCoordinator};
use crate::types::{PostRequest, PreviewOutcome, PreviewResponse, PublishOutcome};

/// Pluggable collaborators of the service
pub struct Components {
    pub platforms: PlatformRegistry,
    pub validators: AuthValidatorRegistry,
    pub channels: Arc<dyn ChannelStore>,
    pub cache: Arc<dyn TtlCache>,
}

impl Components {
    /// Defaults for everything but the platforms: built-in auth validators,
    /// channels from config and an in-memory cache
    pub fn from_config(config: &Config, platforms: PlatformRegistry) -> Self {
        Self {
            platforms,
            validators: AuthValidatorRegistry::with_defaults(),
            channels: Arc::new(ConfigChannelStore::new(&config.channels)),
            cache: Arc::new(MemoryTtlCache::new()),
        }
    }
}

/// Main service facade
///
/// Cheap to clone; clones share the shutdown state and the idempotency cache.
#[derive(Clone)]
pub struct GateService {
    posting: PostingService,
    preview: PreviewService,
    shutdown: ShutdownCoordinator,
}

impl GateService {
    /// Create a service with default collaborators for `config`
    pub fn from_config(config: &Config, platforms: PlatformRegistry) -> Result<Self> {
        Self::with_components(config, Components::from_config(config, platforms))
    }

    /// Create a service from explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the configuration fails validation.
    pub fn with_components(config: &Config, components: Components) -> Result<Self> {
        config.validate()?;
        let policy = DispatchPolicy::from_config(&config.dispatch)?;

        let resolver = Arc::new(RequestResolver::new(
            components.platforms,
            components.validators,
            components.channels,
        ));
        let idempotency = Arc::new(IdempotencyCoordinator::new(
            components.cache,
            config.idempotency.ttl(),
        ));

        tracing::debug!(
            platforms = ?resolver.platforms().names(),
            ttl_minutes = config.idempotency.ttl_minutes,
            "Service initialized"
        );

        Ok(Self {
            posting: PostingService::new(Arc::clone(&resolver), idempotency, policy),
            preview: PreviewService::new(resolver),
            shutdown: ShutdownCoordinator::new(),
        })
    }

    pub fn posting(&self) -> &PostingService {
        &self.posting
    }

    pub fn previews(&self) -> &PreviewService {
        &self.preview
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Admission check; the returned guard keeps the request counted
    pub fn admit(&self) -> Result<RequestGuard> {
        self.shutdown.track_request()
    }

    pub async fn publish(&self, request: &PostRequest) -> PublishOutcome {
        self.publish_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Publish, aborting the adapter call when `cancel` fires
    pub async fn publish_with_cancel(
        &self,
        request: &PostRequest,
        cancel: &CancellationToken,
    ) -> PublishOutcome {
        match self.admit() {
            Ok(guard) => self.publish_admitted(guard, request, cancel).await,
            Err(e) => e.into(),
        }
    }

    /// Publish a request admitted earlier through [`GateService::admit`]
    pub async fn publish_admitted(
        &self,
        guard: RequestGuard,
        request: &PostRequest,
        cancel: &CancellationToken,
    ) -> PublishOutcome {
        let outcome = self.posting.publish(request, cancel).await;
        drop(guard);
        outcome
    }

    pub async fn preview(&self, request: &PostRequest) -> PreviewOutcome {
        match self.admit() {
            Ok(guard) => self.preview_admitted(guard, request).await,
            Err(e) => PreviewOutcome::Rejected(e.into()),
        }
    }

    /// Preview a request admitted earlier through [`GateService::admit`]
    pub async fn preview_admitted(&self, guard: RequestGuard, request: &PostRequest) -> PreviewOutcome {
        let data = self.preview.preview(request).await;
        drop(guard);
        PreviewOutcome::Previewed(PreviewResponse {
            success: true,
            data,
        })
    }

    /// Stop admitting requests and wait for in-flight ones
    pub async fn begin_shutdown(&self, signal: &str) {
        self.shutdown.begin_shutdown(signal).await
    }
}
