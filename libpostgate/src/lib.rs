//! Postgate - resolve, validate and dispatch posts to messaging platforms
//!
//! This library provides the request pipeline behind `gate-post`: platform
//! and credential resolution, post type detection, content conversion, an
//! idempotency gate and graceful shutdown.

pub mod auth;
pub mod channels;
pub mod config;
pub mod convert;
pub mod detection;
pub mod error;
pub mod idempotency;
pub mod logging;
pub mod platforms;
pub mod resolver;
pub mod service;
pub mod shutdown;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use convert::ContentConverter;
pub use error::{GateError, PlatformError, Result, ValidationError};
pub use platforms::{Platform, PlatformRegistry};
pub use service::GateService;
pub use types::{
    BodyFormat, MediaInput, PostRequest, PostType, PreviewOutcome, PublishOutcome,
};
