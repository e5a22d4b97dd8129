//! abrpack - Adaptive-bitrate HLS packaging
//!
//! Hexagonal Architecture:
//! - domain/: Pure packaging logic (ladder, av, hls, jobs, events)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Status channel, publisher and job coordinator
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Monolith deployment (HTTP upload + SSE, filesystem storage)
//! - `aws`: S3 storage adapter
//! - `full`: All features

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use application::coordinator::JobCoordinator;
pub use application::status::{StatusChannel, StatusStream};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};

#[cfg(feature = "aws")]
pub use config::AwsConfig;

#[cfg(feature = "local")]
pub use config::LocalConfig;
