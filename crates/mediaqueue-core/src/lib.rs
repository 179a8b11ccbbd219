//! Mediaqueue Core Library
//!
//! This crate provides the core functionality for Mediaqueue, including:
//! - Jobs (text-to-image, remix, background removal, video) and their lifecycle
//! - A bounded-concurrency queue with rate-limit retry and backoff
//! - Round-robin API key pools
//! - Provider adapters (Gemini, Veo, Seed Dream, PhotoRoom)
//! - Result export to files and zip archives
//! - Configuration management

pub mod archive;
pub mod config;
pub mod credentials;
pub mod error;
pub mod jobs;
pub mod media;
pub mod providers;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::credentials::Credentials;
    pub use crate::error::{Error, Result};
    pub use crate::jobs::{Job, JobId, JobPayload, JobQueue, JobStatus, JobType, NewJob};
    pub use crate::media::MediaData;
    pub use crate::providers::{JobRunner, ProviderRouter};
}

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod error_tests;
