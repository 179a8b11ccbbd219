//! Jobs and the queue that runs them
//!
//! - `types`: job records, payloads and status
//! - `retry`: failure classification and backoff
//! - `queue`: bounded-concurrency scheduler
//! - `events`: lifecycle notifications

mod events;
mod queue;
mod retry;
mod types;

pub use events::JobEvent;
pub use queue::{JobQueue, QueueOptions};
pub use retry::{FailureKind, RetryPolicy, classify, is_rate_limit_message};
pub use types::{
    IMAGE_ASPECT_RATIOS, IMAGE_SIZES, ImageModel, Job, JobId, JobPayload, JobStats, JobStatus,
    JobType, NewJob, VIDEO_ASPECT_RATIOS, VIDEO_RESOLUTIONS,
};
