//! Lifecycle events published by the queue

use serde::Serialize;

use super::types::{JobId, JobType};

/// A change in a job's lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum JobEvent {
    Queued {
        id: JobId,
        job_type: JobType,
    },
    Started {
        id: JobId,
        job_type: JobType,
    },
    /// A rate-limited attempt will be retried after `delay_ms`
    Retrying {
        id: JobId,
        job_type: JobType,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        rotated_key: bool,
        error: String,
    },
    Completed {
        id: JobId,
        job_type: JobType,
        mime_type: String,
        bytes: usize,
    },
    Failed {
        id: JobId,
        job_type: JobType,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { id, .. }
            | Self::Started { id, .. }
            | Self::Retrying { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. } => *id,
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            Self::Queued { job_type, .. }
            | Self::Started { job_type, .. }
            | Self::Retrying { job_type, .. }
            | Self::Completed { job_type, .. }
            | Self::Failed { job_type, .. } => *job_type,
        }
    }

    /// The job reached `completed` or `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = JobEvent::Failed {
            id: JobId::new(),
            job_type: JobType::RemoveBackground,
            error: "PhotoRoom API key is missing.".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "failed");
        assert_eq!(json["job_type"], "remove-background");
        assert!(event.is_terminal());
    }
}
