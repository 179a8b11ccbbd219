//! Mediaqueue Core Integration Tests

use std::io::{Cursor, Read};
use std::sync::Arc;

use async_trait::async_trait;
use mediaqueue_core::{
    Error, Result,
    archive::{self, SkipReason},
    config::Config,
    credentials::Credentials,
    jobs::{JobPayload, JobQueue, JobStatus, JobType, NewJob, QueueOptions, RetryPolicy},
    media::MediaData,
    providers::{JobRunner, ProviderRouter},
};

/// Produces a fake PNG for images and a fake MP4 for videos
struct StubRunner;

#[async_trait]
impl JobRunner for StubRunner {
    async fn run(&self, job_type: JobType, payload: &JobPayload) -> Result<MediaData> {
        if payload.prompt_text() == Some("fail") {
            return Err(Error::GenerationFailed("refused".to_string()));
        }
        Ok(match job_type {
            JobType::GenerateVideo => {
                MediaData::from_bytes(vec![0, 0, 0, 0x18, b'f', b't', b'y', b'p'], "video/mp4")
            }
            _ => MediaData::new("image/png", vec![0x89, 0x50, 0x4E, 0x47, 1, 2, 3]),
        })
    }
}

fn fast_options() -> QueueOptions {
    QueueOptions {
        max_concurrent: 2,
        retry: RetryPolicy::immediate(3),
        start_stagger: std::time::Duration::ZERO,
    }
}

fn png_input() -> MediaData {
    MediaData::new("image/png", vec![0x89, 0x50, 0x4E, 0x47])
}

#[tokio::test]
async fn test_queue_to_archive_workflow() {
    let queue = JobQueue::new(Arc::new(StubRunner), fast_options());
    let ids = queue
        .add_jobs(vec![
            NewJob::new(JobType::TextToImage, JobPayload::default().with_prompt("a fox")),
            NewJob::new(JobType::GenerateVideo, JobPayload::default().with_prompt("waves")),
            NewJob::new(JobType::TextToImage, JobPayload::default().with_prompt("fail")),
        ])
        .unwrap();
    queue.start().unwrap();
    let stats = queue.wait_idle(Some(std::time::Duration::from_secs(10))).await.unwrap();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);

    let jobs = queue.jobs();
    let mut buffer = Cursor::new(Vec::new());
    let report = archive::write_archive(&mut buffer, &jobs, Some(&ids)).unwrap();

    assert_eq!(report.written.len(), 2);
    assert_eq!(report.written[0].name, format!("text-to-image-{}.png", ids[0]));
    assert_eq!(report.written[1].name, format!("generate-video-{}.mp4", ids[1]));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].job_id, ids[2]);
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::NotCompleted {
            status: JobStatus::Failed
        }
    );

    let mut zip = zip::ZipArchive::new(Cursor::new(buffer.into_inner())).unwrap();
    assert_eq!(zip.len(), 2);
    let mut entry = zip
        .by_name(&format!("text-to-image-{}.png", ids[0]))
        .unwrap();
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, vec![0x89, 0x50, 0x4E, 0x47, 1, 2, 3]);
}

#[tokio::test]
async fn test_export_archive_to_disk() {
    let queue = JobQueue::new(Arc::new(StubRunner), fast_options());
    queue
        .add_job(NewJob::new(
            JobType::RemoveBackground,
            JobPayload::default().with_image(png_input(), Some("shoe.png".into())),
        ))
        .unwrap();
    queue.start().unwrap();
    queue.wait_idle(None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exports").join("batch.zip");
    let report = archive::export_archive(&path, &queue.jobs(), None).unwrap();

    assert!(path.exists());
    assert_eq!(report.path.as_deref(), Some(path.as_path()));
    assert_eq!(report.written.len(), 1);
    assert!(report.written[0].name.starts_with("remove-background-"));
}

#[test]
fn test_export_with_nothing_to_write_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.zip");
    let err = archive::export_archive(&path, &[], None).unwrap_err();
    assert!(matches!(err, Error::ArchiveError(_)));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_write_results_to_directory() {
    let queue = JobQueue::new(Arc::new(StubRunner), fast_options());
    let ids = queue
        .add_jobs(vec![
            NewJob::new(JobType::TextToImage, JobPayload::default().with_prompt("one")),
            NewJob::new(JobType::TextToImage, JobPayload::default().with_prompt("two")),
        ])
        .unwrap();
    queue.start().unwrap();
    queue.wait_idle(None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let report = archive::write_results(dir.path(), &queue.jobs(), None).unwrap();
    assert_eq!(report.written.len(), 2);
    for id in ids {
        assert!(dir.path().join(format!("text-to-image-{}.png", id)).exists());
    }
}

#[tokio::test]
async fn test_router_without_credentials_fails_every_job() {
    let router = ProviderRouter::new(&Config::default(), Credentials::default()).unwrap();
    let queue = JobQueue::new(Arc::new(router), fast_options());

    let ids = queue
        .add_jobs(vec![
            NewJob::new(JobType::TextToImage, JobPayload::default().with_prompt("x")),
            NewJob::new(
                JobType::RemoveBackground,
                JobPayload::default().with_image(png_input(), None),
            ),
            NewJob::new(JobType::GenerateVideo, JobPayload::default().with_prompt("y")),
        ])
        .unwrap();
    queue.start().unwrap();
    let stats = queue.wait_idle(None).await.unwrap();
    assert_eq!(stats.failed, 3);

    let errors: Vec<String> = ids
        .iter()
        .map(|id| queue.get(*id).unwrap().error.unwrap())
        .collect();
    assert_eq!(
        errors,
        vec![
            "Gemini API key is missing.",
            "PhotoRoom API key is missing.",
            "Gemini API key is missing.",
        ]
    );
    assert!(queue.jobs().iter().all(|j| j.attempts == 0));
}

#[test]
fn test_batch_file_deserializes_into_jobs() {
    let json = r#"[
        {"type": "text-to-image", "payload": {"prompt": "a red fox", "aspect_ratio": "16:9"}},
        {"type": "generate-video", "payload": {"prompt": "waves", "resolution": "1080p"}},
        {"type": "remove-background", "payload": {"image": "data:image/png;base64,iVBORw0KGgo="}}
    ]"#;
    let jobs: Vec<NewJob> = serde_json::from_str(json).unwrap();
    assert_eq!(jobs.len(), 3);
    for job in &jobs {
        job.payload.validate_for(job.job_type).unwrap();
    }
    assert_eq!(jobs[2].payload.image.as_ref().unwrap().mime_type, "image/png");
}
