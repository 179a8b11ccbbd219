//! Export of job results
//!
//! Completed jobs are written either as individual files or bundled into one
//! zip archive. Entry names follow `{job_type}-{job_id}.{ext}`.

use std::collections::HashSet;
use std::fs;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::{Error, Result};
use crate::jobs::{Job, JobId, JobStatus};
use crate::media::MediaData;

/// Default archive file name: `{prefix}-{YYYY-MM-DD}.zip`
pub fn default_archive_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.zip", prefix, date.format("%Y-%m-%d"))
}

/// Why a selected job was left out of an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SkipReason {
    NotFound,
    NotCompleted { status: JobStatus },
    NoResult,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::NotCompleted { status } => write!(f, "job is {}", status),
            Self::NoResult => write!(f, "no result attached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedEntry {
    pub job_id: JobId,
    pub name: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedJob {
    pub job_id: JobId,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Outcome of an export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Archive or directory that was written
    pub path: Option<PathBuf>,
    pub written: Vec<ExportedEntry>,
    pub skipped: Vec<SkippedJob>,
}

impl ExportReport {
    pub fn total_bytes(&self) -> usize {
        self.written.iter().map(|e| e.bytes).sum()
    }
}

/// Jobs that can be exported, and the rest
struct Selection<'a> {
    entries: Vec<(&'a Job, String, &'a MediaData)>,
    skipped: Vec<SkippedJob>,
}

/// Pick the jobs to export. `None` selects every job given.
fn select<'a>(jobs: &'a [Job], selected: Option<&[JobId]>) -> Selection<'a> {
    let candidates: Vec<std::result::Result<&'a Job, JobId>> = match selected {
        None => jobs.iter().map(Ok).collect(),
        Some(ids) => {
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| seen.insert(**id))
                .map(|id| jobs.iter().find(|j| j.id == *id).ok_or(*id))
                .collect()
        }
    };

    let mut selection = Selection {
        entries: Vec::new(),
        skipped: Vec::new(),
    };
    for candidate in candidates {
        match candidate.map_err(|id| (id, SkipReason::NotFound)).and_then(exportable) {
            Ok(entry) => selection.entries.push(entry),
            Err((job_id, reason)) => selection.skipped.push(SkippedJob { job_id, reason }),
        }
    }
    selection
}

fn exportable(job: &Job) -> std::result::Result<(&Job, String, &MediaData), (JobId, SkipReason)> {
    if job.status != JobStatus::Completed {
        return Err((job.id, SkipReason::NotCompleted { status: job.status }));
    }
    match (job.result.as_ref(), job.result_file_name()) {
        (Some(media), Some(name)) if !media.is_empty() => Ok((job, name, media)),
        _ => Err((job.id, SkipReason::NoResult)),
    }
}

/// Write the selected results as a zip archive into `writer`
pub fn write_archive<W: Write + Seek>(
    writer: W,
    jobs: &[Job],
    selected: Option<&[JobId]>,
) -> Result<ExportReport> {
    let selection = select(jobs, selected);
    if selection.entries.is_empty() {
        return Err(Error::ArchiveError(
            "none of the selected jobs has a result to export".to_string(),
        ));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);
    let mut written = Vec::with_capacity(selection.entries.len());

    for (job, name, media) in selection.entries {
        debug!(job_id = %job.id, entry = %name, bytes = media.len(), "Adding archive entry");
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&media.bytes)?;
        written.push(ExportedEntry {
            job_id: job.id,
            name,
            bytes: media.len(),
        });
    }
    zip.finish()?;

    Ok(ExportReport {
        path: None,
        written,
        skipped: selection.skipped,
    })
}

/// Write the selected results to a zip file at `path`
pub fn export_archive(path: &Path, jobs: &[Job], selected: Option<&[JobId]>) -> Result<ExportReport> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // Fail before creating the file when there is nothing to write
    if select(jobs, selected).entries.is_empty() {
        return Err(Error::ArchiveError(
            "none of the selected jobs has a result to export".to_string(),
        ));
    }

    let file = fs::File::create(path)?;
    let mut report = write_archive(file, jobs, selected)?;
    report.path = Some(path.to_path_buf());

    info!(
        path = %path.display(),
        entries = report.written.len(),
        skipped = report.skipped.len(),
        bytes = report.total_bytes(),
        "Archive written"
    );
    Ok(report)
}

/// Write each selected result as its own file in `dir`
pub fn write_results(dir: &Path, jobs: &[Job], selected: Option<&[JobId]>) -> Result<ExportReport> {
    fs::create_dir_all(dir)?;
    let selection = select(jobs, selected);

    let mut written = Vec::with_capacity(selection.entries.len());
    for (job, name, media) in selection.entries {
        let path = dir.join(&name);
        fs::write(&path, &media.bytes)?;
        debug!(job_id = %job.id, path = %path.display(), "Result written");
        written.push(ExportedEntry {
            job_id: job.id,
            name,
            bytes: media.len(),
        });
    }

    Ok(ExportReport {
        path: Some(dir.to_path_buf()),
        written,
        skipped: selection.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobPayload, JobType};

    #[test]
    fn test_default_archive_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            default_archive_name("NC-Tool-Export", date),
            "NC-Tool-Export-2026-03-07.zip"
        );
    }

    #[test]
    fn test_select_dedupes_and_reports_unknown() {
        let mut job = Job::new(JobType::TextToImage, JobPayload::default().with_prompt("x"));
        job.status = JobStatus::Completed;
        job.result = Some(MediaData::new("image/png", vec![1]));
        let unknown = JobId::new();
        let jobs = vec![job.clone()];

        let selection = select(&jobs, Some(&[job.id, job.id, unknown]));
        assert_eq!(selection.entries.len(), 1);
        assert_eq!(
            selection.skipped,
            vec![SkippedJob {
                job_id: unknown,
                reason: SkipReason::NotFound
            }]
        );
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::NotCompleted {
            status: JobStatus::Failed,
        };
        assert_eq!(reason.to_string(), "job is failed");
    }
}
