use crate::domain::ladder::Rendition;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Container types accepted for packaging.
pub const ALLOWED_VIDEO_TYPES: [&str; 6] = [
    "video/mp4",
    "video/mkv",
    "video/x-matroska",
    "video/webm",
    "video/avi",
    "video/x-msvideo",
];

pub fn is_allowed_video_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_VIDEO_TYPES.contains(&essence.as_str())
}

/// An uploaded source waiting to be packaged.
#[derive(Debug, Clone)]
pub struct SourceUpload {
    pub path: PathBuf,
    pub content_type: Option<String>,
}

/// One end-to-end packaging request. Owns `work_dir` and the uploaded source.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub source: SourceUpload,
    pub work_dir: PathBuf,
}

impl Job {
    pub fn new(source: SourceUpload, work_root: &Path) -> Self {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let work_dir = work_root.join(format!("{}_{}", id, created_at.format("%Y%m%dT%H%M%SZ")));

        Self {
            id,
            created_at,
            source,
            work_dir,
        }
    }

    /// Remote folder for the master playlist.
    pub fn remote_folder(&self) -> String {
        self.id.to_string()
    }

    /// Remote folder for one rendition's segments and manifest.
    pub fn rendition_folder(&self, rendition: &Rendition) -> String {
        format!("{}/{}", self.id, rendition.name())
    }

    /// Remove the work directory and the uploaded source. Missing paths are fine.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => tracing::debug!(job_id = %self.id, "Removed {:?}", self.work_dir),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(job_id = %self.id, "Failed to remove {:?}: {}", self.work_dir, e),
        }

        match tokio::fs::remove_file(&self.source.path).await {
            Ok(()) => tracing::debug!(job_id = %self.id, "Deleted input file {:?}", self.source.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job_id = %self.id, "Failed to delete {:?}: {}", self.source.path, e)
            }
        }
    }
}

/// Coordinator lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Planning,
    FanningOut,
    Publishing,
    Finalizing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_advance_to(self, next: JobState) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, JobState::Failed) => true,
            (JobState::Finalizing, JobState::Succeeded) => true,
            (_, JobState::Succeeded) => false,
            (from, to) => to as u8 == from as u8 + 1,
        }
    }
}

/// A rendition whose manifest has been published.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRendition {
    pub rendition: Rendition,
    pub manifest_url: String,
}

/// Final artifact references for a successful job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub master: String,
    /// Ascending by height.
    pub renditions: Vec<PublishedRendition>,
}

impl Serialize for JobResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.renditions.len() + 1))?;
        map.serialize_entry("master", &self.master)?;
        for published in &self.renditions {
            map.serialize_entry(&published.rendition.name(), &published.manifest_url)?;
        }
        map.end()
    }
}
