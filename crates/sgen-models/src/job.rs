//! Job identity, lifecycle and the persisted job record.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::JobCreateRequest;

/// File name of the final artifact inside a job's working directory.
pub const OUTPUT_FILE_NAME: &str = "output.mp4";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// `pending → running → {success, failed, canceled}`. A pending job may also
/// be canceled before it is ever dequeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// No further transitions happen from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result reference handed to API consumers for a finished job.
pub fn result_url_for(id: &JobId) -> String {
    format!("/api/v1/jobs/{}/result", id)
}

/// A job as stored in the record store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    pub id: JobId,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    pub request: JobCreateRequest,

    /// Private working directory holding materials, intermediates and output.
    pub work_dir: PathBuf,
}

impl JobRecord {
    /// Create a pending record whose working directory lives under `jobs_root`.
    pub fn new(id: JobId, request: JobCreateRequest, jobs_root: impl AsRef<Path>) -> Self {
        let now = Utc::now();
        let work_dir = jobs_root.as_ref().join(id.as_str());
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
            result_url: None,
            request,
            work_dir,
        }
    }

    /// Path of the final artifact.
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(OUTPUT_FILE_NAME)
    }

    /// Move a pending job to running. Returns false and leaves the record
    /// untouched in any other state.
    pub fn mark_running(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.error_message = None;
        self.touch();
        true
    }

    /// Raise progress. Values never go backwards and are capped at 100.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
        self.touch();
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Success;
        self.progress = 100;
        self.result_url = Some(result_url_for(&self.id));
        self.touch();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.progress = 0;
        self.error_message = Some(message.into());
        self.touch();
    }

    pub fn cancel(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Canceled;
        self.progress = 0;
        self.error_message = Some(message.into());
        self.result_url = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
