//! Structured job logging.

use sgen_models::{JobId, JobStatus};
use tracing::{error, info, warn, Span};

/// Job lifecycle logger carrying `job_id` and `operation` on every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job started: {}", message);
    }

    /// Log a pipeline checkpoint.
    pub fn log_progress(&self, progress: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            progress,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = %self.operation, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, operation = %self.operation, "Job error: {}", message);
    }

    /// Log the terminal status of a job.
    pub fn log_finished(&self, status: JobStatus, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            status = status.as_str(),
            elapsed_secs,
            "Job finished"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping everything done for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = %self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::from_string("job-123");
        let logger = JobLogger::new(&job_id, "generate_short");

        assert_eq!(logger.job_id(), "job-123");
        assert_eq!(logger.operation(), "generate_short");
    }
}
