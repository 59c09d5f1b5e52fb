//! Job submission, lookup and lifecycle commands.

use std::path::PathBuf;
use std::sync::Arc;

use sgen_media::materials::pick_random_track;
use sgen_media::render_subtitle_preview;
use sgen_models::{
    BgmSource, JobCreateRequest, JobId, JobRecord, JobStatus, Resolution, SubtitleStyle,
    RANDOM_PRESET,
};
use sgen_queue::JobQueue;
use sgen_store::{JobPage, JobStore};
use sgen_tts::{TtsEngine, Voice};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::executor::CANCELED_MESSAGE;
use crate::processor::{remove_work_dir, ProcessingContext};

/// Front door for callers: submits jobs and manages their records.
#[derive(Clone)]
pub struct JobService {
    config: Arc<WorkerConfig>,
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    tts: Arc<TtsEngine>,
}

impl JobService {
    pub fn new(config: WorkerConfig, store: Arc<JobStore>, queue: Arc<JobQueue>) -> Self {
        let tts = Arc::new(TtsEngine::new(config.tts_config()));
        Self {
            config: Arc::new(config),
            store,
            queue,
            tts,
        }
    }

    /// Share the store and queue of a processing context.
    pub fn for_context(ctx: &ProcessingContext) -> Self {
        Self::new(ctx.config.clone(), Arc::clone(&ctx.store), Arc::clone(&ctx.queue))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validate `request`, persist a pending record and enqueue it.
    ///
    /// Waits while the queue is full.
    pub async fn submit(&self, request: JobCreateRequest) -> WorkerResult<JobRecord> {
        let mut request = request.into_validated()?;

        if request.bgm.source == BgmSource::Preset && request.bgm.path == RANDOM_PRESET {
            match pick_random_track(&self.config.bgm_path).await {
                Some(track) => {
                    info!("Random background track resolved to {}", track);
                    request.bgm.path = track;
                }
                None => {
                    warn!("No background tracks in {}, disabling music", self.config.bgm_path.display());
                    request.bgm.source = BgmSource::None;
                    request.bgm.path.clear();
                }
            }
        }

        let record = JobRecord::new(JobId::new(), request, self.config.jobs_dir());
        self.store.insert(record.clone()).await?;
        if let Err(e) = self.queue.push(record.id.clone()).await {
            if let Err(rollback) = self.store.delete(&record.id).await {
                warn!(job_id = %record.id, "Could not remove unqueued job: {}", rollback);
            }
            return Err(e.into());
        }

        info!(job_id = %record.id, "Job submitted");
        Ok(record)
    }

    pub async fn get(&self, id: &JobId) -> WorkerResult<JobRecord> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| WorkerError::job_not_found(id.as_str()))
    }

    pub async fn list(&self, page: usize, limit: usize) -> JobPage {
        self.store.list(page, limit).await
    }

    /// Request cancellation.
    ///
    /// Pending jobs are marked canceled at once; running jobs are recorded as
    /// canceled when their run ends. Terminal jobs are returned unchanged.
    pub async fn cancel(&self, id: &JobId) -> WorkerResult<JobRecord> {
        let record = self.get(id).await?;
        if record.status.is_terminal() {
            return Ok(record);
        }

        self.queue.cancel(id).await;
        let record = self
            .store
            .modify(id, |r| {
                if r.status == JobStatus::Pending {
                    r.cancel(CANCELED_MESSAGE);
                }
            })
            .await?;

        if record.status == JobStatus::Canceled {
            info!(job_id = %id, "Pending job canceled");
        } else {
            info!(job_id = %id, "Cancellation recorded for running job");
        }
        Ok(record)
    }

    /// Remove the record and its working directory.
    pub async fn delete(&self, id: &JobId) -> WorkerResult<JobRecord> {
        let record = self.store.delete(id).await?;
        if !record.status.is_terminal() {
            self.queue.cancel(id).await;
        }
        remove_work_dir(&record.work_dir).await?;
        info!(job_id = %id, "Job deleted");
        Ok(record)
    }

    /// Remove every record and working directory. Returns the count removed.
    pub async fn delete_all(&self) -> WorkerResult<usize> {
        let removed = self.store.delete_all().await?;
        for record in &removed {
            if !record.status.is_terminal() {
                self.queue.cancel(&record.id).await;
            }
            if let Err(e) = remove_work_dir(&record.work_dir).await {
                warn!(job_id = %record.id, "Failed to remove work dir: {}", e);
            }
        }
        info!("Deleted {} jobs", removed.len());
        Ok(removed.len())
    }

    /// Output file of a successful job.
    pub async fn result_path(&self, id: &JobId) -> WorkerResult<PathBuf> {
        let record = self.get(id).await?;
        if record.status != JobStatus::Success {
            return Err(WorkerError::job_failed(format!(
                "job {} has no result (status {})",
                id,
                record.status.as_str()
            )));
        }

        let path = record.output_path();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(WorkerError::job_failed(format!("result file for job {} is missing", id)));
        }
        Ok(path)
    }

    /// Re-enqueue persisted pending jobs, oldest first.
    ///
    /// Jobs left `running` by a previous process are failed.
    pub async fn requeue_pending(&self) -> WorkerResult<usize> {
        for id in self.store.ids_with_status(JobStatus::Running).await {
            warn!(job_id = %id, "Job was interrupted by a restart");
            self.store
                .modify(&id, |r| r.fail("interrupted by worker restart"))
                .await?;
        }

        let pending = self.store.ids_with_status(JobStatus::Pending).await;
        for id in &pending {
            self.queue.push(id.clone()).await?;
        }
        if !pending.is_empty() {
            info!("Re-enqueued {} pending jobs", pending.len());
        }
        Ok(pending.len())
    }

    /// Voices offered by a TTS provider. Cached after the first call.
    pub async fn voices(&self, provider: &str) -> WorkerResult<Vec<Voice>> {
        Ok(self.tts.list_voices(provider).await?)
    }

    /// Render `text` in `style` as a still frame and return its path.
    pub async fn subtitle_preview(
        &self,
        text: &str,
        style: &SubtitleStyle,
        resolution: Resolution,
        background: &str,
    ) -> WorkerResult<PathBuf> {
        let previews = self.config.storage_path.join("previews");
        let name = Uuid::new_v4().to_string();
        let work_dir = previews.join(&name);
        let output = previews.join(format!("{}.png", name));

        let result = render_subtitle_preview(text, style, resolution, background, &work_dir, &output).await;
        if let Err(e) = remove_work_dir(&work_dir).await {
            warn!("Failed to remove preview dir: {}", e);
        }
        result?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgen_models::{BgmSettings, Material, MaterialKind, MaterialOrigin};
    use sgen_queue::QueueConfig;

    async fn service(dir: &std::path::Path) -> JobService {
        let config = WorkerConfig {
            storage_path: dir.to_path_buf(),
            bgm_path: dir.join("bgm"),
            ..WorkerConfig::default()
        };
        let store = Arc::new(JobStore::open_in(dir).await.unwrap());
        let queue = Arc::new(JobQueue::new(QueueConfig { capacity: 8 }));
        JobService::new(config, store, queue)
    }

    fn request() -> JobCreateRequest {
        JobCreateRequest {
            script: "Hello world".to_string(),
            materials: vec![Material {
                kind: MaterialKind::Image,
                source: MaterialOrigin::Upload,
                path: "/tmp/a.png".to_string(),
                duration_sec: 3.0,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_persists_and_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;

        let record = svc.submit(request()).await.unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.work_dir, dir.path().join("jobs").join(record.id.as_str()));
        assert_eq!(record.request.video.fps, 30);
        assert_eq!(svc.queue.pop().await, Some(record.id.clone()));
        assert_eq!(svc.get(&record.id).await.unwrap().id, record.id);
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_script() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;

        let mut req = request();
        req.script = "   ".to_string();
        assert!(matches!(svc.submit(req).await, Err(WorkerError::Request(_))));
        assert!(svc.store.is_empty().await);
        assert!(svc.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        svc.queue.close().await;

        let err = svc.submit(request()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Queue(sgen_queue::QueueError::Closed)));
        assert!(svc.store.is_empty().await);
        assert_eq!(svc.list(1, 20).await.total, 0);
    }

    #[tokio::test]
    async fn test_random_preset_without_tracks_disables_music() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;

        let mut req = request();
        req.bgm = BgmSettings {
            source: BgmSource::Preset,
            path: RANDOM_PRESET.to_string(),
            volume: 0.2,
        };
        let record = svc.submit(req).await.unwrap();
        assert_eq!(record.request.bgm.source, BgmSource::None);
    }

    #[tokio::test]
    async fn test_random_preset_picks_a_track() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("bgm")).await.unwrap();
        tokio::fs::write(dir.path().join("bgm/calm.mp3"), b"id3").await.unwrap();
        let svc = service(dir.path()).await;

        let mut req = request();
        req.bgm = BgmSettings {
            source: BgmSource::Preset,
            path: RANDOM_PRESET.to_string(),
            volume: 0.2,
        };
        let record = svc.submit(req).await.unwrap();
        assert_eq!(record.request.bgm.path, "calm.mp3");
    }

    #[tokio::test]
    async fn test_cancel_pending_marks_canceled() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let record = svc.submit(request()).await.unwrap();

        let canceled = svc.cancel(&record.id).await.unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);
        assert_eq!(canceled.progress, 0);
        assert_eq!(canceled.error_message.as_deref(), Some(CANCELED_MESSAGE));
        assert!(svc.queue.is_canceled(&record.id).await);
    }

    #[tokio::test]
    async fn test_cancel_running_leaves_status() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let record = svc.submit(request()).await.unwrap();
        svc.store
            .modify(&record.id, |r| {
                r.mark_running();
            })
            .await
            .unwrap();

        let after = svc.cancel(&record.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Running);
        assert!(svc.queue.is_canceled(&record.id).await);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let err = svc.cancel(&JobId::from_string("nope")).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let record = svc.submit(request()).await.unwrap();
        tokio::fs::create_dir_all(record.work_dir.join("tts")).await.unwrap();

        tokio_test::assert_ok!(svc.delete(&record.id).await);
        assert!(!record.work_dir.exists());
        assert!(svc.get(&record.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        svc.submit(request()).await.unwrap();
        svc.submit(request()).await.unwrap();

        assert_eq!(svc.delete_all().await.unwrap(), 2);
        assert_eq!(svc.list(1, 20).await.total, 0);
    }

    #[tokio::test]
    async fn test_result_path_requires_success_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let record = svc.submit(request()).await.unwrap();

        assert!(svc.result_path(&record.id).await.is_err());

        svc.store.modify(&record.id, |r| r.complete()).await.unwrap();
        assert!(svc.result_path(&record.id).await.is_err());

        tokio::fs::create_dir_all(&record.work_dir).await.unwrap();
        tokio::fs::write(record.output_path(), b"mp4").await.unwrap();
        assert_eq!(svc.result_path(&record.id).await.unwrap(), record.output_path());
    }

    #[tokio::test]
    async fn test_requeue_pending_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let pending = svc.submit(request()).await.unwrap();
        let running = svc.submit(request()).await.unwrap();
        svc.queue.pop().await;
        svc.queue.pop().await;
        svc.store
            .modify(&running.id, |r| {
                r.mark_running();
            })
            .await
            .unwrap();

        assert_eq!(svc.requeue_pending().await.unwrap(), 1);
        assert_eq!(svc.queue.pop().await, Some(pending.id));
        assert_eq!(svc.get(&running.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_voices_for_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path()).await;
        let err = svc.voices("polly").await.unwrap_err();
        assert!(matches!(err, WorkerError::Tts(sgen_tts::TtsError::UnknownProvider(_))));
    }
}
