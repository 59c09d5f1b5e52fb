//! Executor and service integration tests. None of these reach the encoder.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sgen_models::{JobCreateRequest, JobId, JobRecord, JobStatus, Material, MaterialKind, MaterialOrigin};
use sgen_queue::{JobQueue, QueueConfig};
use sgen_store::JobStore;
use sgen_worker::{JobExecutor, JobService, ProcessingContext, WorkerConfig};
use tokio::task::JoinHandle;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    service: JobService,
    executor: Arc<JobExecutor>,
    queue: Arc<JobQueue>,
}

async fn harness(dir: &Path) -> Harness {
    let config = WorkerConfig {
        storage_path: dir.to_path_buf(),
        bgm_path: dir.join("bgm"),
        download_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    };
    let store = Arc::new(JobStore::open_in(dir).await.unwrap());
    let queue = Arc::new(JobQueue::new(QueueConfig { capacity: 8 }));
    let ctx = Arc::new(
        ProcessingContext::new(config, Arc::clone(&store), Arc::clone(&queue), None).unwrap(),
    );

    Harness {
        service: JobService::for_context(&ctx),
        executor: Arc::new(JobExecutor::new(ctx)),
        queue,
    }
}

fn start(executor: &Arc<JobExecutor>) -> JoinHandle<()> {
    let executor = Arc::clone(executor);
    tokio::spawn(async move {
        executor.run().await.unwrap();
    })
}

fn request_with(material: Material) -> JobCreateRequest {
    JobCreateRequest {
        script: "第一句話。第二句話。".to_string(),
        materials: vec![material],
        ..Default::default()
    }
}

fn missing_upload() -> Material {
    Material {
        kind: MaterialKind::Image,
        source: MaterialOrigin::Upload,
        path: "/nonexistent/sgen/material.png".to_string(),
        duration_sec: 2.0,
        ..Default::default()
    }
}

async fn wait_for<F>(service: &JobService, id: &JobId, pred: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let record = service.get(id).await.unwrap();
        if pred(&record) {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {} (status {})",
            id,
            record.status.as_str()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_canceled_before_dequeue_never_runs() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;

    let record = h.service.submit(request_with(missing_upload())).await.unwrap();
    h.service.cancel(&record.id).await.unwrap();

    h.executor.execute_job(record.id.clone()).await;

    let after = h.service.get(&record.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Canceled);
    assert_eq!(after.progress, 0);
    assert!(!after.work_dir.exists());
    assert!(!h.queue.is_canceled(&record.id).await);
}

#[tokio::test]
async fn test_queue_flag_alone_skips_job() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;

    let record = h.service.submit(request_with(missing_upload())).await.unwrap();
    h.queue.cancel(&record.id).await;
    h.executor.execute_job(record.id.clone()).await;

    assert_eq!(h.service.get(&record.id).await.unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_job_canceled_after_queue_check_stays_canceled() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let store = &h.executor.context().store;

    // Canceled in the store after the executor's queue-flag check
    let record = h.service.submit(request_with(missing_upload())).await.unwrap();
    store.modify(&record.id, |r| r.cancel("canceled by user")).await.unwrap();

    h.executor.execute_job(record.id.clone()).await;

    let after = h.service.get(&record.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Canceled);
    assert_eq!(after.error_message.as_deref(), Some("canceled by user"));
    assert_eq!(after.progress, 0);
}

#[tokio::test]
async fn test_already_running_job_is_not_started_twice() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let store = &h.executor.context().store;

    let record = h.service.submit(request_with(missing_upload())).await.unwrap();
    store
        .modify(&record.id, |r| {
            r.mark_running();
        })
        .await
        .unwrap();

    h.executor.execute_job(record.id.clone()).await;

    // The pipeline would have failed it on the missing upload
    assert_eq!(h.service.get(&record.id).await.unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_failed_job_records_error_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let runner = start(&h.executor);

    let first = h.service.submit(request_with(missing_upload())).await.unwrap();
    let second = h.service.submit(request_with(missing_upload())).await.unwrap();

    for id in [&first.id, &second.id] {
        let done = wait_for(&h.service, id, |r| r.status.is_terminal()).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.progress, 0);
        assert!(done.error_message.is_some());
        assert!(done.result_url.is_none());
    }

    h.executor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_while_running_is_recorded_at_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let runner = start(&h.executor);

    let material = Material {
        kind: MaterialKind::Image,
        source: MaterialOrigin::Url,
        path: format!("{}/slow.png", server.uri()),
        duration_sec: 2.0,
        ..Default::default()
    };
    let record = h.service.submit(request_with(material)).await.unwrap();

    let running = wait_for(&h.service, &record.id, |r| r.status == JobStatus::Running).await;
    assert!(running.progress >= 5);

    let after_cancel = h.service.cancel(&record.id).await.unwrap();
    assert_eq!(after_cancel.status, JobStatus::Running);

    let done = wait_for(&h.service, &record.id, |r| r.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Canceled);
    assert_eq!(done.progress, 0);
    assert!(!done.work_dir.exists());

    h.executor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_idle_executor() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;
    let runner = start(&h.executor);

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.executor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_closed_queue_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path()).await;

    h.queue.close().await;
    tokio::time::timeout(Duration::from_secs(5), h.executor.run())
        .await
        .unwrap()
        .unwrap();
}
