//! The short-video generation pipeline.
//!
//! Stages run strictly in order and persist progress at each checkpoint:
//! materials (15), speech per line (15..35), narration (35), segments
//! (35..70), merged video (70), composition (95).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sgen_media::{
    build_visual_timeline, compose, concat_narration, create_silence, prepare_speech_clip,
    probe_duration, write_ass, ComposeRequest, MaterialFetcher, PreparedMaterial, RenderSettings,
    SegmentRenderer,
};
use sgen_models::{
    build_timeline_float, reconcile, sanitize_for_tts, scale_factor, JobId, JobRecord, Line,
};
use sgen_queue::JobQueue;
use sgen_store::JobStore;
use sgen_tts::{SpeechSynthesizer, SynthesisRequest, TtsEngine};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::gemini::{GeminiClient, TextSegmentation};
use crate::logging::JobLogger;
use crate::retry::RetryConfig;
use crate::segmenter::TextSegmenter;

pub const PROGRESS_RUNNING: u8 = 5;
pub const PROGRESS_MATERIALS: u8 = 15;
pub const PROGRESS_NARRATION: u8 = 35;
pub const PROGRESS_VIDEO: u8 = 70;
pub const PROGRESS_COMPOSED: u8 = 95;

/// Shared dependencies of the pipeline.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<JobStore>,
    pub queue: Arc<JobQueue>,
    pub tts: TtsEngine,
    pub segmenter: TextSegmenter,
    pub fetcher: MaterialFetcher,
}

impl ProcessingContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<JobStore>,
        queue: Arc<JobQueue>,
        ai: Option<Arc<dyn TextSegmentation>>,
    ) -> WorkerResult<Self> {
        let retry = RetryConfig::new("ai_segmentation")
            .with_max_retries(config.ai_max_retries)
            .with_delay(config.ai_retry_delay);

        Ok(Self {
            tts: TtsEngine::new(config.tts_config()),
            segmenter: TextSegmenter::new(ai, retry),
            fetcher: MaterialFetcher::new(config.download_timeout)?,
            config,
            store,
            queue,
        })
    }

    /// Build the context, enabling Gemini when an API key is configured.
    pub fn from_config(config: WorkerConfig, store: Arc<JobStore>, queue: Arc<JobQueue>) -> WorkerResult<Self> {
        let ai: Option<Arc<dyn TextSegmentation>> = match &config.gemini_api_key {
            Some(key) => Some(Arc::new(GeminiClient::new(
                key.clone(),
                config.ai_model.clone(),
                config.ai_timeout,
            )?)),
            None => None,
        };
        Self::new(config, store, queue, ai)
    }
}

/// Persists monotonic progress for one job.
pub struct ProgressReporter<'a> {
    store: &'a JobStore,
    job_id: &'a JobId,
    logger: &'a JobLogger,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(store: &'a JobStore, job_id: &'a JobId, logger: &'a JobLogger) -> Self {
        Self { store, job_id, logger }
    }

    /// Store `progress`. Persistence failures are logged, never fatal.
    pub async fn report(&self, progress: u8, message: &str) {
        match self.store.modify(self.job_id, |r| r.set_progress(progress)).await {
            Ok(_) => self.logger.log_progress(progress, message),
            Err(e) => self.logger.log_warning(&format!("Failed to persist progress {}: {}", progress, e)),
        }
    }
}

/// Linear progress between two checkpoints after `done` of `total` steps.
pub fn interpolate(from: u8, to: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return to;
    }
    let span = (to - from) as usize;
    from + (span * done.min(total) / total) as u8
}

/// Narration and the subtitle lines timed against it.
#[derive(Debug, Clone)]
pub struct Narration {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub lines: Vec<Line>,
}

/// Run the whole pipeline for `record`, returning the output path.
pub async fn process_job(ctx: &ProcessingContext, record: &JobRecord) -> WorkerResult<PathBuf> {
    let logger = JobLogger::new(&record.id, "generate_short");
    let progress = ProgressReporter::new(&ctx.store, &record.id, &logger);
    let request = &record.request;
    let work_dir = record.work_dir.as_path();

    logger.log_start(&format!("{} materials", request.materials.len()));
    tokio::fs::create_dir_all(work_dir).await?;

    let materials = ctx.fetcher.prepare_materials(&request.materials, work_dir).await?;
    progress.report(PROGRESS_MATERIALS, "materials ready").await;

    let (texts, source) = ctx
        .segmenter
        .segment(&request.script, request.subtitle_style.max_line_width)
        .await;
    if texts.is_empty() {
        return Err(WorkerError::processing_failed("script produced no subtitle lines"));
    }
    info!(job_id = %record.id, lines = texts.len(), ?source, "Script segmented");

    let narration = synthesize_narration(ctx, record, &texts, &progress).await?;
    progress.report(PROGRESS_NARRATION, "narration ready").await;

    let subtitles = work_dir.join("subtitles.ass");
    write_ass(&subtitles, &narration.lines, &request.subtitle_style).await?;

    let video = render_video(ctx, record, &materials, narration.duration_secs, &progress).await?;
    progress.report(PROGRESS_VIDEO, "video ready").await;

    let bgm = ctx
        .fetcher
        .prepare_bgm(&request.bgm, &ctx.config.bgm_path, work_dir)
        .await?
        .map(|path| (path, request.bgm.volume));

    let output = compose(
        &ComposeRequest {
            video: video.0,
            narration: narration.path,
            subtitles,
            bgm,
            narration_secs: narration.duration_secs,
            video_secs: video.1,
            output: record.output_path(),
        },
        ctx.config.compose_timeout,
    )
    .await?;
    progress.report(PROGRESS_COMPOSED, "composed").await;

    Ok(output)
}

/// Synthesize every line, build the narration track and time the subtitles
/// against its measured length.
async fn synthesize_narration(
    ctx: &ProcessingContext,
    record: &JobRecord,
    texts: &[String],
    progress: &ProgressReporter<'_>,
) -> WorkerResult<Narration> {
    let request = &record.request;
    let tts_dir = record.work_dir.join("tts");
    tokio::fs::create_dir_all(&tts_dir).await?;

    let provider = ctx.tts.provider(&request.tts.provider)?;
    info!(job_id = %record.id, provider = provider.name(), "Synthesizing {} lines", texts.len());

    let silence = record.work_dir.join("silence.wav");
    create_silence(&silence, ctx.config.silence_pad_secs).await?;
    let silence_secs = probe_duration(&silence)
        .await
        .unwrap_or(ctx.config.silence_pad_secs);

    let mut clips = Vec::with_capacity(texts.len());
    let mut durations = Vec::with_capacity(texts.len());

    for (i, text) in texts.iter().enumerate() {
        let spoken = sanitize_for_tts(text);
        let spoken = if spoken.trim().is_empty() { text.clone() } else { spoken };

        let clip = provider
            .synthesize(
                &SynthesisRequest::new(spoken, &request.tts),
                &tts_dir.join(format!("line_{}_raw", i)),
            )
            .await?;
        let trimmed = prepare_speech_clip(&clip.path, &tts_dir.join(format!("line_{}.wav", i))).await;
        let secs = match probe_duration(&trimmed).await {
            Ok(secs) => secs,
            Err(e) => {
                warn!("Could not measure {}, using provider duration: {}", trimmed.display(), e);
                clip.duration_secs
            }
        };

        debug!("Line {} spoken in {:.3}s", i, secs);
        clips.push(trimmed);
        durations.push(secs + silence_secs);

        progress
            .report(
                interpolate(PROGRESS_MATERIALS, PROGRESS_NARRATION, i + 1, texts.len()),
                "speech synthesized",
            )
            .await;
    }

    let path = record.work_dir.join("narration.wav");
    concat_narration(&clips, &silence, &path, ctx.config.concat_timeout).await?;
    let duration_secs = probe_duration(&path).await?;

    let predicted: f64 = durations.iter().sum();
    let k = scale_factor(predicted, duration_secs);
    info!(
        job_id = %record.id,
        predicted_secs = predicted,
        measured_secs = duration_secs,
        scale = k,
        "Reconciling subtitle timeline"
    );
    let lines = reconcile(&build_timeline_float(texts, &durations), k);

    Ok(Narration {
        path,
        duration_secs,
        lines,
    })
}

/// Build, render and merge the visual timeline. Returns the merged file and
/// its measured length.
async fn render_video(
    ctx: &ProcessingContext,
    record: &JobRecord,
    materials: &[PreparedMaterial],
    narration_secs: f64,
    progress: &ProgressReporter<'_>,
) -> WorkerResult<(PathBuf, f64)> {
    let target_ms = (narration_secs * 1000.0).round() as i64;
    let segments = build_visual_timeline(materials, target_ms);
    if segments.is_empty() {
        return Err(WorkerError::processing_failed("visual timeline is empty"));
    }

    let cfg = &ctx.config;
    let renderer = SegmentRenderer::new(
        RenderSettings::from_video(&record.request.video)
            .with_max_parallel(cfg.max_ffmpeg_processes)
            .with_timeouts(cfg.segment_timeout, cfg.concat_timeout, cfg.transition_timeout),
    );

    let segments_dir = record.work_dir.join("segments");
    let rendered = renderer
        .render_all(&segments, &segments_dir, move |done, total| {
            progress.report(
                interpolate(PROGRESS_NARRATION, PROGRESS_VIDEO, done, total),
                "segment rendered",
            )
        })
        .await?;

    let merged = renderer.merge(&rendered, &record.work_dir.join("video.mp4")).await?;
    Ok((merged.path, merged.duration_secs))
}

/// Remove a job's working directory if present.
pub async fn remove_work_dir(work_dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(work_dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
