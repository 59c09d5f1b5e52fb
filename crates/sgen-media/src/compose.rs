//! Final composition: subtitles, narration, clip audio and music.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::{mix_graph, MixPlan, MIX_SAMPLE_RATE};
use crate::progress::ProgressCallback;

/// Inputs of the final mix.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Merged visual timeline with its own audio track
    pub video: PathBuf,
    pub narration: PathBuf,
    pub subtitles: PathBuf,
    /// Background music and its volume
    pub bgm: Option<(PathBuf, f64)>,
    pub narration_secs: f64,
    pub video_secs: f64,
    pub output: PathBuf,
}

impl ComposeRequest {
    /// Length of the mixed output.
    pub fn final_secs(&self) -> f64 {
        self.narration_secs.max(self.video_secs)
    }
}

/// Encoder invocation for the final mix.
///
/// Music is looped indefinitely at the input and trimmed in the graph.
pub fn build_compose_command(req: &ComposeRequest) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&req.output)
        .input(&req.video)
        .input(&req.narration);

    if let Some((bgm, _)) = &req.bgm {
        cmd = cmd.input_with(["-stream_loop", "-1"], bgm.to_string_lossy());
    }

    let graph = mix_graph(&MixPlan {
        subtitles: &req.subtitles,
        narration_secs: req.narration_secs,
        final_secs: req.final_secs(),
        bgm_volume: req.bgm.as_ref().map(|(_, volume)| *volume),
    });

    cmd.filter_complex(graph)
        .map("[vout]")
        .map("[aout]")
        .video_codec("libx264")
        .preset("veryfast")
        .pixel_format("yuv420p")
        .audio_codec("aac")
        .audio_format(MIX_SAMPLE_RATE, 2)
        .shortest()
}

/// Compose the final video at `req.output`.
pub async fn compose(req: &ComposeRequest, timeout: Duration) -> MediaResult<PathBuf> {
    let cmd = build_compose_command(req);
    let total_secs = req.final_secs();

    let on_progress: ProgressCallback = Box::new(move |progress| {
        debug!(
            "Compose {:.0}% ({:?}s left)",
            progress.fraction_of(total_secs) * 100.0,
            progress.remaining_secs(total_secs)
        );
    });

    FfmpegRunner::new()
        .with_timeout(timeout)
        .run_with_progress(&cmd, on_progress)
        .await?;

    info!(
        "Composed {} ({:.2}s, music: {})",
        req.output.display(),
        req.final_secs(),
        req.bgm.is_some()
    );
    Ok(req.output.clone())
}

/// True when `path` exists and is non-empty.
pub async fn is_non_empty(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
