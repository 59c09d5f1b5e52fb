//! Narration track assembly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::{SILENT_SPEECH, SPEECH_SAMPLE_RATE, SPEECH_TRIM};

const SHORT_TIMEOUT: Duration = Duration::from_secs(60);

/// Write `seconds` of mono 24 kHz PCM silence to `output`.
pub async fn create_silence(output: &Path, seconds: f64) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output)
        .lavfi(SILENT_SPEECH)
        .duration(seconds)
        .audio_codec("pcm_s16le");
    FfmpegRunner::new().with_timeout(SHORT_TIMEOUT).run(&cmd).await
}

/// Trim leading/trailing silence and convert a synthesized clip to mono
/// 24 kHz PCM at `output`.
///
/// When the conversion fails the raw clip is returned unchanged.
pub async fn prepare_speech_clip(raw: &Path, output: &Path) -> PathBuf {
    let cmd = FfmpegCommand::new(output)
        .input(raw)
        .audio_filter(SPEECH_TRIM)
        .audio_format(SPEECH_SAMPLE_RATE, 1)
        .audio_codec("pcm_s16le");

    match FfmpegRunner::new().with_timeout(SHORT_TIMEOUT).run(&cmd).await {
        Ok(()) => output.to_path_buf(),
        Err(e) => {
            warn!("Silence trim failed for {}, using raw clip: {}", raw.display(), e);
            raw.to_path_buf()
        }
    }
}

/// Concatenate clips, each followed by `silence`, into one PCM track.
pub async fn concat_narration(
    clips: &[PathBuf],
    silence: &Path,
    output: &Path,
    timeout: Duration,
) -> MediaResult<()> {
    let list_path = output.with_extension("txt");
    let entries: Vec<&Path> = clips
        .iter()
        .flat_map(|clip| [clip.as_path(), silence])
        .collect();
    tokio::fs::write(&list_path, concat_list(&entries)).await?;
    debug!("Concatenating {} narration clips into {}", clips.len(), output.display());

    let cmd = FfmpegCommand::new(output)
        .input_with(["-f", "concat", "-safe", "0"], list_path.to_string_lossy())
        .audio_format(SPEECH_SAMPLE_RATE, 1)
        .audio_codec("pcm_s16le");
    FfmpegRunner::new().with_timeout(timeout).run(&cmd).await
}

/// Render a concat demuxer list.
pub fn concat_list(paths: &[&Path]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}
