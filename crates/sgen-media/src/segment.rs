//! Per-segment normalization and merging into one visual timeline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use sgen_models::{MaterialKind, Resolution, VideoSettings};
use tracing::{debug, info, warn};

use crate::audio::concat_list;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    blur_background_filter, clip_audio_filter, fit_pad_filter, hold_last_frame, xfade_graph,
    zoom_filter, MIX_SAMPLE_RATE, OVERLAP_MARGIN_SECS, SILENT_STEREO,
};
use crate::probe::{probe_duration, probe_media};
use crate::timeline::Segment;

/// Shortest render without transitions.
const MIN_PLAIN_SECS: f64 = 0.1;

/// How segments are normalized and joined.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub resolution: Resolution,
    pub fps: u32,
    pub background: String,
    pub blur_background: bool,
    /// Cross-fade transition name, `None` for hard cuts.
    pub transition: Option<String>,
    /// Segments rendered concurrently.
    pub max_parallel: usize,
    pub segment_timeout: Duration,
    pub concat_timeout: Duration,
    pub transition_timeout: Duration,
}

impl RenderSettings {
    /// Settings for a job's video section with default timeouts.
    pub fn from_video(video: &VideoSettings) -> Self {
        Self {
            resolution: video.resolution(),
            fps: if video.fps == 0 { 30 } else { video.fps },
            background: video.background.clone(),
            blur_background: video.blur_background,
            transition: video.transition().map(str::to_string),
            max_parallel: 1,
            segment_timeout: Duration::from_secs(120),
            concat_timeout: Duration::from_secs(120),
            transition_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_timeouts(mut self, segment: Duration, concat: Duration, transition: Duration) -> Self {
        self.segment_timeout = segment;
        self.concat_timeout = concat;
        self.transition_timeout = transition;
        self
    }
}

/// A normalized clip and its measured length.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSegment {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// The merged visual timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTimeline {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Audio track of a rendered segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentAudio {
    /// Generated stereo silence
    Silent,
    /// The clip's own audio at the given volume
    Clip { volume: f64 },
}

/// Renders visual segments with the encoder.
#[derive(Debug, Clone)]
pub struct SegmentRenderer {
    settings: RenderSettings,
}

impl SegmentRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Seconds to render for `segment`.
    ///
    /// With transitions every non-final segment carries one overlap margin of
    /// extra content and the final one is at least one margin long.
    pub fn render_duration(&self, segment: &Segment, is_last: bool) -> f64 {
        let secs = segment.duration_secs();
        match (&self.settings.transition, is_last) {
            (Some(_), false) => (secs + OVERLAP_MARGIN_SECS).max(OVERLAP_MARGIN_SECS + 1.0),
            (Some(_), true) => secs.max(OVERLAP_MARGIN_SECS),
            (None, _) => secs.max(MIN_PLAIN_SECS),
        }
    }

    /// Video filter chain for a segment rendered for `seconds`.
    pub fn video_filter(&self, segment: &Segment, seconds: f64) -> String {
        let s = &self.settings;
        let mut filter = if s.blur_background {
            blur_background_filter(s.resolution, s.fps)
        } else {
            fit_pad_filter(s.resolution, s.fps, &s.background)
        };

        match segment.kind {
            MaterialKind::Image => {
                if let Some(zoom) = zoom_filter(segment.effect, s.resolution, s.fps, seconds) {
                    filter.push(',');
                    filter.push_str(&zoom);
                }
            }
            MaterialKind::Video => {
                if s.transition.is_some() {
                    filter.push(',');
                    filter.push_str(&hold_last_frame(OVERLAP_MARGIN_SECS));
                }
            }
        }

        filter
    }

    /// Encoder invocation for one segment.
    pub fn segment_command(
        &self,
        segment: &Segment,
        seconds: f64,
        output: &Path,
        audio: SegmentAudio,
    ) -> FfmpegCommand {
        let fps = self.settings.fps.to_string();
        let secs = format!("{:.3}", seconds);

        let cmd = FfmpegCommand::new(output);
        let cmd = match segment.kind {
            MaterialKind::Image => cmd.input_with(
                ["-loop", "1", "-framerate", fps.as_str(), "-t", secs.as_str()],
                segment.source.to_string_lossy(),
            ),
            MaterialKind::Video => cmd.input(&segment.source),
        };

        let cmd = match audio {
            SegmentAudio::Silent => cmd.lavfi_for(SILENT_STEREO, seconds).map("0:v").map("1:a"),
            SegmentAudio::Clip { volume } => cmd
                .map("0:v")
                .map("0:a")
                .audio_filter(clip_audio_filter(volume)),
        };

        cmd.video_filter(self.video_filter(segment, seconds))
            .video_codec("libx264")
            .preset("veryfast")
            .pixel_format("yuv420p")
            .output_args(["-r", fps.as_str()])
            .audio_codec("aac")
            .audio_format(MIX_SAMPLE_RATE, 2)
            .duration(seconds)
    }

    /// Render every segment, preserving order.
    ///
    /// Up to `max_parallel` encoders run at once. `on_rendered(done, total)`
    /// is awaited after each segment in timeline order.
    pub async fn render_all<F, Fut>(
        &self,
        segments: &[Segment],
        out_dir: &Path,
        mut on_rendered: F,
    ) -> MediaResult<Vec<RenderedSegment>>
    where
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = ()>,
    {
        tokio::fs::create_dir_all(out_dir).await?;
        let total = segments.len();

        let jobs: Vec<_> = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| self.render_segment(index, total, segment, out_dir))
            .collect();
        let mut stream = futures::stream::iter(jobs).buffered(self.settings.max_parallel.max(1));

        let mut rendered = Vec::with_capacity(total);
        while let Some(result) = stream.next().await {
            rendered.push(result?);
            on_rendered(rendered.len(), total).await;
        }

        info!("Rendered {} segments", rendered.len());
        Ok(rendered)
    }

    async fn render_segment(
        &self,
        index: usize,
        total: usize,
        segment: &Segment,
        out_dir: &Path,
    ) -> MediaResult<RenderedSegment> {
        let seconds = self.render_duration(segment, index + 1 == total);
        let output = out_dir.join(format!("seg_{:03}.mp4", index));
        let runner = FfmpegRunner::new().with_timeout(self.settings.segment_timeout);

        let keep_audio = segment.kind == MaterialKind::Video
            && !segment.mute
            && probe_media(&segment.source)
                .await
                .map(|info| info.has_audio)
                .unwrap_or(false);

        if keep_audio {
            let cmd = self.segment_command(
                segment,
                seconds,
                &output,
                SegmentAudio::Clip {
                    volume: segment.volume,
                },
            );
            if let Err(e) = runner.run(&cmd).await {
                warn!(
                    "Segment {} failed with clip audio, retrying with silence: {}",
                    index, e
                );
                runner
                    .run(&self.segment_command(segment, seconds, &output, SegmentAudio::Silent))
                    .await?;
            }
        } else {
            runner
                .run(&self.segment_command(segment, seconds, &output, SegmentAudio::Silent))
                .await?;
        }

        // Offsets downstream use what the encoder actually produced
        let duration_secs = measured_or_requested(index, probe_duration(&output).await, seconds);
        debug!(
            "Segment {} requested {:.3}s, rendered {:.3}s",
            index, seconds, duration_secs
        );

        Ok(RenderedSegment {
            path: output,
            duration_secs,
        })
    }

    /// Encoder invocation that joins rendered segments.
    ///
    /// Cross-fades need a transition and at least two segments, otherwise the
    /// concat demuxer copies streams listed in `list_path`.
    pub fn merge_command(&self, rendered: &[RenderedSegment], output: &Path, list_path: &Path) -> FfmpegCommand {
        match self.settings.transition.as_deref() {
            Some(transition) if rendered.len() >= 2 => {
                let durations: Vec<f64> = rendered.iter().map(|r| r.duration_secs).collect();
                rendered
                    .iter()
                    .fold(FfmpegCommand::new(output), |cmd, r| cmd.input(&r.path))
                    .filter_complex(xfade_graph(transition, &durations))
                    .map("[outv]")
                    .map("[outa]")
                    .video_codec("libx264")
                    .preset("veryfast")
                    .pixel_format("yuv420p")
                    .audio_codec("aac")
                    .audio_format(MIX_SAMPLE_RATE, 2)
            }
            _ => FfmpegCommand::new(output)
                .input_with(["-f", "concat", "-safe", "0"], list_path.to_string_lossy())
                .output_args(["-c", "copy"]),
        }
    }

    /// Join rendered segments into `output` and measure the result.
    pub async fn merge(&self, rendered: &[RenderedSegment], output: &Path) -> MediaResult<RenderedTimeline> {
        if rendered.is_empty() {
            return Err(MediaError::internal("no segments to merge"));
        }

        let list_path = output.with_extension("txt");
        let cross_fade = self.settings.transition.is_some() && rendered.len() >= 2;
        let timeout = if cross_fade {
            self.settings.transition_timeout
        } else {
            let paths: Vec<&Path> = rendered.iter().map(|r| r.path.as_path()).collect();
            tokio::fs::write(&list_path, concat_list(&paths)).await?;
            self.settings.concat_timeout
        };

        let cmd = self.merge_command(rendered, output, &list_path);
        FfmpegRunner::new().with_timeout(timeout).run(&cmd).await?;

        let duration_secs = probe_duration(output).await?;
        info!(
            "Merged {} segments into {} ({:.2}s, cross-fade: {})",
            rendered.len(),
            output.display(),
            duration_secs,
            cross_fade
        );

        Ok(RenderedTimeline {
            path: output.to_path_buf(),
            duration_secs,
        })
    }
}

/// Measured segment length, or the requested one when probing failed.
fn measured_or_requested(index: usize, measured: MediaResult<f64>, requested: f64) -> f64 {
    match measured {
        Ok(secs) => secs,
        Err(e) => {
            warn!("Could not measure segment {}, assuming {:.3}s: {}", index, requested, e);
            requested
        }
    }
}
