//! FFmpeg filter graph builders.
//!
//! Every function here is pure: it only renders filter strings, so the
//! timing math can be tested without an encoder.

use std::path::Path;

use sgen_models::{MotionEffect, Resolution};

/// Extra seconds each non-final segment is rendered for when cross-fading.
pub const OVERLAP_MARGIN_SECS: f64 = 1.2;

/// Visual cross-fade length. Shorter than the margin to absorb rounding.
pub const FADE_SECS: f64 = 1.0;

/// Canonical mix sample rate.
pub const MIX_SAMPLE_RATE: u32 = 44100;

/// Canonical narration sample rate.
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Stereo silence at the mix sample rate.
pub const SILENT_STEREO: &str = "anullsrc=r=44100:cl=stereo";

/// Mono silence at the narration sample rate.
pub const SILENT_SPEECH: &str = "anullsrc=r=24000:cl=mono";

/// Audio normalization shared by every mixed stream.
pub const MIX_AUDIO_FORMAT: &str = "aformat=sample_fmts=fltp:sample_rates=44100:channel_layouts=stereo";

/// Leading and trailing silence removal for synthesized speech.
pub const SPEECH_TRIM: &str = concat!(
    "silenceremove=start_periods=1:start_duration=0:start_threshold=-50dB:detection=peak,",
    "areverse,",
    "silenceremove=start_periods=1:start_duration=0:start_threshold=-50dB:detection=peak,",
    "areverse"
);

/// Normalize a background color to something the pad filter accepts.
///
/// Empty means black, bare `RRGGBB` gains a `#` prefix, anything else is a
/// color name passed through.
pub fn pad_color(background: &str) -> String {
    let bg = background.trim();
    if bg.is_empty() {
        return "black".to_string();
    }
    if bg.len() == 6 && bg.chars().all(|c| c.is_ascii_hexdigit()) {
        return format!("#{}", bg);
    }
    bg.to_string()
}

/// Fit inside the frame and pad the rest with a solid color.
pub fn fit_pad_filter(res: Resolution, fps: u32, background: &str) -> String {
    let (w, h) = (res.width, res.height);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={color},setsar=1,fps={fps}",
        color = pad_color(background),
    )
}

/// Fit inside the frame over a blurred, cropped copy of the same picture.
pub fn blur_background_filter(res: Resolution, fps: u32) -> String {
    let (w, h) = (res.width, res.height);
    format!(
        "split[bg][fg];\
         [bg]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},\
         scale=iw/4:-1,boxblur=10:5,scale={w}:{h}:flags=neighbor[bg_blurred];\
         [fg]scale={w}:{h}:force_original_aspect_ratio=decrease[fg_scaled];\
         [bg_blurred][fg_scaled]overlay=(W-w)/2:(H-h)/2,setsar=1,fps={fps}"
    )
}

/// Slow zoom for still images, one output frame per input frame.
pub fn zoom_filter(effect: MotionEffect, res: Resolution, fps: u32, duration_secs: f64) -> Option<String> {
    let frames = ((duration_secs * fps as f64).round() as u64).max(1);
    let zoom = match effect {
        MotionEffect::None => return None,
        MotionEffect::ZoomIn => format!("min(1+0.2*on/{frames},1.2)"),
        MotionEffect::ZoomOut => format!("max(1.2-0.2*on/{frames},1)"),
    };
    Some(format!(
        "zoompan=z='{zoom}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={}x{}:fps={fps}",
        res.width, res.height
    ))
}

/// Hold the last frame for `seconds` so a cross-fade has content to use.
pub fn hold_last_frame(seconds: f64) -> String {
    format!("tpad=stop_mode=clone:stop_duration={:.2}", seconds)
}

/// Normalize a clip's own audio and pad it with silence to the render length.
pub fn clip_audio_filter(volume: f64) -> String {
    format!("{},volume={:.2},apad", MIX_AUDIO_FORMAT, volume.clamp(0.0, 1.0))
}

/// Quote a path for use as a filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Burn an ASS subtitle file into the video stream.
pub fn subtitles_filter(path: &Path) -> String {
    format!("subtitles={}", escape_filter_path(path))
}

/// Offsets at which each pairwise cross-fade starts.
///
/// Join `i` (between the merged prefix and segment `i + 1`) starts at the
/// sum of the actual durations of segments `0..=i` minus `(i + 1)` margins.
pub fn xfade_offsets(durations: &[f64]) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(durations.len().saturating_sub(1));
    let mut elapsed = 0.0;
    for (i, d) in durations.iter().take(durations.len().saturating_sub(1)).enumerate() {
        elapsed += d;
        offsets.push((elapsed - (i + 1) as f64 * OVERLAP_MARGIN_SECS).max(0.0));
    }
    offsets
}

/// Pairwise left-to-right cross-fade graph over `durations.len()` inputs.
///
/// Video fades over [`FADE_SECS`], audio over the full margin, so both
/// chains lose exactly one margin per join. Outputs `[outv]` and `[outa]`.
pub fn xfade_graph(transition: &str, durations: &[f64]) -> String {
    let offsets = xfade_offsets(durations);
    let joins = offsets.len();
    let mut parts = Vec::with_capacity(joins * 2);

    let mut video_label = "[0:v]".to_string();
    let mut audio_label = "[0:a]".to_string();

    for (i, offset) in offsets.iter().enumerate() {
        let next = i + 1;
        let (v_out, a_out) = if next == joins {
            ("[outv]".to_string(), "[outa]".to_string())
        } else {
            (format!("[v{next}]"), format!("[a{next}]"))
        };

        parts.push(format!(
            "{video_label}[{next}:v]xfade=transition={transition}:duration={FADE_SECS:.1}:offset={offset:.3}{v_out}"
        ));
        parts.push(format!(
            "{audio_label}[{next}:a]acrossfade=d={OVERLAP_MARGIN_SECS:.1}{a_out}"
        ));

        video_label = v_out;
        audio_label = a_out;
    }

    parts.join(";")
}

/// Inputs of the final audio/video mix.
///
/// Input 0 is the visual timeline, input 1 the narration, input 2 the
/// optional looped background music.
#[derive(Debug, Clone)]
pub struct MixPlan<'a> {
    pub subtitles: &'a Path,
    pub narration_secs: f64,
    pub final_secs: f64,
    pub bgm_volume: Option<f64>,
}

/// Subtitle burn plus the narration / clip audio / music mix.
/// Outputs `[vout]` and `[aout]`.
pub fn mix_graph(plan: &MixPlan<'_>) -> String {
    let mut parts = vec![
        format!("[0:v]{}[vout]", subtitles_filter(plan.subtitles)),
        format!(
            "[1:a]atrim=0:{:.3},asetpts=PTS-STARTPTS,{}[tts]",
            plan.narration_secs, MIX_AUDIO_FORMAT
        ),
        format!("[0:a]{}[video_audio]", MIX_AUDIO_FORMAT),
    ];

    let mix = match plan.bgm_volume {
        Some(volume) => {
            parts.push(format!(
                "[2:a]volume={:.2},atrim=0:{:.3},asetpts=PTS-STARTPTS,{}[bgm]",
                volume, plan.final_secs, MIX_AUDIO_FORMAT
            ));
            "[tts][video_audio][bgm]amix=inputs=3:duration=longest[aout]"
        }
        None => "[tts][video_audio]amix=inputs=2:duration=longest[aout]",
    };
    parts.push(mix.to_string());

    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT: Resolution = Resolution {
        width: 1080,
        height: 1920,
    };

    #[test]
    fn test_pad_color() {
        assert_eq!(pad_color(""), "black");
        assert_eq!(pad_color("ff8800"), "#ff8800");
        assert_eq!(pad_color("white"), "white");
    }

    #[test]
    fn test_fit_pad_filter() {
        let filter = fit_pad_filter(PORTRAIT, 30, "123abc");
        assert_eq!(
            filter,
            "scale=1080:1920:force_original_aspect_ratio=decrease,\
             pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=#123abc,setsar=1,fps=30"
        );
    }

    #[test]
    fn test_blur_filter_ends_with_frame_rate() {
        let filter = blur_background_filter(PORTRAIT, 25);
        assert!(filter.starts_with("split[bg][fg];"));
        assert!(filter.contains("boxblur=10:5"));
        assert!(filter.ends_with("setsar=1,fps=25"));
    }

    #[test]
    fn test_zoom_filter() {
        assert!(zoom_filter(MotionEffect::None, PORTRAIT, 30, 3.0).is_none());
        let zoom = zoom_filter(MotionEffect::ZoomIn, PORTRAIT, 30, 3.0).unwrap();
        assert!(zoom.contains("on/90"));
        assert!(zoom.contains("s=1080x1920"));
    }

    #[test]
    fn test_xfade_offsets_subtract_one_margin_per_join() {
        let offsets = xfade_offsets(&[3.2, 4.2, 2.0]);
        assert_eq!(offsets.len(), 2);
        assert!((offsets[0] - 2.0).abs() < 1e-9);
        assert!((offsets[1] - 5.0).abs() < 1e-9);
        assert!(xfade_offsets(&[3.0]).is_empty());
    }

    #[test]
    fn test_xfade_graph() {
        let graph = xfade_graph("fade", &[3.2, 4.2, 2.0]);
        assert_eq!(
            graph,
            "[0:v][1:v]xfade=transition=fade:duration=1.0:offset=2.000[v1];\
             [0:a][1:a]acrossfade=d=1.2[a1];\
             [v1][2:v]xfade=transition=fade:duration=1.0:offset=5.000[outv];\
             [a1][2:a]acrossfade=d=1.2[outa]"
        );
    }

    #[test]
    fn test_mix_graph_with_and_without_music() {
        let subs = Path::new("/jobs/1/subtitles.ass");
        let with_music = mix_graph(&MixPlan {
            subtitles: subs,
            narration_secs: 8.0,
            final_secs: 9.5,
            bgm_volume: Some(0.25),
        });
        assert!(with_music.contains("[0:v]subtitles='/jobs/1/subtitles.ass'[vout]"));
        assert!(with_music.contains("[1:a]atrim=0:8.000"));
        assert!(with_music.contains("[2:a]volume=0.25,atrim=0:9.500"));
        assert!(with_music.ends_with("amix=inputs=3:duration=longest[aout]"));

        let without = mix_graph(&MixPlan {
            subtitles: subs,
            narration_secs: 8.0,
            final_secs: 9.5,
            bgm_volume: None,
        });
        assert!(!without.contains("[2:a]"));
        assert!(without.ends_with("amix=inputs=2:duration=longest[aout]"));
    }

    #[test]
    fn test_escape_filter_path_quotes() {
        assert_eq!(escape_filter_path(Path::new("/tmp/it's.ass")), "'/tmp/it'\\''s.ass'");
    }
}
