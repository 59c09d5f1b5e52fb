//! Microsoft Edge online voices through the `edge-tts` CLI.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sgen_media::run_tool;

use crate::error::TtsResult;
use crate::provider::{finish_clip, SpeechClip, SpeechSynthesizer, SynthesisRequest, Voice};

const PROGRAM: &str = "edge-tts";
const DEFAULT_VOICE: &str = "zh-TW-HsiaoChenNeural";

/// Hertz per unit of relative pitch.
const PITCH_HZ_SCALE: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct EdgeProvider {
    synth_timeout: Duration,
    voices_timeout: Duration,
}

impl EdgeProvider {
    pub fn new(synth_timeout: Duration, voices_timeout: Duration) -> Self {
        Self {
            synth_timeout,
            voices_timeout,
        }
    }

    /// CLI arguments writing `request` to `output`.
    pub fn synth_args(request: &SynthesisRequest, output: &Path) -> Vec<String> {
        let voice = if request.voice.trim().is_empty() {
            DEFAULT_VOICE
        } else {
            request.voice.as_str()
        };
        // `=` keeps negative values from being read as flags
        vec![
            "--voice".to_string(),
            voice.to_string(),
            format!("--rate={}", request.rate_percent()),
            format!("--pitch={:+.0}Hz", request.pitch * PITCH_HZ_SCALE),
            "--text".to_string(),
            request.text.clone(),
            "--write-media".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// Locale prefix of a voice short name, `zh-TW-HsiaoChenNeural` → `zh-TW`.
pub fn locale_of(short_name: &str) -> String {
    let mut parts = short_name.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(lang), Some(region)) => format!("{}-{}", lang, region),
        _ => String::new(),
    }
}

/// Parse `edge-tts --list-voices` output.
///
/// Accepts the `Name: ...` / `Gender: ...` block format and the tabular one.
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    let mut voices = Vec::new();
    let mut pending: Option<String> = None;

    let mut push = |name: String, gender: String| {
        let locale = locale_of(&name);
        voices.push(Voice {
            display_name: format!("{} ({}, {})", name, locale, gender),
            name,
            locale,
            gender,
        });
    };

    for line in output.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Name:") {
            pending = Some(name.trim().to_string());
        } else if let Some(gender) = line.strip_prefix("Gender:") {
            if let Some(name) = pending.take() {
                push(name, gender.trim().to_string());
            }
        } else {
            let mut cols = line.split_whitespace();
            if let (Some(name), Some(gender)) = (cols.next(), cols.next()) {
                if name.matches('-').count() >= 2 && name.ends_with("Neural") {
                    push(name.to_string(), gender.to_string());
                }
            }
        }
    }

    voices
}

#[async_trait]
impl SpeechSynthesizer for EdgeProvider {
    fn name(&self) -> &'static str {
        "edge_tts"
    }

    async fn synthesize(&self, request: &SynthesisRequest, output_stem: &Path) -> TtsResult<SpeechClip> {
        let path = output_stem.with_extension("mp3");
        run_tool(PROGRAM, &Self::synth_args(request, &path), self.synth_timeout).await?;
        finish_clip(self.name(), path).await
    }

    async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
        let output = run_tool(PROGRAM, &["--list-voices".to_string()], self.voices_timeout).await?;
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}
