//! Local `espeak` synthesis, the credential-free fallback.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sgen_media::run_tool;

use crate::error::TtsResult;
use crate::provider::{finish_clip, SpeechClip, SpeechSynthesizer, SynthesisRequest, Voice};

const PROGRAM: &str = "espeak";
const BASE_WPM: f64 = 175.0;
const VOICES_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EspeakProvider {
    timeout: Duration,
}

impl EspeakProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// espeak voice for a request.
    ///
    /// Cloud voice names (`zh-TW-HsiaoChenNeural`) mean nothing to espeak, so
    /// they map to the language of the locale.
    pub fn voice_for(request: &SynthesisRequest) -> String {
        let voice = request.voice.trim();
        if !voice.is_empty() && !voice.ends_with("Neural") {
            return voice.to_string();
        }
        request
            .locale
            .split(['-', '_'])
            .next()
            .filter(|lang| !lang.is_empty())
            .unwrap_or("en")
            .to_ascii_lowercase()
    }

    pub fn synth_args(request: &SynthesisRequest, output: &Path) -> Vec<String> {
        let wpm = (BASE_WPM * request.speed).round().max(80.0) as u32;
        let pitch = (50.0 + request.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
        vec![
            "-v".to_string(),
            Self::voice_for(request),
            "-s".to_string(),
            wpm.to_string(),
            "-p".to_string(),
            pitch.to_string(),
            "-w".to_string(),
            output.to_string_lossy().to_string(),
            request.text.clone(),
        ]
    }
}

/// Parse `espeak --voices` output.
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let language = cols[1];
            let gender = match cols[2].rsplit('/').next() {
                Some("M") => "Male",
                Some("F") => "Female",
                _ => "Unknown",
            };
            Some(Voice {
                name: language.to_string(),
                display_name: format!("{} ({}, {})", cols[3], language, gender),
                locale: language.to_string(),
                gender: gender.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl SpeechSynthesizer for EspeakProvider {
    fn name(&self) -> &'static str {
        "espeak"
    }

    async fn synthesize(&self, request: &SynthesisRequest, output_stem: &Path) -> TtsResult<SpeechClip> {
        let path = output_stem.with_extension("wav");
        run_tool(PROGRAM, &Self::synth_args(request, &path), self.timeout).await?;
        finish_clip(self.name(), path).await
    }

    async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
        let output = run_tool(PROGRAM, &["--voices".to_string()], VOICES_TIMEOUT).await?;
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}
