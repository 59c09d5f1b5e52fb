//! Provider abstraction and selection by name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sgen_models::TtsSettings;
use tracing::warn;

use crate::azure::AzureProvider;
use crate::edge::EdgeProvider;
use crate::error::{TtsError, TtsResult};
use crate::espeak::EspeakProvider;

/// Smallest response accepted as real audio.
pub const MIN_AUDIO_BYTES: u64 = 100;

/// One utterance to synthesize.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub locale: String,
    /// 1.0 is normal speed
    pub speed: f64,
    /// Relative pitch, -1.0 to 1.0
    pub pitch: f64,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, settings: &TtsSettings) -> Self {
        Self {
            text: text.into(),
            voice: settings.voice.clone(),
            locale: settings.locale.clone(),
            speed: if settings.speed > 0.0 { settings.speed } else { 1.0 },
            pitch: settings.pitch.clamp(-1.0, 1.0),
        }
    }

    /// Speaking rate as a signed percentage, e.g. `+25%`.
    pub fn rate_percent(&self) -> String {
        format!("{:+.0}%", (self.speed - 1.0) * 100.0)
    }
}

/// A synthesized audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// A voice offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub display_name: String,
    pub locale: String,
    pub gender: String,
}

/// Provider credentials and timeouts.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub azure_key: Option<String>,
    pub azure_region: Option<String>,
    /// Overrides `https://{region}.tts.speech.microsoft.com`
    pub azure_base_url: Option<String>,
    pub synth_timeout: Duration,
    pub voices_timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            azure_key: None,
            azure_region: None,
            azure_base_url: None,
            synth_timeout: Duration::from_secs(30),
            voices_timeout: Duration::from_secs(10),
        }
    }
}

impl TtsConfig {
    fn azure_credentials(&self) -> Option<(&str, &str)> {
        let key = self.azure_key.as_deref().filter(|k| !k.trim().is_empty())?;
        let region = self.azure_region.as_deref().filter(|r| !r.trim().is_empty())?;
        Some((key, region))
    }
}

/// Text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Synthesize `request` next to `output_stem`; the provider picks the
    /// file extension.
    async fn synthesize(&self, request: &SynthesisRequest, output_stem: &Path) -> TtsResult<SpeechClip>;

    async fn list_voices(&self) -> TtsResult<Vec<Voice>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Azure,
    Edge,
    Espeak,
}

const PROVIDERS: &[(&str, ProviderKind)] = &[
    ("azure_v1", ProviderKind::Azure),
    ("azure_v2", ProviderKind::Azure),
    ("edge_tts", ProviderKind::Edge),
    ("espeak", ProviderKind::Espeak),
];

/// Every provider name accepted by [`TtsProvider::from_name`].
pub fn provider_names() -> impl Iterator<Item = &'static str> {
    PROVIDERS.iter().map(|(name, _)| *name)
}

/// The closed set of speech providers.
#[derive(Debug, Clone)]
pub enum TtsProvider {
    Azure(AzureProvider),
    Edge(EdgeProvider),
    Espeak(EspeakProvider),
}

impl TtsProvider {
    /// Select a provider by name.
    ///
    /// Azure without a key or region degrades to espeak.
    pub fn from_name(name: &str, config: &TtsConfig) -> TtsResult<Self> {
        let kind = PROVIDERS
            .iter()
            .find(|(n, _)| *n == name.trim())
            .map(|(_, kind)| *kind)
            .ok_or_else(|| TtsError::UnknownProvider(name.to_string()))?;

        Ok(match kind {
            ProviderKind::Azure => match config.azure_credentials() {
                Some((key, region)) => Self::Azure(AzureProvider::new(key, region, config)?),
                None => {
                    warn!("Azure TTS credentials missing, falling back to espeak");
                    Self::Espeak(EspeakProvider::new(config.synth_timeout))
                }
            },
            ProviderKind::Edge => Self::Edge(EdgeProvider::new(config.synth_timeout, config.voices_timeout)),
            ProviderKind::Espeak => Self::Espeak(EspeakProvider::new(config.synth_timeout)),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::Azure(p) => p.name(),
            Self::Edge(p) => p.name(),
            Self::Espeak(p) => p.name(),
        }
    }

    async fn synthesize(&self, request: &SynthesisRequest, output_stem: &Path) -> TtsResult<SpeechClip> {
        match self {
            Self::Azure(p) => p.synthesize(request, output_stem).await,
            Self::Edge(p) => p.synthesize(request, output_stem).await,
            Self::Espeak(p) => p.synthesize(request, output_stem).await,
        }
    }

    async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
        match self {
            Self::Azure(p) => p.list_voices().await,
            Self::Edge(p) => p.list_voices().await,
            Self::Espeak(p) => p.list_voices().await,
        }
    }
}

/// Reject missing or header-only audio files and measure the rest.
pub(crate) async fn finish_clip(provider: &'static str, path: PathBuf) -> TtsResult<SpeechClip> {
    let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
    if size < MIN_AUDIO_BYTES {
        return Err(TtsError::invalid_audio(
            provider,
            format!("audio file too small ({} bytes)", size),
        ));
    }

    let duration_secs = sgen_media::probe_duration(&path).await?;
    Ok(SpeechClip { path, duration_secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(speed: f64, pitch: f64) -> TtsSettings {
        TtsSettings {
            provider: "edge_tts".to_string(),
            voice: String::new(),
            locale: "zh-TW".to_string(),
            speed,
            pitch,
        }
    }

    #[test]
    fn test_rate_percent() {
        assert_eq!(SynthesisRequest::new("hi", &settings(1.0, 0.0)).rate_percent(), "+0%");
        assert_eq!(SynthesisRequest::new("hi", &settings(1.25, 0.0)).rate_percent(), "+25%");
        assert_eq!(SynthesisRequest::new("hi", &settings(0.5, 0.0)).rate_percent(), "-50%");
        assert_eq!(SynthesisRequest::new("hi", &settings(0.0, 0.0)).rate_percent(), "+0%");
    }

    #[test]
    fn test_pitch_is_clamped() {
        assert_eq!(SynthesisRequest::new("hi", &settings(1.0, 3.0)).pitch, 1.0);
        assert_eq!(SynthesisRequest::new("hi", &settings(1.0, -2.0)).pitch, -1.0);
    }

    #[test]
    fn test_lookup_by_name() {
        let config = TtsConfig::default();
        assert_eq!(TtsProvider::from_name("edge_tts", &config).unwrap().name(), "edge_tts");
        assert_eq!(TtsProvider::from_name("espeak", &config).unwrap().name(), "espeak");
        assert!(matches!(
            TtsProvider::from_name("polly", &config),
            Err(TtsError::UnknownProvider(name)) if name == "polly"
        ));
        assert_eq!(provider_names().count(), 4);
    }

    #[test]
    fn test_azure_without_credentials_degrades() {
        let mut config = TtsConfig::default();
        assert_eq!(TtsProvider::from_name("azure_v1", &config).unwrap().name(), "espeak");

        config.azure_key = Some("key".to_string());
        config.azure_region = Some("  ".to_string());
        assert_eq!(TtsProvider::from_name("azure_v2", &config).unwrap().name(), "espeak");

        config.azure_region = Some("eastasia".to_string());
        assert_eq!(TtsProvider::from_name("azure_v2", &config).unwrap().name(), "azure");
    }

    #[tokio::test]
    async fn test_finish_clip_rejects_tiny_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.wav");
        tokio::fs::write(&path, [0u8; 44]).await.unwrap();

        let err = finish_clip("azure", path).await.unwrap_err();
        assert!(matches!(err, TtsError::InvalidAudio { provider: "azure", .. }));
    }
}
