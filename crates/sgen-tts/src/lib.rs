//! Speech synthesis providers for the shorts generator.
//!
//! Providers form a closed set selected by name:
//! - `azure_v1` / `azure_v2`: Azure Speech REST (falls back to espeak without credentials)
//! - `edge_tts`: Microsoft Edge online voices via the `edge-tts` CLI
//! - `espeak`: local espeak

pub mod azure;
pub mod edge;
pub mod error;
pub mod espeak;
pub mod provider;

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::RwLock;
use tracing::debug;

pub use error::{TtsError, TtsResult};
pub use provider::{
    provider_names, SpeechClip, SpeechSynthesizer, SynthesisRequest, TtsConfig, TtsProvider, Voice,
};

/// Voice lists per provider, loaded on first use and kept for the process
/// lifetime.
#[derive(Debug, Default)]
pub struct VoiceCache {
    entries: RwLock<HashMap<String, Vec<Voice>>>,
}

impl VoiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load<S>(&self, key: &str, synthesizer: &S) -> TtsResult<Vec<Voice>>
    where
        S: SpeechSynthesizer + ?Sized,
    {
        if let Some(voices) = self.entries.read().await.get(key) {
            return Ok(voices.clone());
        }

        let mut entries = self.entries.write().await;
        // Another task may have loaded it while we waited for the lock
        if let Some(voices) = entries.get(key) {
            return Ok(voices.clone());
        }

        let voices = synthesizer.list_voices().await?;
        debug!("Cached {} voices for {}", voices.len(), key);
        entries.insert(key.to_string(), voices.clone());
        Ok(voices)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Provider selection plus the shared voice cache.
#[derive(Debug)]
pub struct TtsEngine {
    config: TtsConfig,
    voices: VoiceCache,
}

impl TtsEngine {
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            voices: VoiceCache::new(),
        }
    }

    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    /// Resolve a provider by its request name.
    pub fn provider(&self, name: &str) -> TtsResult<TtsProvider> {
        TtsProvider::from_name(name, &self.config)
    }

    /// Synthesize one utterance with the named provider.
    pub async fn synthesize(
        &self,
        provider: &str,
        request: &SynthesisRequest,
        output_stem: &Path,
    ) -> TtsResult<SpeechClip> {
        self.provider(provider)?.synthesize(request, output_stem).await
    }

    /// Voices of the named provider, cached by resolved provider.
    pub async fn list_voices(&self, provider: &str) -> TtsResult<Vec<Voice>> {
        let resolved = self.provider(provider)?;
        self.voices.get_or_load(resolved.name(), &resolved).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct CountingSynth {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn synthesize(&self, _request: &SynthesisRequest, _output_stem: &Path) -> TtsResult<SpeechClip> {
            Err(TtsError::invalid_audio("counting", "not supported"))
        }

        async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Voice {
                name: "v".to_string(),
                display_name: "V".to_string(),
                locale: "en-US".to_string(),
                gender: "Female".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn test_voice_cache_loads_once() {
        let cache = VoiceCache::new();
        let synth = CountingSynth {
            calls: AtomicUsize::new(0),
        };

        assert!(cache.is_empty().await);
        let first = cache.get_or_load("counting", &synth).await.unwrap();
        let second = cache.get_or_load("counting", &synth).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn test_engine_rejects_unknown_provider() {
        let engine = TtsEngine::new(TtsConfig::default());
        assert!(matches!(engine.provider("nope"), Err(TtsError::UnknownProvider(_))));
    }
}
