//! Worker configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use sgen_tts::TtsConfig;

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Root for `jobs.json` and per-job working directories
    pub storage_path: PathBuf,
    /// Directory of preset background tracks
    pub bgm_path: PathBuf,
    pub queue_capacity: usize,
    /// AI segmentation is disabled without a key
    pub gemini_api_key: Option<String>,
    pub ai_model: String,
    pub ai_max_retries: u32,
    pub ai_retry_delay: Duration,
    pub ai_timeout: Duration,
    pub azure_tts_key: Option<String>,
    pub azure_tts_region: Option<String>,
    /// Concurrent encoder processes while rendering segments
    pub max_ffmpeg_processes: usize,
    /// Silence appended after every narration clip
    pub silence_pad_secs: f64,
    pub segment_timeout: Duration,
    pub concat_timeout: Duration,
    pub transition_timeout: Duration,
    pub compose_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("/data"),
            bgm_path: PathBuf::from("/assets/bgm"),
            queue_capacity: 100,
            gemini_api_key: None,
            ai_model: "gemini-2.0-flash".to_string(),
            ai_max_retries: 3,
            ai_retry_delay: Duration::from_secs(5),
            ai_timeout: Duration::from_secs(60),
            azure_tts_key: None,
            azure_tts_region: None,
            max_ffmpeg_processes: 1,
            silence_pad_secs: 0.2,
            segment_timeout: Duration::from_secs(120),
            concat_timeout: Duration::from_secs(120),
            transition_timeout: Duration::from_secs(600),
            compose_timeout: Duration::from_secs(300),
            download_timeout: Duration::from_secs(120),
        }
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("storage_path", &self.storage_path)
            .field("bgm_path", &self.bgm_path)
            .field("queue_capacity", &self.queue_capacity)
            .field("gemini_api_key", &redacted(&self.gemini_api_key))
            .field("ai_model", &self.ai_model)
            .field("ai_max_retries", &self.ai_max_retries)
            .field("ai_retry_delay", &self.ai_retry_delay)
            .field("ai_timeout", &self.ai_timeout)
            .field("azure_tts_key", &redacted(&self.azure_tts_key))
            .field("azure_tts_region", &self.azure_tts_region)
            .field("max_ffmpeg_processes", &self.max_ffmpeg_processes)
            .field("silence_pad_secs", &self.silence_pad_secs)
            .field("segment_timeout", &self.segment_timeout)
            .field("concat_timeout", &self.concat_timeout)
            .field("transition_timeout", &self.transition_timeout)
            .field("compose_timeout", &self.compose_timeout)
            .field("download_timeout", &self.download_timeout)
            .finish()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key).map(Duration::from_secs).unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_path: env_non_empty("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            bgm_path: env_non_empty("BGM_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.bgm_path),
            queue_capacity: env_parse("QUEUE_CAPACITY")
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.queue_capacity),
            gemini_api_key: env_non_empty("GEMINI_API_KEY"),
            ai_model: env_non_empty("AI_MODEL").unwrap_or(defaults.ai_model),
            ai_max_retries: env_parse("AI_MAX_RETRIES").unwrap_or(defaults.ai_max_retries),
            ai_retry_delay: env_secs("AI_RETRY_DELAY_SECS", defaults.ai_retry_delay),
            ai_timeout: env_secs("AI_TIMEOUT_SECS", defaults.ai_timeout),
            azure_tts_key: env_non_empty("AZURE_TTS_KEY"),
            azure_tts_region: env_non_empty("AZURE_TTS_REGION"),
            max_ffmpeg_processes: env_parse("WORKER_MAX_FFMPEG")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_ffmpeg_processes),
            silence_pad_secs: env_parse("SILENCE_PAD_SECS")
                .filter(|s: &f64| *s >= 0.0)
                .unwrap_or(defaults.silence_pad_secs),
            segment_timeout: env_secs("FFMPEG_SEGMENT_TIMEOUT_SECS", defaults.segment_timeout),
            concat_timeout: env_secs("FFMPEG_CONCAT_TIMEOUT_SECS", defaults.concat_timeout),
            transition_timeout: env_secs("FFMPEG_TRANSITION_TIMEOUT_SECS", defaults.transition_timeout),
            compose_timeout: env_secs("FFMPEG_COMPOSE_TIMEOUT_SECS", defaults.compose_timeout),
            download_timeout: env_secs("DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
        }
    }

    /// Parent of every job working directory.
    pub fn jobs_dir(&self) -> PathBuf {
        self.storage_path.join("jobs")
    }

    pub fn tts_config(&self) -> TtsConfig {
        TtsConfig {
            azure_key: self.azure_tts_key.clone(),
            azure_region: self.azure_tts_region.clone(),
            ..TtsConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.jobs_dir(), PathBuf::from("/data/jobs"));
        assert_eq!(config.ai_max_retries, 3);
        assert_eq!(config.ai_retry_delay, Duration::from_secs(5));
        assert_eq!(config.transition_timeout, Duration::from_secs(600));
        assert!((config.silence_pad_secs - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_tts_config_carries_credentials() {
        let config = WorkerConfig {
            azure_tts_key: Some("k".to_string()),
            azure_tts_region: Some("eastasia".to_string()),
            ..Default::default()
        };
        let tts = config.tts_config();
        assert_eq!(tts.azure_key.as_deref(), Some("k"));
        assert_eq!(tts.synth_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = WorkerConfig {
            gemini_api_key: Some("GEMINI-SECRET".to_string()),
            azure_tts_key: Some("AZURE-SECRET".to_string()),
            azure_tts_region: Some("eastasia".to_string()),
            ..Default::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("GEMINI-SECRET"));
        assert!(!printed.contains("AZURE-SECRET"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("eastasia"));

        let printed = format!("{:?}", WorkerConfig::default());
        assert!(printed.contains("gemini_api_key: None"));
    }
}
