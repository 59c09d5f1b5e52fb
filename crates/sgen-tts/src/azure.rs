//! Azure Speech REST provider.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{TtsError, TtsResult};
use crate::provider::{finish_clip, SpeechClip, SpeechSynthesizer, SynthesisRequest, TtsConfig, Voice};

const OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

/// Azure Cognitive Services text-to-speech.
#[derive(Debug, Clone)]
pub struct AzureProvider {
    client: Client,
    key: String,
    base_url: String,
    synth_timeout: Duration,
    voices_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AzureVoice {
    short_name: String,
    #[serde(default)]
    local_name: String,
    #[serde(default)]
    locale: String,
    #[serde(default)]
    gender: String,
}

impl AzureProvider {
    pub fn new(key: &str, region: &str, config: &TtsConfig) -> TtsResult<Self> {
        let base_url = config
            .azure_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.tts.speech.microsoft.com", region));

        Ok(Self {
            client: Client::builder().build()?,
            key: key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            synth_timeout: config.synth_timeout,
            voices_timeout: config.voices_timeout,
        })
    }
}

/// Escape text for inclusion in SSML.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// SSML document for one utterance.
pub fn build_ssml(request: &SynthesisRequest) -> String {
    let voice = if request.voice.trim().is_empty() {
        format!("{}-AriaNeural", request.locale)
    } else {
        request.voice.clone()
    };
    format!(
        "<speak version='1.0' xml:lang='{locale}'><voice name='{voice}'>\
         <prosody rate='{rate}' pitch='{pitch:+.0}%'>{text}</prosody></voice></speak>",
        locale = escape_xml(&request.locale),
        voice = escape_xml(&voice),
        rate = request.rate_percent(),
        pitch = request.pitch * 100.0,
        text = escape_xml(&request.text),
    )
}

#[async_trait]
impl SpeechSynthesizer for AzureProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn synthesize(&self, request: &SynthesisRequest, output_stem: &Path) -> TtsResult<SpeechClip> {
        let url = format!("{}/cognitiveservices/v1", self.base_url);
        debug!("Azure TTS request for {} chars", request.text.chars().count());

        let response = self
            .client
            .post(&url)
            .timeout(self.synth_timeout)
            .header("Content-Type", "application/ssml+xml")
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(build_ssml(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Api {
                provider: "azure",
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let path = output_stem.with_extension("wav");
        tokio::fs::write(&path, &bytes).await?;

        finish_clip(self.name(), path).await
    }

    async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
        let url = format!("{}/cognitiveservices/voices/list", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.voices_timeout)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Api {
                provider: "azure",
                status: status.as_u16(),
                body,
            });
        }

        let raw: Vec<AzureVoice> = response
            .json()
            .await
            .map_err(|e| TtsError::VoiceList(e.to_string()))?;

        info!("Azure offers {} voices", raw.len());
        Ok(raw
            .into_iter()
            .map(|v| Voice {
                display_name: format!("{} ({}, {})", v.local_name, v.locale, v.gender),
                name: v.short_name,
                locale: v.locale,
                gender: v.gender,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice: String::new(),
            locale: "zh-TW".to_string(),
            speed: 1.2,
            pitch: -0.1,
        }
    }

    async fn provider(server: &MockServer) -> AzureProvider {
        let config = TtsConfig {
            azure_base_url: Some(server.uri()),
            ..Default::default()
        };
        AzureProvider::new("secret", "eastasia", &config).unwrap()
    }

    #[test]
    fn test_ssml_escapes_and_maps_prosody() {
        let ssml = build_ssml(&request("A & B <tag>"));
        assert!(ssml.contains("xml:lang='zh-TW'"));
        assert!(ssml.contains("<voice name='zh-TW-AriaNeural'>"));
        assert!(ssml.contains("rate='+20%'"));
        assert!(ssml.contains("pitch='-10%'"));
        assert!(ssml.contains("A &amp; B &lt;tag&gt;"));
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cognitiveservices/v1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = provider(&server)
            .await
            .synthesize(&request("hello"), &dir.path().join("line_0"))
            .await
            .unwrap_err();

        assert!(matches!(err, TtsError::Api { status: 401, ref body, .. } if body == "denied"));
    }

    #[tokio::test]
    async fn test_tiny_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cognitiveservices/v1"))
            .and(header("X-Microsoft-OutputFormat", OUTPUT_FORMAT))
            .and(header("Ocp-Apim-Subscription-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 44]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = provider(&server)
            .await
            .synthesize(&request("hello"), &dir.path().join("line_0"))
            .await
            .unwrap_err();

        assert!(matches!(err, TtsError::InvalidAudio { .. }));
        assert!(dir.path().join("line_0.wav").exists());
    }

    #[tokio::test]
    async fn test_list_voices() {
        let server = MockServer::start().await;
        let body = serde_json::json!([
            {"ShortName": "zh-TW-HsiaoChenNeural", "LocalName": "曉臻", "Locale": "zh-TW", "Gender": "Female", "DisplayName": "HsiaoChen"},
            {"ShortName": "en-US-GuyNeural", "LocalName": "Guy", "Locale": "en-US", "Gender": "Male"}
        ]);
        Mock::given(method("GET"))
            .and(path("/cognitiveservices/voices/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let voices = provider(&server).await.list_voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].name, "zh-TW-HsiaoChenNeural");
        assert_eq!(voices[0].display_name, "曉臻 (zh-TW, Female)");
        assert_eq!(voices[1].gender, "Male");
    }
}
