//! Job submission request, validation and documented defaults.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{RequestError, RequestResult};

/// Preset path that asks for a randomly chosen background track.
pub const RANDOM_PRESET: &str = "random";

pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 1080,
    height: 1920,
};
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_BACKGROUND: &str = "black";
pub const DEFAULT_TRANSITION: &str = "none";
pub const DEFAULT_TTS_PROVIDER: &str = "edge_tts";
pub const DEFAULT_LOCALE: &str = "zh-TW";
pub const DEFAULT_SPEED: f64 = 1.0;
pub const DEFAULT_BGM_VOLUME: f64 = 0.25;
pub const DEFAULT_MATERIAL_VOLUME: f64 = 1.0;
pub const DEFAULT_FONT: &str = "Noto Sans CJK TC";
pub const DEFAULT_FONT_SIZE: u32 = 36;
pub const DEFAULT_FONT_COLOR: &str = "FFFFFF";
pub const DEFAULT_OUTLINE_COLOR: &str = "000000";
pub const DEFAULT_OUTLINE_WIDTH: f64 = 0.1;
pub const DEFAULT_MAX_LINE_WIDTH: usize = 16;

/// Visual material type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    #[default]
    Image,
    Video,
}

/// Where a material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialOrigin {
    #[default]
    Upload,
    Url,
}

/// Motion applied to still images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MotionEffect {
    #[default]
    None,
    ZoomIn,
    ZoomOut,
}

/// One visual source of the video timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
pub struct Material {
    #[serde(rename = "type", default)]
    pub kind: MaterialKind,

    #[serde(default)]
    pub source: MaterialOrigin,

    /// Local path (uploads) or URL.
    #[validate(length(min = 1, message = "material path is required"))]
    pub path: String,

    /// Display duration hint in seconds.
    #[validate(range(exclusive_min = 0.0, message = "duration_sec must be positive"))]
    pub duration_sec: f64,

    /// Drop the clip's own audio (videos only).
    #[serde(default)]
    pub mute: bool,

    /// Clip audio volume 0-1 (videos only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub volume: Option<f64>,

    #[serde(default)]
    pub effect: MotionEffect,
}

impl Material {
    pub fn volume(&self) -> f64 {
        self.volume.unwrap_or(DEFAULT_MATERIAL_VOLUME)
    }

    pub fn is_url(&self) -> bool {
        self.source == MaterialOrigin::Url
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
pub struct TtsSettings {
    /// Provider name, e.g. `azure_v1`, `edge_tts`, `espeak`.
    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub voice: String,

    #[serde(default)]
    pub locale: String,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 4.0))]
    pub speed: f64,

    /// Relative pitch, -1.0 to 1.0. Providers clamp out-of-range values.
    #[serde(default)]
    pub pitch: f64,
}

/// Output video settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
pub struct VideoSettings {
    /// `WxH`, e.g. `1080x1920`.
    #[serde(default)]
    pub resolution: String,

    #[serde(default)]
    #[validate(range(max = 120))]
    pub fps: u32,

    /// Pad color: a color name or `RRGGBB`.
    #[serde(default)]
    pub background: String,

    #[serde(default)]
    pub blur_background: bool,

    /// Cross-fade transition name understood by the encoder, or `none`.
    #[serde(default)]
    pub transition: String,
}

impl VideoSettings {
    /// Parsed resolution, falling back to the default portrait size.
    pub fn resolution(&self) -> Resolution {
        Resolution::parse(&self.resolution).unwrap_or(DEFAULT_RESOLUTION)
    }

    /// Transition name when cross-fades are requested.
    pub fn transition(&self) -> Option<&str> {
        let name = self.transition.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(DEFAULT_TRANSITION) {
            None
        } else {
            Some(name)
        }
    }
}

/// Background music source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BgmSource {
    #[default]
    None,
    Preset,
    Upload,
    Url,
}

impl BgmSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BgmSource::None => "none",
            BgmSource::Preset => "preset",
            BgmSource::Upload => "upload",
            BgmSource::Url => "url",
        }
    }
}

/// Background music settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
pub struct BgmSettings {
    #[serde(default)]
    pub source: BgmSource,

    /// Preset file name, upload path or URL.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub volume: f64,
}

/// Subtitle appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
pub struct SubtitleStyle {
    #[serde(default)]
    pub font: String,

    #[serde(default)]
    pub size: u32,

    /// `RRGGBB`
    #[serde(default)]
    pub color: String,

    /// Bottom margin in pixels.
    #[serde(default)]
    pub y_offset: u32,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub outline_width: f64,

    /// `RRGGBB`
    #[serde(default)]
    pub outline_color: String,

    /// Characters per on-screen line.
    #[serde(default)]
    pub max_line_width: usize,
}

/// A validated job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate, Default)]
pub struct JobCreateRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub script: String,

    #[validate(length(min = 1, message = "at least one material is required"), nested)]
    pub materials: Vec<Material>,

    #[serde(default)]
    #[validate(nested)]
    pub tts: TtsSettings,

    #[serde(default)]
    #[validate(nested)]
    pub video: VideoSettings,

    #[serde(default)]
    #[validate(nested)]
    pub bgm: BgmSettings,

    #[serde(default)]
    #[validate(nested)]
    pub subtitle_style: SubtitleStyle,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("script must not be empty".into());
        return Err(err);
    }
    Ok(())
}

impl JobCreateRequest {
    /// Validate the request and fill every unset field with its default.
    pub fn into_validated(mut self) -> RequestResult<Self> {
        self.validate()?;

        if self.bgm.source != BgmSource::None && self.bgm.path.trim().is_empty() {
            return Err(RequestError::invalid(format!(
                "bgm.path is required when bgm.source is {}",
                self.bgm.source.as_str()
            )));
        }

        if !self.video.resolution.is_empty() && Resolution::parse(&self.video.resolution).is_none()
        {
            return Err(RequestError::invalid(format!(
                "video.resolution must look like WIDTHxHEIGHT, got {}",
                self.video.resolution
            )));
        }

        self.apply_defaults();
        Ok(self)
    }

    /// Fill zero or empty fields with documented defaults.
    pub fn apply_defaults(&mut self) {
        if self.video.resolution.is_empty() {
            self.video.resolution = DEFAULT_RESOLUTION.to_string();
        }
        if self.video.fps == 0 {
            self.video.fps = DEFAULT_FPS;
        }
        if self.video.background.trim().is_empty() {
            self.video.background = DEFAULT_BACKGROUND.to_string();
        }
        if self.video.transition.trim().is_empty() {
            self.video.transition = DEFAULT_TRANSITION.to_string();
        }

        if self.tts.provider.trim().is_empty() {
            self.tts.provider = DEFAULT_TTS_PROVIDER.to_string();
        }
        if self.tts.locale.trim().is_empty() {
            self.tts.locale = DEFAULT_LOCALE.to_string();
        }
        if self.tts.speed <= 0.0 {
            self.tts.speed = DEFAULT_SPEED;
        }

        if self.bgm.source != BgmSource::None && self.bgm.volume <= 0.0 {
            self.bgm.volume = DEFAULT_BGM_VOLUME;
        }

        for material in &mut self.materials {
            if material.kind == MaterialKind::Video && material.volume.is_none() {
                material.volume = Some(DEFAULT_MATERIAL_VOLUME);
            }
        }

        let style = &mut self.subtitle_style;
        if style.font.trim().is_empty() {
            style.font = DEFAULT_FONT.to_string();
        }
        if style.size == 0 {
            style.size = DEFAULT_FONT_SIZE;
        }
        if style.color.trim().is_empty() {
            style.color = DEFAULT_FONT_COLOR.to_string();
        }
        if style.outline_color.trim().is_empty() {
            style.outline_color = DEFAULT_OUTLINE_COLOR.to_string();
        }
        if style.outline_width <= 0.0 {
            style.outline_width = DEFAULT_OUTLINE_WIDTH;
        }
        if style.max_line_width == 0 {
            style.max_line_width = DEFAULT_MAX_LINE_WIDTH;
        }
        if style.y_offset == 0 {
            style.y_offset = default_y_offset(self.video.resolution().height);
        }
    }
}

/// Bottom subtitle margin scaled to the frame height.
pub fn default_y_offset(height: u32) -> u32 {
    if height >= 1200 {
        80
    } else if height >= 720 {
        60
    } else {
        40
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Parse `WxH`. Zero dimensions are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        let width: u32 = w.trim().parse().ok()?;
        let height: u32 = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> JobCreateRequest {
        JobCreateRequest {
            script: "今天天氣很好。".to_string(),
            materials: vec![Material {
                kind: MaterialKind::Image,
                path: "/uploads/a.png".to_string(),
                duration_sec: 3.0,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_applied() {
        let req = minimal().into_validated().unwrap();
        assert_eq!(req.video.resolution, "1080x1920");
        assert_eq!(req.video.fps, 30);
        assert_eq!(req.video.background, "black");
        assert_eq!(req.tts.provider, "edge_tts");
        assert_eq!(req.tts.speed, 1.0);
        assert_eq!(req.subtitle_style.size, 36);
        assert_eq!(req.subtitle_style.font, "Noto Sans CJK TC");
        assert_eq!(req.subtitle_style.color, "FFFFFF");
        assert_eq!(req.subtitle_style.outline_color, "000000");
        assert_eq!(req.subtitle_style.max_line_width, 16);
        assert_eq!(req.subtitle_style.y_offset, 80);
        assert!(req.video.transition().is_none());
    }

    #[test]
    fn test_blank_script_is_rejected() {
        let mut req = minimal();
        req.script = "   ".to_string();
        assert!(req.into_validated().is_err());
    }

    #[test]
    fn test_materials_required_with_positive_duration() {
        let mut req = minimal();
        req.materials.clear();
        assert!(req.into_validated().is_err());

        let mut req = minimal();
        req.materials[0].duration_sec = 0.0;
        assert!(req.into_validated().is_err());
    }

    #[test]
    fn test_bgm_path_required_unless_none() {
        let mut req = minimal();
        req.bgm.source = BgmSource::Url;
        assert!(req.clone().into_validated().is_err());

        req.bgm.path = "https://example.com/song.mp3".to_string();
        let req = req.into_validated().unwrap();
        assert_eq!(req.bgm.volume, DEFAULT_BGM_VOLUME);
    }

    #[test]
    fn test_unknown_bgm_source_fails_to_parse() {
        let json = r#"{"script":"hi","materials":[],"bgm":{"source":"radio","path":"x"}}"#;
        assert!(serde_json::from_str::<JobCreateRequest>(json).is_err());
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!(
            Resolution::parse("720x1280"),
            Some(Resolution { width: 720, height: 1280 })
        );
        assert!(Resolution::parse("720").is_none());
        assert!(Resolution::parse("0x10").is_none());

        let mut req = minimal();
        req.video.resolution = "wide".to_string();
        assert!(req.into_validated().is_err());
    }

    #[test]
    fn test_y_offset_follows_height() {
        assert_eq!(default_y_offset(1920), 80);
        assert_eq!(default_y_offset(720), 60);
        assert_eq!(default_y_offset(480), 40);
    }

    #[test]
    fn test_material_deserializes_type_field() {
        let json = r#"{"type":"video","source":"url","path":"https://x/y.mp4","duration_sec":2.5,"mute":true}"#;
        let material: Material = serde_json::from_str(json).unwrap();
        assert_eq!(material.kind, MaterialKind::Video);
        assert!(material.is_url());
        assert!(material.mute);
        assert_eq!(material.volume(), 1.0);
    }
}
