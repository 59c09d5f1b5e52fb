//! Shared data models for the shorts generator.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job status and the persisted job record
//! - The job submission request with validation and defaults
//! - Rule-based text segmentation and subtitle wrapping
//! - Subtitle timeline construction and reconciliation

pub mod error;
pub mod job;
pub mod request;
pub mod text;
pub mod timeline;

// Re-export common types
pub use error::{RequestError, RequestResult};
pub use job::{result_url_for, JobId, JobRecord, JobStatus, OUTPUT_FILE_NAME};
pub use request::{
    BgmSettings, BgmSource, JobCreateRequest, Material, MaterialKind, MaterialOrigin,
    MotionEffect, Resolution, SubtitleStyle, TtsSettings, VideoSettings, RANDOM_PRESET,
};
pub use text::{auto_spacing, sanitize_for_tts, split_script, wrap_text};
pub use timeline::{build_timeline, build_timeline_float, reconcile, scale_factor, Line};
