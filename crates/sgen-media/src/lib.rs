#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for short video assembly.
//!
//! This crate provides:
//! - Type-safe multi-input FFmpeg command building
//! - A runner with timeouts and captured stderr
//! - FFprobe duration and stream inspection
//! - Visual timeline expansion and per-segment normalization
//! - Cross-fade merging, narration assembly and final composition
//! - ASS subtitle documents and preview frames
//! - Material and background music preparation

pub mod audio;
pub mod command;
pub mod compose;
pub mod error;
pub mod filters;
pub mod materials;
pub mod preview;
pub mod probe;
pub mod progress;
pub mod segment;
pub mod subtitle;
pub mod timeline;

pub use audio::{concat_narration, create_silence, prepare_speech_clip};
pub use command::{check_ffmpeg, check_ffprobe, run_tool, FfmpegCommand, FfmpegRunner};
pub use compose::{compose, ComposeRequest};
pub use error::{MediaError, MediaResult};
pub use materials::{MaterialFetcher, PreparedMaterial};
pub use preview::render_subtitle_preview;
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use progress::{FfmpegProgress, ProgressCallback, ProgressParser};
pub use segment::{RenderSettings, RenderedSegment, RenderedTimeline, SegmentRenderer};
pub use subtitle::{build_ass, write_ass};
pub use timeline::{build_visual_timeline, Segment};
