//! Shorts generation worker.
//!
//! This crate provides:
//! - Job submission, cancellation and lookup
//! - A single-task executor with graceful shutdown
//! - The generation pipeline with persisted progress
//! - AI subtitle segmentation with a rule-based fallback

pub mod config;
pub mod error;
pub mod executor;
pub mod gemini;
pub mod logging;
pub mod processor;
pub mod retry;
pub mod segmenter;
pub mod service;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use gemini::{GeminiClient, TextSegmentation};
pub use logging::JobLogger;
pub use processor::{process_job, ProcessingContext};
pub use segmenter::{SegmentationSource, TextSegmenter};
pub use service::JobService;
