//! Script segmentation: AI first, rule-based fallback.

use std::sync::Arc;

use sgen_models::{auto_spacing, split_script};
use tracing::{info, warn};

use crate::gemini::TextSegmentation;
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// How a script was segmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationSource {
    Ai,
    Rules,
}

/// Segments scripts into subtitle lines.
pub struct TextSegmenter {
    ai: Option<Arc<dyn TextSegmentation>>,
    retry: RetryConfig,
}

impl TextSegmenter {
    pub fn new(ai: Option<Arc<dyn TextSegmentation>>, retry: RetryConfig) -> Self {
        Self { ai, retry }
    }

    /// Rule-based only.
    pub fn rules_only() -> Self {
        Self::new(None, RetryConfig::new("ai_segmentation"))
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    /// Split `script` into lines no wider than `max_width`.
    ///
    /// Every returned line has CJK/ASCII spacing applied.
    pub async fn segment(&self, script: &str, max_width: usize) -> (Vec<String>, SegmentationSource) {
        let (lines, source) = match self.segment_with_ai(script, max_width).await {
            Some(lines) => (lines, SegmentationSource::Ai),
            None => (split_script(script, max_width), SegmentationSource::Rules),
        };

        let lines = lines
            .iter()
            .map(|line| auto_spacing(line))
            .filter(|line| !line.trim().is_empty())
            .collect();
        (lines, source)
    }

    async fn segment_with_ai(&self, script: &str, max_width: usize) -> Option<Vec<String>> {
        let Some(ai) = &self.ai else {
            info!("No AI client configured, using rule-based segmentation");
            return None;
        };

        match retry_async(&self.retry, || ai.segment_text(script, max_width)).await {
            RetryResult::Success(lines) if !lines.is_empty() => Some(lines),
            RetryResult::Success(_) => {
                warn!("AI segmentation returned no lines, using rule-based segmentation");
                None
            }
            RetryResult::Failed { error, attempts } => {
                warn!(
                    "AI segmentation failed after {} attempts, using rule-based segmentation: {}",
                    attempts, error
                );
                None
            }
        }
    }
}
