//! Parsing of `-progress pipe:2` key/value blocks.

/// Snapshot of a running encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output position in seconds
    pub out_secs: f64,
    /// Multiple of realtime, 0 when not reported yet
    pub speed: f64,
    pub finished: bool,
}

impl FfmpegProgress {
    /// Share of `total_secs` written so far, within 0..=1.
    pub fn fraction_of(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_secs / total_secs).clamp(0.0, 1.0)
    }

    /// Seconds left at the current speed.
    pub fn remaining_secs(&self, total_secs: f64) -> Option<f64> {
        if self.speed <= 0.0 {
            return None;
        }
        Some((total_secs - self.out_secs).max(0.0) / self.speed)
    }
}

/// Folds progress keys into snapshots. Every `progress=` key closes a block.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `line` is a `key=value` progress entry rather than a log line.
    pub fn is_progress_line(line: &str) -> bool {
        matches!(
            line.trim().split_once('='),
            Some((key, _)) if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        )
    }

    /// Feed one line. Returns a snapshot when a block is complete.
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            // Despite the name, out_time_ms is in microseconds too
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_secs = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                self.current.finished = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(FfmpegProgress) + Send + 'static>;
