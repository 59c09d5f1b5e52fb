//! Subtitle timeline construction and drift reconciliation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One timed subtitle unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Line {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Line {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Duration given to a line whose own duration is missing or not positive.
pub const DEFAULT_LINE_MS: i64 = 1000;

/// Cumulative timeline from integer per-line durations.
///
/// Every text gets a line. Missing or non-positive durations count as
/// [`DEFAULT_LINE_MS`].
pub fn build_timeline(texts: &[String], durations_ms: &[i64]) -> Vec<Line> {
    let mut cursor = 0i64;
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let d = durations_ms
                .get(i)
                .copied()
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_LINE_MS);
            let start_ms = cursor;
            cursor += d;
            Line {
                text: text.clone(),
                start_ms,
                end_ms: cursor,
            }
        })
        .collect()
}

/// Cumulative timeline from per-line durations in seconds.
///
/// The cursor is kept in floating point and each boundary is rounded once, so
/// line `i` ends exactly where line `i + 1` starts and rounding never
/// accumulates. Missing, non-positive or non-finite durations count as one
/// second.
pub fn build_timeline_float(texts: &[String], durations_secs: &[f64]) -> Vec<Line> {
    let default_secs = DEFAULT_LINE_MS as f64 / 1000.0;
    let mut cursor = 0.0f64;
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let d = durations_secs
                .get(i)
                .copied()
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(default_secs);
            let start_ms = secs_to_ms(cursor);
            cursor += d;
            Line {
                text: text.clone(),
                start_ms,
                end_ms: secs_to_ms(cursor),
            }
        })
        .collect()
}

/// Ratio between the measured narration length and the predicted one.
///
/// Falls back to 1.0 when either side is zero or not finite.
pub fn scale_factor(predicted_secs: f64, measured_secs: f64) -> f64 {
    if predicted_secs > 0.0
        && measured_secs > 0.0
        && predicted_secs.is_finite()
        && measured_secs.is_finite()
    {
        measured_secs / predicted_secs
    } else {
        1.0
    }
}

/// Scale every timestamp by `k`, rounding to whole milliseconds.
pub fn reconcile(lines: &[Line], k: f64) -> Vec<Line> {
    let k = if k.is_finite() && k > 0.0 { k } else { 1.0 };
    lines
        .iter()
        .map(|line| Line {
            text: line.text.clone(),
            start_ms: (line.start_ms as f64 * k).round() as i64,
            end_ms: (line.end_ms as f64 * k).round() as i64,
        })
        .collect()
}

fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Line {}", i)).collect()
    }

    fn assert_contiguous(lines: &[Line]) {
        assert_eq!(lines[0].start_ms, 0);
        for pair in lines.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        for line in lines {
            assert!(line.start_ms <= line.end_ms);
        }
    }

    #[test]
    fn test_timeline_sync() {
        let durations = [2.7, 3.3, 2.0];
        let lines = build_timeline_float(&texts(3), &durations);

        assert_eq!(lines.len(), 3);
        assert_contiguous(&lines);
        assert!((lines[2].end_ms - 8000).abs() <= 10);
        for (line, d) in lines.iter().zip(durations) {
            assert!((line.duration_ms() - (d * 1000.0) as i64).abs() <= 10);
        }
    }

    #[test]
    fn test_integer_timeline_is_contiguous() {
        let lines = build_timeline(&texts(4), &[1000, 250, -5, 1750]);
        assert_contiguous(&lines);
        assert_eq!(lines[2].duration_ms(), DEFAULT_LINE_MS);
        assert_eq!(lines[3].end_ms, 4000);
    }

    #[test]
    fn test_zero_and_missing_durations_default_to_one_second() {
        let lines = build_timeline(&texts(2), &[0, 500]);
        assert_eq!(lines[0].end_ms, 1000);
        assert_eq!(lines[1].end_ms, 1500);

        let lines = build_timeline(&texts(2), &[700]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].start_ms, 700);
        assert_eq!(lines[1].end_ms, 1700);
    }

    #[test]
    fn test_float_timeline_defaults_bad_durations() {
        let lines = build_timeline_float(&texts(4), &[0.0, 1.5, f64::NAN]);
        assert_eq!(lines.len(), 4);
        assert_contiguous(&lines);
        assert_eq!(lines[0].end_ms, 1000);
        assert_eq!(lines[1].end_ms, 2500);
        assert_eq!(lines[2].end_ms, 3500);
        assert_eq!(lines[3].end_ms, 4500);
    }

    #[test]
    fn test_float_timeline_does_not_accumulate_rounding() {
        let durations = vec![0.3333; 30];
        let lines = build_timeline_float(&texts(30), &durations);
        assert_contiguous(&lines);
        assert!((lines[29].end_ms - 9999).abs() <= 1);
    }

    #[test]
    fn test_scale_factor_defaults() {
        assert_eq!(scale_factor(0.0, 5.0), 1.0);
        assert_eq!(scale_factor(5.0, 0.0), 1.0);
        assert!((scale_factor(8.0, 8.4) - 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_reconciled_end_matches_measured_duration() {
        let durations = [2.7, 3.3, 2.0, 1.45];
        let predicted: f64 = durations.iter().sum();
        let measured = 9.61;
        let raw = build_timeline_float(&texts(4), &durations);
        let lines = reconcile(&raw, scale_factor(predicted, measured));

        assert_contiguous(&lines);
        let last = lines.last().unwrap();
        assert!((last.end_ms - 9610).abs() <= 10, "end was {}", last.end_ms);
    }

    #[test]
    fn test_reconcile_ignores_invalid_factor() {
        let raw = build_timeline(&texts(2), &[500, 500]);
        assert_eq!(reconcile(&raw, f64::NAN), raw);
    }
}
