//! Visual timeline expansion.

use std::path::PathBuf;

use sgen_models::{MaterialKind, MotionEffect};

use crate::materials::PreparedMaterial;

/// Coverage allowed past the target duration.
pub const HARD_CEILING_MS: i64 = 1000;

/// Duration used for materials without a positive hint.
pub const DEFAULT_SEGMENT_MS: i64 = 1000;

/// A time-bounded slice of the visual timeline backed by one material.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source: PathBuf,
    pub start_ms: i64,
    pub end_ms: i64,
    pub kind: MaterialKind,
    pub mute: bool,
    pub volume: f64,
    pub effect: MotionEffect,
}

impl Segment {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }
}

/// Expand materials into segments covering `target_ms`.
///
/// Materials are used in order and wrap around when exhausted. Coverage ends
/// at or after `target_ms` and never past `target_ms + HARD_CEILING_MS`.
pub fn build_visual_timeline(materials: &[PreparedMaterial], target_ms: i64) -> Vec<Segment> {
    let mut segments = Vec::new();
    if materials.is_empty() || target_ms <= 0 {
        return segments;
    }

    let ceiling = target_ms + HARD_CEILING_MS;
    let mut cursor = 0i64;

    for prepared in materials.iter().cycle() {
        if cursor >= target_ms {
            break;
        }

        let hint_ms = (prepared.material.duration_sec * 1000.0).round() as i64;
        let duration = if hint_ms > 0 { hint_ms } else { DEFAULT_SEGMENT_MS };
        let end = (cursor + duration).min(ceiling);

        segments.push(Segment {
            source: prepared.path.clone(),
            start_ms: cursor,
            end_ms: end,
            kind: prepared.material.kind,
            mute: prepared.material.mute,
            volume: prepared.material.volume(),
            effect: prepared.material.effect,
        });
        cursor = end;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgen_models::Material;

    fn prepared(name: &str, secs: f64) -> PreparedMaterial {
        PreparedMaterial {
            path: PathBuf::from(name),
            material: Material {
                path: name.to_string(),
                duration_sec: secs,
                ..Default::default()
            },
        }
    }

    fn coverage(segments: &[Segment]) -> i64 {
        segments.last().map(|s| s.end_ms).unwrap_or(0)
    }

    #[test]
    fn test_materials_loop_until_target() {
        let materials = vec![prepared("a.png", 2.0), prepared("b.png", 3.0)];
        let segments = build_visual_timeline(&materials, 9000);

        let sources: Vec<_> = segments.iter().map(|s| s.source.to_string_lossy().to_string()).collect();
        assert_eq!(sources, vec!["a.png", "b.png", "a.png", "b.png"]);
        assert_eq!(coverage(&segments), 10000);
    }

    #[test]
    fn test_last_segment_clipped_at_ceiling() {
        let materials = vec![prepared("long.mp4", 30.0)];
        let segments = build_visual_timeline(&materials, 5000);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_ms, 6000);
    }

    #[test]
    fn test_non_positive_hint_defaults() {
        let materials = vec![prepared("a.png", 0.0)];
        let segments = build_visual_timeline(&materials, 2500);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.duration_ms() == 1000));
    }

    #[test]
    fn test_coverage_bounds_hold() {
        let materials = vec![prepared("a", 0.7), prepared("b", 4.3), prepared("c", 1.1)];
        for target in [1, 999, 1000, 4321, 12_000, 59_999] {
            let segments = build_visual_timeline(&materials, target);
            let covered = coverage(&segments);
            assert!(covered >= target, "target {} covered {}", target, covered);
            assert!(covered <= target + HARD_CEILING_MS);
            for pair in segments.windows(2) {
                assert_eq!(pair[0].end_ms, pair[1].start_ms);
            }
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(build_visual_timeline(&[], 5000).is_empty());
        assert!(build_visual_timeline(&[prepared("a", 1.0)], 0).is_empty());
    }
}
