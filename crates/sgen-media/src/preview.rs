//! Subtitle style preview frames.

use std::path::Path;
use std::time::Duration;

use sgen_models::{Line, Resolution, SubtitleStyle};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::{escape_filter_path, pad_color};
use crate::subtitle::write_ass;

const PREVIEW_TIMEOUT: Duration = Duration::from_secs(30);

/// Encoder invocation that draws `ass_path` over a solid frame.
pub fn preview_command(ass_path: &Path, resolution: Resolution, background: &str, output: &Path) -> FfmpegCommand {
    let source = format!(
        "color=c={}:s={}x{}:d=0.1",
        pad_color(background),
        resolution.width,
        resolution.height
    );
    FfmpegCommand::new(output)
        .lavfi(source)
        .video_filter(format!("ass={}", escape_filter_path(ass_path)))
        .single_frame()
}

/// Render `text` in `style` as a single PNG/JPEG frame at `output`.
pub async fn render_subtitle_preview(
    text: &str,
    style: &SubtitleStyle,
    resolution: Resolution,
    background: &str,
    work_dir: &Path,
    output: &Path,
) -> MediaResult<()> {
    tokio::fs::create_dir_all(work_dir).await?;
    let ass_path = work_dir.join("preview.ass");
    let line = Line {
        text: text.to_string(),
        start_ms: 0,
        end_ms: 1000,
    };
    write_ass(&ass_path, &[line], style).await?;

    let cmd = preview_command(&ass_path, resolution, background, output);
    FfmpegRunner::new().with_timeout(PREVIEW_TIMEOUT).run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_command() {
        let joined = preview_command(
            Path::new("/tmp/p/preview.ass"),
            Resolution { width: 720, height: 1280 },
            "",
            Path::new("/tmp/p/preview.png"),
        )
        .build_args()
        .join(" ");

        assert!(joined.contains("-f lavfi -i color=c=black:s=720x1280:d=0.1"));
        assert!(joined.contains("-vf ass='/tmp/p/preview.ass'"));
        assert!(joined.contains("-frames:v 1"));
    }
}
