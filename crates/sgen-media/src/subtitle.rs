//! ASS (Advanced SubStation Alpha) subtitle documents.

use std::fmt::Write as _;
use std::path::Path;

use sgen_models::{wrap_text, Line, SubtitleStyle};

use crate::error::MediaResult;

const STYLE_FORMAT: &str = "Format: Name,Fontname,Fontsize,PrimaryColour,SecondaryColour,OutlineColour,\
BackColour,Bold,Italic,Underline,StrikeOut,ScaleX,ScaleY,Spacing,Angle,BorderStyle,Outline,Shadow,\
Alignment,MarginL,MarginR,MarginV,Encoding";

const EVENT_FORMAT: &str = "Format: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text";

/// Convert `RRGGBB` (optionally `#`-prefixed) to ASS `00BBGGRR`.
///
/// Malformed input yields opaque white.
pub fn ass_color(hex: &str) -> String {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return "00FFFFFF".to_string();
    }
    let hex = hex.to_ascii_uppercase();
    format!("00{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2])
}

/// Format milliseconds as `H:MM:SS.cc`.
pub fn format_ass_time(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let centis = (ms % 1000) / 10;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

/// Render the subtitle document for `lines`.
///
/// No `PlayResX`/`PlayResY` is written, so libass lays the script out on its
/// default 384x288 canvas and scales it to the video. Style sizes and margins
/// are in that canvas's units.
pub fn build_ass(lines: &[Line], style: &SubtitleStyle) -> String {
    let mut doc = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(doc, "[Script Info]");
    let _ = writeln!(doc, "ScriptType: v4.00+");
    let _ = writeln!(doc, "WrapStyle: 2");
    let _ = writeln!(doc, "ScaledBorderAndShadow: yes");
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[V4+ Styles]");
    let _ = writeln!(doc, "{}", STYLE_FORMAT);
    let _ = writeln!(
        doc,
        "Style: Default,{font},{size},&H{primary},&H00FFFFFF,&H{outline},&H64000000,\
         0,0,0,0,100,100,0,0,1,{outline_width:.1},0,2,20,20,{margin_v},1",
        font = style.font,
        size = style.size,
        primary = ass_color(&style.color),
        outline = ass_color(&style.outline_color),
        outline_width = style.outline_width,
        margin_v = style.y_offset,
    );
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[Events]");
    let _ = writeln!(doc, "{}", EVENT_FORMAT);

    for line in lines {
        let _ = writeln!(
            doc,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            format_ass_time(line.start_ms),
            format_ass_time(line.end_ms),
            event_text(&line.text, style.max_line_width),
        );
    }

    doc
}

/// Write the subtitle document to `path`.
pub async fn write_ass(path: impl AsRef<Path>, lines: &[Line], style: &SubtitleStyle) -> MediaResult<()> {
    tokio::fs::write(path, build_ass(lines, style)).await?;
    Ok(())
}

fn event_text(text: &str, max_width: usize) -> String {
    // Braces open override blocks in ASS
    let plain = text.replace('{', "(").replace('}', ")").replace(['\r', '\n'], " ");
    wrap_text(&plain, max_width)
}
