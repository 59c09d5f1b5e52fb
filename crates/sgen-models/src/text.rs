//! Rule-based script segmentation and subtitle wrapping.
//!
//! Both the narration splitter and the subtitle wrapper cut long text at a
//! *safe split point*: a boundary that does not break an alphanumeric run,
//! does not detach a unit symbol from its number and does not start a line
//! with closing punctuation.

use std::sync::LazyLock;

use regex::Regex;

/// How far back from the width boundary a safe split point is searched.
pub const SPLIT_LOOKBACK: usize = 8;

static HAN_THEN_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{Han})([A-Za-z0-9])").expect("static regex"));
static ALNUM_THEN_HAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9])(\p{Han})").expect("static regex"));

/// Insert a space at every CJK / ASCII alphanumeric transition.
pub fn auto_spacing(text: &str) -> String {
    let spaced = HAN_THEN_ALNUM.replace_all(text, "$1 $2");
    let spaced = ALNUM_THEN_HAN.replace_all(&spaced, "$1 $2");
    spaced.trim().to_string()
}

/// Clean a line before handing it to a speech provider.
pub fn sanitize_for_tts(text: &str) -> String {
    text.replace("\r\n", ", ")
        .replace('\n', ", ")
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split a script into lines of at most `max_len` characters.
///
/// Sentence and clause punctuation ends a unit, quotes and brackets are
/// dropped, decimal points, thousands separators and percent or degree signs
/// are kept. Units longer than the width are cut at safe split points, then
/// neighbours are merged greedily while they still fit.
pub fn split_script(script: &str, max_len: usize) -> Vec<String> {
    let width = max_len.max(1);
    let units = split_units(script);

    let mut pieces = Vec::with_capacity(units.len());
    for unit in units {
        pieces.extend(cut_to_width(&unit, width));
    }

    merge_units(pieces, width)
}

/// Wrap one subtitle line for display, joining rows with the ASS `\N` escape.
pub fn wrap_text(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return text.trim().to_string();
    }
    cut_to_width(text.trim(), max_width).join("\\N")
}

/// Find where to cut `chars` so the head holds at most `limit` characters.
///
/// Returns the index of the first character of the tail. Preference order:
/// a safe boundary right after whitespace or clause punctuation, then any
/// safe boundary, then exactly `limit`.
pub fn find_split_point(chars: &[char], limit: usize) -> usize {
    if chars.len() <= limit {
        return chars.len();
    }
    let limit = limit.max(1);
    let lower = limit.saturating_sub(SPLIT_LOOKBACK).max(1);

    if let Some(k) = (lower..=limit)
        .rev()
        .find(|&k| is_preferred_break(chars[k - 1]) && is_safe_boundary(chars, k))
    {
        return k;
    }

    (lower..=limit)
        .rev()
        .find(|&k| is_safe_boundary(chars, k))
        .unwrap_or(limit)
}

fn split_units(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut units = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if is_clause_delimiter(c) || (is_numeric_delimiter(c) && !is_joint(&chars, i)) {
            flush_unit(&mut current, &mut units);
            continue;
        }
        if is_stripped(c) && !is_joint(&chars, i) {
            continue;
        }
        current.push(c);
    }
    flush_unit(&mut current, &mut units);

    units
}

fn flush_unit(current: &mut String, units: &mut Vec<String>) {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() {
        units.push(normalized);
    }
    current.clear();
}

fn cut_to_width(text: &str, width: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > width {
        let k = find_split_point(&rest, width);
        let head: String = rest[..k].iter().collect();
        let head = head.trim();
        if !head.is_empty() {
            rows.push(head.to_string());
        }
        let skip = rest[k..].iter().take_while(|c| c.is_whitespace()).count();
        rest.drain(..k + skip);
    }

    let tail: String = rest.into_iter().collect();
    let tail = tail.trim();
    if !tail.is_empty() {
        rows.push(tail.to_string());
    }
    rows
}

fn merge_units(units: Vec<String>, width: usize) -> Vec<String> {
    let mut merged = Vec::with_capacity(units.len());
    let mut current: Option<String> = None;

    for unit in units {
        current = Some(match current.take() {
            None => unit,
            Some(prev) => {
                let joined = join_units(&prev, &unit);
                if joined.chars().count() <= width {
                    joined
                } else {
                    merged.push(prev);
                    unit
                }
            }
        });
    }
    merged.extend(current);

    merged
}

fn join_units(left: &str, right: &str) -> String {
    let needs_space = matches!(
        (left.chars().last(), right.chars().next()),
        (Some(a), Some(b)) if a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric()
    );
    if needs_space {
        format!("{} {}", left, right)
    } else {
        format!("{}{}", left, right)
    }
}

fn is_safe_boundary(chars: &[char], k: usize) -> bool {
    if k == 0 || k >= chars.len() {
        return true;
    }
    let prev = chars[k - 1];
    let next = chars[k];

    if prev.is_ascii_alphanumeric() && next.is_ascii_alphanumeric() {
        return false;
    }
    if is_joint(chars, k) || is_joint(chars, k - 1) {
        return false;
    }
    !is_unit_symbol(next) && !is_line_start_forbidden(next)
}

/// A separator glued between two digits (`3.5`, `1,000`, `10:30`) or two
/// letters (`don't`).
fn is_joint(chars: &[char], i: usize) -> bool {
    if i == 0 || i + 1 >= chars.len() {
        return false;
    }
    let (prev, c, next) = (chars[i - 1], chars[i], chars[i + 1]);
    match c {
        '.' | ',' | ':' => prev.is_ascii_digit() && next.is_ascii_digit(),
        '\'' | '’' => prev.is_ascii_alphabetic() && next.is_ascii_alphabetic(),
        _ => false,
    }
}

fn is_clause_delimiter(c: char) -> bool {
    matches!(
        c,
        '。' | '！' | '？' | '!' | '?' | '；' | ';' | '，' | '、' | '：' | '\n' | '\r'
    )
}

fn is_numeric_delimiter(c: char) -> bool {
    matches!(c, '.' | ',' | ':')
}

fn is_stripped(c: char) -> bool {
    matches!(
        c,
        '"' | '\''
            | '“'
            | '”'
            | '‘'
            | '’'
            | '「'
            | '」'
            | '『'
            | '』'
            | '（'
            | '）'
            | '('
            | ')'
            | '['
            | ']'
            | '【'
            | '】'
            | '《'
            | '》'
            | '〈'
            | '〉'
            | '<'
            | '>'
            | '…'
            | '—'
            | '～'
            | '~'
            | '*'
            | '#'
            | '`'
    )
}

fn is_unit_symbol(c: char) -> bool {
    matches!(c, '%' | '％' | '°' | '℃' | '℉' | '‰')
}

fn is_line_start_forbidden(c: char) -> bool {
    matches!(
        c,
        '，' | '。'
            | '、'
            | '！'
            | '？'
            | '；'
            | '：'
            | ','
            | '.'
            | '!'
            | '?'
            | ';'
            | ':'
            | '）'
            | ')'
            | '」'
            | '』'
            | '》'
            | '〉'
            | '】'
            | '’'
            | '”'
            | '\''
            | '…'
    )
}

fn is_preferred_break(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '，' | '。' | '、' | '！' | '？' | '；' | '：' | ',' | '.' | '!' | '?' | ';' | ':'
        )
}
