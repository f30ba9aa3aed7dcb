use std::time::Duration;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use pulse_core::{KeyKind, KeyStatus};

use crate::color;
use crate::panels::PanelState;

const ERROR_MAX_WIDTH: usize = 48;

pub(crate) type Styler = fn(&str) -> String;

/// Box-drawn table with per-column styling. Widths follow the widest cell.
pub struct TableFormatter {
    headers: Vec<&'static str>,
    stylers: Vec<Styler>,
    rows: Vec<Vec<String>>,
    widths: Vec<usize>,
}

impl TableFormatter {
    pub fn new(columns: &[(&'static str, Styler)], rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<_> = columns.iter().map(|(header, _)| *header).collect();
        let stylers = columns.iter().map(|(_, styler)| *styler).collect();

        // Minimum widths = header label lengths
        let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(cell));
            }
        }

        Self {
            headers,
            stylers,
            rows,
            widths,
        }
    }

    pub fn print(&self) {
        println!("{}", self.border('┌', '┬', '┐'));
        println!("{}", self.header_row());
        println!("{}", self.border('├', '┼', '┤'));
        for row in &self.rows {
            println!("{}", self.row(row));
        }
        println!("{}", self.border('└', '┴', '┘'));
    }

    fn border(&self, left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = self.widths.iter().map(|w| "─".repeat(w + 2)).collect();
        color::muted(&format!(
            "{}{}{}",
            left,
            segments.join(mid.to_string().as_str()),
            right
        ))
    }

    fn header_row(&self) -> String {
        let sep = color::muted("│");
        let cells: Vec<String> = self
            .headers
            .iter()
            .zip(&self.widths)
            .map(|(header, width)| format!(" {} ", color::bold(&pad(header, *width))))
            .collect();
        format!("{sep}{}{sep}", cells.join(sep.as_str()))
    }

    fn row(&self, row: &[String]) -> String {
        let sep = color::muted("│");
        let cells: Vec<String> = row
            .iter()
            .zip(&self.widths)
            .zip(&self.stylers)
            .map(|((cell, width), styler)| format!(" {} ", styler(&pad(cell, *width))))
            .collect();
        format!("{sep}{}{sep}", cells.join(sep.as_str()))
    }
}

/// Columns of the live status table.
pub fn status_columns() -> [(&'static str, Styler); 6] {
    [
        ("Key", color::accent),
        ("Kind", plain),
        ("Last", plain),
        ("Next", plain),
        ("State", color::state),
        ("Error", color::fault),
    ]
}

/// Columns of `pulse keys`.
pub fn key_columns() -> [(&'static str, Styler); 3] {
    [
        ("Key", color::accent),
        ("Kind", plain),
        ("Command", color::muted),
    ]
}

/// One status table row for a key.
pub fn status_row(status: &KeyStatus, panel: Option<&PanelState>, now_ms: i64) -> Vec<String> {
    let last = status
        .meta
        .last_at
        .map_or("-".to_string(), |at| format_ago(now_ms, at));
    let next = status
        .meta
        .next_refresh_in(now_ms)
        .map_or("-".to_string(), format_until);
    let error = panel.and_then(|p| p.last_error.as_deref()).unwrap_or("");
    let state = if status.in_flight {
        "running"
    } else if !error.is_empty() {
        "error"
    } else {
        "idle"
    };

    vec![
        status.key.to_string(),
        format_kind(&status.kind),
        last,
        next,
        state.to_string(),
        truncate(error, ERROR_MAX_WIDTH),
    ]
}

fn plain(text: &str) -> String {
    text.to_string()
}

/// `auto 5s` or `manual`.
pub fn format_kind(kind: &KeyKind) -> String {
    match kind {
        KeyKind::Auto { interval_ms } => format!("auto {}", format_interval(*interval_ms)),
        KeyKind::Manual => "manual".to_string(),
    }
}

/// Compact interval: `500ms`, `5s`, `1m`, `1m30s`.
pub fn format_interval(ms: u64) -> String {
    if ms < 1_000 || ms % 1_000 != 0 {
        return format!("{}ms", ms);
    }
    let secs = ms / 1_000;
    match (secs / 60, secs % 60) {
        (0, s) => format!("{}s", s),
        (m, 0) => format!("{}m", m),
        (m, s) => format!("{}m{}s", m, s),
    }
}

fn format_ago(now_ms: i64, at_ms: i64) -> String {
    let secs = now_ms.saturating_sub(at_ms).max(0) / 1_000;
    format!("{}s ago", secs)
}

fn format_until(remaining: Duration) -> String {
    if remaining.is_zero() {
        "due".to_string()
    } else {
        format!("in {}s", remaining.as_secs_f64().ceil() as u64)
    }
}

/// Compute the terminal display width of a string.
///
/// Wide characters (CJK, emoji) count as 2 columns.
pub(crate) fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Pad a string to a minimum display width without truncating.
pub(crate) fn pad(s: &str, min_width: usize) -> String {
    let width = display_width(s);
    if width >= min_width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(min_width - width))
    }
}

/// Truncate to at most `max_width` display columns, ending in `…` when cut.
pub(crate) fn truncate(s: &str, max_width: usize) -> String {
    if display_width(s) <= max_width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w + 1 > max_width {
            break;
        }
        out.push(c);
        width += w;
    }
    out.push('…');
    out
}
