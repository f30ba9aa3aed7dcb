//! CLI color helpers.
//!
//! All functions respect `NO_COLOR`, `FORCE_COLOR` and TTY detection via
//! `owo-colors`' `if_supports_color()`. The `--no-color` flag sets an in-process
//! flag that bypasses owo-colors entirely.

use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use owo_colors::Stream;

static NO_COLOR_FLAG: AtomicBool = AtomicBool::new(false);

/// Call once from main.rs when `--no-color` is passed.
pub fn set_no_color() {
    NO_COLOR_FLAG.store(true, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl Rgb {
    const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }
}

const ACCENT: Rgb = Rgb::from_hex(0x7CB4C8); // Key names
const FRESH: Rgb = Rgb::from_hex(0x6B8F5E); // ok / completed
const PENDING: Rgb = Rgb::from_hex(0xC49A5C); // running / deferred
const FAULT: Rgb = Rgb::from_hex(0xB87060); // stale / error
const MUTED: Rgb = Rgb::from_hex(0x5C6370); // Secondary info

fn no_color() -> bool {
    NO_COLOR_FLAG.load(Ordering::Relaxed)
}

fn paint_on(stream: Stream, text: &str, rgb: Rgb) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(stream, |t| t.truecolor(rgb.r, rgb.g, rgb.b))
        .to_string()
}

fn paint(text: &str, rgb: Rgb) -> String {
    paint_on(Stream::Stdout, text, rgb)
}

pub fn accent(text: &str) -> String {
    paint(text, ACCENT)
}

pub fn fresh(text: &str) -> String {
    paint(text, FRESH)
}

pub fn pending(text: &str) -> String {
    paint(text, PENDING)
}

pub fn fault(text: &str) -> String {
    paint(text, FAULT)
}

pub fn muted(text: &str) -> String {
    paint(text, MUTED)
}

/// Apply bold bright text (headers).
pub fn bold(text: &str) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stream::Stdout, |t| t.bold()).to_string()
}

/// Color-code a staleness value (ok/stale/unknown).
pub fn staleness(value: &str) -> String {
    match value.trim_end() {
        "ok" => fresh(value),
        "stale" => fault(value),
        "unknown" => muted(value),
        _ => value.to_string(),
    }
}

/// Color-code a key state cell (running/idle/error).
pub fn state(value: &str) -> String {
    match value.trim_end() {
        "running" => pending(value),
        "idle" => muted(value),
        "error" => fault(value),
        _ => value.to_string(),
    }
}

/// Error styling for stderr messages.
pub fn error(text: &str) -> String {
    paint_on(Stream::Stderr, text, FAULT)
}

/// Warning styling for stderr messages.
pub fn warning(text: &str) -> String {
    paint_on(Stream::Stderr, text, PENDING)
}

/// Hint styling for secondary info on stderr.
pub fn hint(text: &str) -> String {
    paint_on(Stream::Stderr, text, MUTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_hex() {
        let c = Rgb::from_hex(0x7CB4C8);
        assert_eq!(c.r, 124);
        assert_eq!(c.g, 180);
        assert_eq!(c.b, 200);
    }

    #[test]
    fn test_unknown_values_pass_through() {
        assert_eq!(staleness("weird"), "weird");
        assert_eq!(state("paused"), "paused");
    }

    #[test]
    fn test_no_color_flag_returns_plain_text() {
        set_no_color();
        assert_eq!(fault("stale"), "stale");
        assert_eq!(bold("Key"), "Key");
        assert_eq!(error("boom"), "boom");
    }
}
