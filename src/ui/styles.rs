//! Palette and style helpers for the dashboard.

use ratatui::prelude::*;

const TEXT_COLOR: Color = Color::Rgb(216, 222, 233);
const MUTED_COLOR: Color = Color::Rgb(120, 128, 148);
const BORDER_COLOR: Color = Color::Rgb(67, 76, 94);

const HEADER_BG: Color = Color::Rgb(36, 41, 51);
const ACCENT: Color = Color::Rgb(136, 192, 208);

const GOOD: Color = Color::Rgb(163, 190, 140);
const WARN: Color = Color::Rgb(235, 203, 139);
const BAD: Color = Color::Rgb(191, 97, 106);

fn bold(fg: Color) -> Style {
    Style::default().fg(fg).add_modifier(Modifier::BOLD)
}

pub fn header_style() -> Style {
    bold(ACCENT).bg(HEADER_BG)
}

pub fn title_style() -> Style {
    bold(TEXT_COLOR)
}

pub fn text_style() -> Style {
    Style::default().fg(TEXT_COLOR)
}

pub fn table_header_style() -> Style {
    bold(ACCENT)
}

pub fn selected_row_style() -> Style {
    bold(Color::Black).bg(ACCENT)
}

pub fn border_style() -> Style {
    Style::default().fg(BORDER_COLOR)
}

pub fn success_style() -> Style {
    bold(GOOD)
}

pub fn error_style() -> Style {
    bold(BAD)
}

pub fn highlight_style() -> Style {
    bold(WARN)
}

pub fn muted_style() -> Style {
    Style::default().fg(MUTED_COLOR)
}

/// Green below `fast`, amber below `slow`, red otherwise.
pub fn latency_style(ms: f64, fast: f64, slow: f64) -> Style {
    if ms < fast {
        success_style()
    } else if ms < slow {
        highlight_style()
    } else {
        error_style()
    }
}
