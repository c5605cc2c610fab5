//! Visual constants for terminal rendering.
//!
//! Centralizing colors and glyphs keeps the writer thread free of ad hoc
//! styling decisions.

use crossterm::style::Color;

use crate::sink::Severity;

/// Frames for the "still working" indicator, cycled per repaint.
pub(crate) const SPINNER_GLYPHS: [char; 4] = ['-', '\\', '|', '/'];

/// The char used to draw the filled part of a progress bar.
pub(crate) const PROGRESS_BAR_SYMBOL: char = '█';

/// Colors for the different message severities.
#[derive(Debug, Clone)]
pub(crate) struct ColorScheme {
    pub warning: Color,
    pub error: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            warning: Color::Yellow,
            error: Color::Red,
        }
    }
}

impl ColorScheme {
    /// Color for a severity, if that severity is colored at all.
    pub(crate) fn for_severity(&self, severity: Severity) -> Option<Color> {
        match severity {
            Severity::Warning => Some(self.warning),
            Severity::Error => Some(self.error),
            Severity::Info | Severity::Progress | Severity::Trace => None,
        }
    }
}
