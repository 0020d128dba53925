//! Stdout presentation sink for the bundled binary.

use std::io::Write;
use std::path::Path;

use crate::sink::PresentationSink;

/// Renders a session straight to stdout.
///
/// Stdout is append-only, so in-place operations degrade gracefully:
/// a replacement prints the new line, and clearing the status or the diff
/// preview prints nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// Create a console sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn emit(text: &str) {
        let mut out = std::io::stdout().lock();
        // Best effort; a closed stdout must not take the session down.
        let _ = writeln!(out, "{text}");
    }
}

impl PresentationSink for ConsoleSink {
    fn append(&self, text: &str) {
        Self::emit(text);
    }

    fn replace_last_matching(&self, _pattern: &str, replacement: &str) {
        Self::emit(replacement);
    }

    fn show_status(&self, text: &str) {
        Self::emit(&format!("-- {text}"));
    }

    fn clear_status(&self) {}

    fn show_diff_preview(&self, path: &Path, diff: &str) {
        Self::emit(&format!("-- preview {}\n{diff}", path.display()));
    }

    fn hide_diff_preview(&self) {}

    fn set_title(&self, title: &str) {
        Self::emit(&format!("-- session {title}"));
    }
}
