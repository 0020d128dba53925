//! In-memory presentation sink.
//!
//! [`Transcript`] keeps the whole rendered state of a session in plain data:
//! transcript lines, the transient status, the diff preview, the title.
//! Embedders can poll it to paint a real surface; tests assert against it
//! directly.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use regex::Regex;
use tracing::warn;

use crate::sink::PresentationSink;

/// Rendered session state captured in memory.
///
/// Methods lock a plain mutex for the duration of one small mutation; a
/// poisoned lock is recovered rather than propagated, since the data is
/// display state and every mutation leaves it consistent.
#[derive(Debug, Default)]
pub struct Transcript {
    state: Mutex<TranscriptState>,
}

#[derive(Debug, Default)]
struct TranscriptState {
    lines: Vec<String>,
    status: Option<String>,
    diff_preview: Option<(PathBuf, String)>,
    title: Option<String>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the transcript lines, in order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    /// Current status text, if one is showing.
    #[must_use]
    pub fn status(&self) -> Option<String> {
        self.lock().status.clone()
    }

    /// Current diff preview, if one is showing.
    #[must_use]
    pub fn diff_preview(&self) -> Option<(PathBuf, String)> {
        self.lock().diff_preview.clone()
    }

    /// Current title, if one has been set.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.lock().title.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TranscriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresentationSink for Transcript {
    /// Append `text`, splitting on `\n` so each piece becomes one line.
    /// Leading and trailing newlines produce empty lines, as a text buffer
    /// would show them.
    fn append(&self, text: &str) {
        let mut state = self.lock();
        for line in text.split('\n') {
            state.lines.push(line.to_owned());
        }
    }

    /// Scan from the newest line backwards and overwrite the first match.
    /// An invalid `pattern` is logged and ignored.
    fn replace_last_matching(&self, pattern: &str, replacement: &str) {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(err) => {
                warn!(pattern, error = %err, "invalid replacement pattern, ignoring");
                return;
            }
        };
        let mut state = self.lock();
        if let Some(line) = state.lines.iter_mut().rev().find(|line| regex.is_match(line)) {
            *line = replacement.to_owned();
        }
    }

    fn show_status(&self, text: &str) {
        self.lock().status = Some(text.to_owned());
    }

    fn clear_status(&self) {
        self.lock().status = None;
    }

    fn show_diff_preview(&self, path: &Path, diff: &str) {
        self.lock().diff_preview = Some((path.to_path_buf(), diff.to_owned()));
    }

    fn hide_diff_preview(&self) {
        self.lock().diff_preview = None;
    }

    fn set_title(&self, title: &str) {
        self.lock().title = Some(title.to_owned());
    }
}
