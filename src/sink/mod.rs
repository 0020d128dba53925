//! Presentation seam between sessions and whatever renders them.
//!
//! The [`PresentationSink`] trait decouples the session core (dispatch loop,
//! approval workflow) from the surface that displays it: a terminal, an
//! editor buffer, a test recorder. Sessions call sink methods from their
//! dispatch loop and never wait on them, so implementations must be cheap
//! and must not block.
//!
//! Submodules:
//! - `transcript`: in-memory line buffer with pattern-addressed replacement.
//! - `console`: stdout renderer used by the bundled binary.

use std::path::Path;

pub mod console;
pub mod transcript;

pub use console::ConsoleSink;
pub use transcript::Transcript;

/// Rendering surface for one session's conversation and workflow state.
///
/// Implementations are shared across tasks (`Send + Sync`) and called
/// synchronously; they swallow their own failures rather than surfacing
/// them into the session.
pub trait PresentationSink: Send + Sync {
    /// Append text to the conversation transcript. `text` may span multiple
    /// lines.
    fn append(&self, text: &str);

    /// Replace the most recent transcript line matching `pattern` (a regular
    /// expression) with `replacement`. No-op when nothing matches.
    fn replace_last_matching(&self, pattern: &str, replacement: &str);

    /// Show or update the transient status indicator.
    fn show_status(&self, text: &str);

    /// Remove the status indicator.
    fn clear_status(&self);

    /// Show a patched-file preview for `path` alongside its unified diff.
    fn show_diff_preview(&self, path: &Path, diff: &str);

    /// Dismiss the diff preview, if one is showing.
    fn hide_diff_preview(&self);

    /// Set the session's displayed title, e.g. `[THINKING...]`.
    fn set_title(&self, title: &str);
}
