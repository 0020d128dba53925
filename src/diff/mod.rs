//! Unified diff preview utility.
//!
//! Sessions hand unified diffs to the presentation sink as-is; a front end
//! that wants to show the patched file next to the raw diff can compute it
//! here. Nothing in this module touches the filesystem: the agent applies
//! patches on its side, the host only previews them.

use diffy::{apply as diffy_apply, Patch};

use crate::{AppError, Result};

/// Apply a unified diff to in-memory content and return the patched text.
///
/// # Errors
///
/// Returns [`AppError::Diff`] if the diff cannot be parsed or does not apply
/// cleanly to `content`.
pub fn preview_patch(content: &str, unified_diff: &str) -> Result<String> {
    // Files may use CRLF line endings while the diff uses LF. `diffy`
    // performs literal string matching on context lines, so a CRLF source
    // will never match an LF patch. Normalize to LF before applying, then
    // restore CRLF in the output if the original used it.
    let has_crlf = content.contains("\r\n");
    let content_lf = if has_crlf {
        content.replace("\r\n", "\n")
    } else {
        content.to_owned()
    };

    // The diff itself may also arrive with CRLF endings.
    let diff_lf;
    let unified_diff_lf = if unified_diff.contains("\r\n") {
        diff_lf = unified_diff.replace("\r\n", "\n");
        diff_lf.as_str()
    } else {
        unified_diff
    };

    let patch = Patch::from_str(unified_diff_lf)
        .map_err(|err| AppError::Diff(format!("failed to parse unified diff: {err}")))?;

    let patched_lf = diffy_apply(&content_lf, &patch)
        .map_err(|err| AppError::Diff(format!("patch does not apply cleanly: {err}")))?;

    if has_crlf {
        Ok(patched_lf.replace('\n', "\r\n"))
    } else {
        Ok(patched_lf)
    }
}
