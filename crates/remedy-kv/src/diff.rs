//! Unified diffs of pending file changes

use std::path::Path;

use similar::TextDiff;

/// Unified diff between `before` and `after`, or `None` if they are equal.
pub fn unified(path: &Path, before: &str, after: &str) -> Option<String> {
    if before == after {
        return None;
    }
    let shown = path.display().to_string();
    let diff = TextDiff::from_lines(before, after);
    Some(
        diff.unified_diff()
            .context_radius(2)
            .header(&format!("a{shown}"), &format!("b{shown}"))
            .to_string(),
    )
}
