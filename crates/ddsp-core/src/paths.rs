//! Path helpers.

use std::path::PathBuf;

/// Expand a leading `~` to the user's home directory.
///
/// Paths without a leading `~`, and all paths when no home directory can be
/// determined, are returned unchanged.
pub fn expand_user(path: &str) -> PathBuf {
    let rest = if path == "~" {
        ""
    } else if let Some(rest) = path.strip_prefix("~/") {
        rest
    } else {
        return PathBuf::from(path);
    };

    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
