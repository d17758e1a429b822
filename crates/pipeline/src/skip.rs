//! Skip policy: a destination that already exists is never regenerated.

use std::fs;
use std::path::Path;

/// True iff any filesystem entry (file, directory, or symlink) exists at `output_path`.
///
/// Existence is the whole contract: no content or timestamp comparison.
pub fn should_skip(output_path: &Path) -> bool {
    fs::symlink_metadata(output_path).is_ok()
}
