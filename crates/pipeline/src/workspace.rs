//! Per-job scratch directories.
//!
//! Frames are always extracted to the local temp root, never next to the
//! output, so a slow network share only ever sees the finished GIF.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

/// printf-style frame template handed to the extraction stage.
pub const FRAME_TEMPLATE: &str = "frame%04d.png";

const FRAME_PREFIX: &str = "frame";
const FRAME_EXTENSION: &str = ".png";

/// A private scratch directory owned by one conversion job.
///
/// The directory is removed by [`TempWorkspace::destroy`] and, as a backstop,
/// when the workspace is dropped.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: PathBuf,
    destroyed: bool,
}

impl TempWorkspace {
    /// Create a uniquely named directory under `root`.
    ///
    /// The name combines the sanitized `label`, a millisecond timestamp and a
    /// random suffix.
    pub fn create(root: &Path, label: &str) -> io::Result<Self> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!(
            "gifbatch_{}_{}_{}",
            sanitize_label(label),
            millis,
            &suffix[..8]
        );

        let dir = root.join(name);
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Workspace created");

        Ok(Self {
            dir,
            destroyed: false,
        })
    }

    /// Directory backing this workspace.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Numbered output template for extracted frames.
    pub fn frame_pattern(&self) -> PathBuf {
        self.dir.join(FRAME_TEMPLATE)
    }

    /// Extracted frames, sorted lexicographically by file name.
    pub fn list_frames(&self) -> io::Result<Vec<PathBuf>> {
        let mut frames: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_frame_name(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        frames.sort();
        Ok(frames)
    }

    /// Number of frames on disk; a missing or unreadable directory counts as zero.
    pub fn frame_count(&self) -> usize {
        count_frames(&self.dir)
    }

    /// Remove the directory tree. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        remove_tree_best_effort(&self.dir);
    }

    /// Whether [`TempWorkspace::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Count files named like extracted frames in `dir`.
pub fn count_frames(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_frame_name(&entry.file_name().to_string_lossy()))
            .count(),
        Err(_) => 0,
    }
}

fn is_frame_name(name: &str) -> bool {
    name.starts_with(FRAME_PREFIX) && name.ends_with(FRAME_EXTENSION)
}

/// Replace everything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Recursively remove `path`, logging instead of failing.
///
/// A path that does not exist is already clean.
pub fn remove_tree_best_effort(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(dir = %path.display(), "Workspace removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %path.display(), error = %e, "Cleanup error"),
    }
}
