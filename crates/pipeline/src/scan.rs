//! Filesystem checks used by callers to turn dropped paths into a plan.
//!
//! Both checks swallow errors: an unreadable path is reported as "nothing
//! there" instead of failing the caller.

use crate::paths::normalize_path;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Video file extensions accepted as inputs (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv"];

/// What a path points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathKind {
    pub is_directory: bool,
    pub is_file: bool,
}

/// Classify `path`; any failure yields `{ is_directory: false, is_file: false }`.
pub fn check_exists(path: &Path) -> PathKind {
    match std::fs::metadata(normalize_path(path)) {
        Ok(metadata) => PathKind {
            is_directory: metadata.is_dir(),
            is_file: metadata.is_file(),
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error getting file stats");
            PathKind::default()
        }
    }
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Video files directly inside `folder`, sorted by path.
///
/// Subdirectories are not descended into. An unreadable folder yields an
/// empty list.
pub fn list_video_files(folder: &Path) -> Vec<PathBuf> {
    let folder = normalize_path(folder);
    if let Err(e) = std::fs::read_dir(&folder) {
        warn!(folder = %folder.display(), error = %e, "Error reading folder");
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(&folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() || entry.path_is_symlink())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_video_file(path))
        .map(|path| normalize_path(&path))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_video_extensions_defined() {
        assert_eq!(VIDEO_EXTENSIONS.len(), 4);
        for ext in [".mp4", ".mov", ".avi", ".mkv"] {
            assert!(VIDEO_EXTENSIONS.contains(&ext));
        }
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("/media/movie.mkv")));
        assert!(is_video_file(Path::new("/media/movie.MKV")));
        assert!(is_video_file(Path::new("/media/movie.Mov")));
        assert!(is_video_file(Path::new("clip.avi")));
        assert!(!is_video_file(Path::new("/media/movie.m4v")));
        assert!(!is_video_file(Path::new("/media/movie.gif")));
        assert!(!is_video_file(Path::new("/media/mp4")));
    }

    #[test]
    fn test_check_exists_file_and_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        File::create(&file).unwrap();

        assert_eq!(
            check_exists(&file),
            PathKind {
                is_directory: false,
                is_file: true
            }
        );
        assert_eq!(
            check_exists(dir.path()),
            PathKind {
                is_directory: true,
                is_file: false
            }
        );
    }

    #[test]
    fn test_check_exists_missing_is_false_false() {
        let dir = TempDir::new().unwrap();
        assert_eq!(check_exists(&dir.path().join("missing")), PathKind::default());
    }

    #[test]
    fn test_list_video_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.MP4", "a.mov", "c.mkv", "d.avi", "notes.txt", "e.gif"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp4")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub").join("deep.mp4")).unwrap();

        let files = list_video_files(dir.path());
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.mov", "b.MP4", "c.mkv", "d.avi"]);
        assert!(files.iter().all(|p| p.starts_with(normalize_path(dir.path()))));
    }

    #[test]
    fn test_list_video_files_missing_folder_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_video_files(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_list_video_files_on_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        File::create(&file).unwrap();
        assert!(list_video_files(&file).is_empty());
    }
}
