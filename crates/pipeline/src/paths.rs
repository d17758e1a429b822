//! Encoder binary resolution and path normalization.
//!
//! Binaries are either bundled next to the application under
//! `bin/<platform-arch>/` or looked up on `PATH`. Paths coming from the caller
//! are normalized lexically so network shares and relative segments behave the
//! same everywhere downstream.

use gifbatch_config::{BinariesConfig, BinaryLayout};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while locating an encoder binary.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The computed location does not exist on disk.
    #[error("Binary not found: {name} (expected at {})", path.display())]
    NotFound { name: String, path: PathBuf },

    /// The binary is not on `PATH`.
    #[error("Binary not found on PATH: {name}")]
    NotOnPath { name: String },

    /// No bundled layout exists for this platform/architecture pair.
    #[error("Unsupported platform: {os}-{arch}")]
    UnsupportedPlatform { os: String, arch: String },
}

/// Platform/architecture pair the bundled layout is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Folder name under `bin/` holding this platform's binaries.
    pub fn folder(&self) -> Result<&'static str, ResolveError> {
        match (self.os.as_str(), self.arch.as_str()) {
            ("macos", "aarch64") => Ok("mac-arm64"),
            // Intel and Rosetta both take the x64 build
            ("macos", _) => Ok("mac-x64"),
            ("windows", "x86_64") => Ok("win-x64"),
            ("linux", "x86_64") => Ok("linux-x64"),
            ("linux", "aarch64") => Ok("linux-arm64"),
            _ => Err(ResolveError::UnsupportedPlatform {
                os: self.os.clone(),
                arch: self.arch.clone(),
            }),
        }
    }

    /// File name of `name` on this platform.
    pub fn executable_name(&self, name: &str) -> String {
        if self.os == "windows" {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }
}

/// Resolves encoder binaries to absolute paths.
#[derive(Debug)]
pub struct PathResolver {
    layout: BinaryLayout,
    root: PathBuf,
    platform: Platform,
    /// Binaries whose quarantine attribute has already been handled.
    seen: Mutex<HashSet<String>>,
}

impl PathResolver {
    /// Create a resolver for an explicit layout.
    pub fn new(layout: BinaryLayout, root: PathBuf, platform: Platform) -> Self {
        Self {
            layout,
            root,
            platform,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Create a resolver from configuration.
    ///
    /// Without a configured root the bundled layout is anchored at the
    /// directory holding the running executable.
    pub fn from_config(config: &BinariesConfig) -> Self {
        let root = config.root.clone().unwrap_or_else(executable_dir);
        Self::new(config.layout, root, Platform::current())
    }

    /// Resolve `name` (e.g. `ffmpeg`) to an absolute path that exists.
    pub fn resolve_binary(&self, name: &str) -> Result<PathBuf, ResolveError> {
        let path = match self.layout {
            BinaryLayout::Bundled => {
                let candidate = self
                    .root
                    .join("bin")
                    .join(self.platform.folder()?)
                    .join(self.platform.executable_name(name));
                let candidate = absolutize(&candidate);
                if !candidate.exists() {
                    error!(
                        binary = name,
                        path = %candidate.display(),
                        os = %self.platform.os,
                        arch = %self.platform.arch,
                        "Binary not found at expected path"
                    );
                    return Err(ResolveError::NotFound {
                        name: name.to_string(),
                        path: candidate,
                    });
                }
                candidate
            }
            BinaryLayout::System => which::which(name).map_err(|_| ResolveError::NotOnPath {
                name: name.to_string(),
            })?,
        };

        self.first_resolution(name, &path);
        debug!(binary = name, path = %path.display(), "Binary resolved");
        Ok(path)
    }

    fn first_resolution(&self, name: &str, path: &Path) {
        let first = match self.seen.lock() {
            Ok(mut seen) => seen.insert(name.to_string()),
            Err(_) => false,
        };
        if first {
            strip_quarantine(path);
        }
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Remove the download-quarantine attribute so Gatekeeper does not block the binary.
#[cfg(target_os = "macos")]
fn strip_quarantine(path: &Path) {
    if let Err(e) = xattr::remove(path, "com.apple.quarantine") {
        debug!(path = %path.display(), error = %e, "Quarantine attribute not removed");
    }
}

#[cfg(not(target_os = "macos"))]
fn strip_quarantine(_path: &Path) {}

/// Make `path` absolute against the current directory, then normalize it.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() || is_unc(path) {
        return normalize_path(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_path(&cwd.join(path)),
        Err(_) => normalize_path(path),
    }
}

fn is_unc(path: &Path) -> bool {
    path.to_str().is_some_and(|s| s.starts_with(r"\\"))
}

/// Normalize a path lexically.
///
/// `\\server\share` prefixes are kept verbatim and the remainder is rejoined
/// with backslashes; everywhere else duplicate separators, `.` and `..` are
/// collapsed. No filesystem access happens and the result is stable under a
/// second application.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(unc) = normalize_unc(s) {
            return PathBuf::from(unc);
        }
    }

    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

fn normalize_unc(s: &str) -> Option<String> {
    let rest = s.strip_prefix(r"\\")?;
    // Verbatim paths opt out of normalization entirely
    if rest.starts_with(r"?\") || rest.starts_with(r".\") {
        return Some(s.to_string());
    }

    let mut segments = rest.split(['\\', '/']).filter(|seg| !seg.is_empty());
    let server = segments.next()?;
    let share = segments.next();

    let mut tail: Vec<&str> = Vec::new();
    for seg in segments {
        match seg {
            "." => {}
            ".." => {
                tail.pop();
            }
            other => tail.push(other),
        }
    }

    let mut out = format!(r"\\{}", server);
    if let Some(share) = share {
        out.push('\\');
        out.push_str(share);
    }
    for seg in tail {
        out.push('\\');
        out.push_str(seg);
    }
    Some(out)
}
