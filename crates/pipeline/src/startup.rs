//! Preflight checks for the encoder binaries.
//!
//! Resolves `ffmpeg` and `gifski` and runs each once with its version flag,
//! so a broken install is reported before any job starts.

use crate::encode::{FFMPEG_BINARY, GIFSKI_BINARY};
use crate::paths::{PathResolver, ResolveError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// How long a `--version` invocation may take.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{} could not be executed: {source}", .path.display())]
    NotExecutable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} {arg} did not finish within {timeout_secs}s", .path.display())]
    Unresponsive {
        path: PathBuf,
        arg: &'static str,
        timeout_secs: u64,
    },
}

/// Outcome of a successful preflight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub ffmpeg: PathBuf,
    pub gifski: PathBuf,
    /// Major version parsed from the ffmpeg banner, when recognizable.
    pub ffmpeg_version: Option<u32>,
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles both `ffmpeg version 7.1 ...` and git builds such as
/// `ffmpeg version n7.1-12-gabcdef ...`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');

    // Major version is everything before the first '.' or '-'
    let major_str = version_str.split(['.', '-']).next()?;

    major_str.parse().ok()
}

/// Run `path <version_arg>` and return its combined output.
///
/// A nonzero exit is only logged; some builds print their banner and exit 1.
pub async fn check_binary_runs(path: &Path, version_arg: &'static str) -> Result<String, StartupError> {
    let child = Command::new(path)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| StartupError::NotExecutable {
            path: path.to_path_buf(),
            source,
        })?;

    let output = tokio::time::timeout(VERSION_CHECK_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| StartupError::Unresponsive {
            path: path.to_path_buf(),
            arg: version_arg,
            timeout_secs: VERSION_CHECK_TIMEOUT.as_secs(),
        })?
        .map_err(|source| StartupError::NotExecutable {
            path: path.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        warn!(
            path = %path.display(),
            arg = version_arg,
            status = %output.status,
            "Version check exited unsuccessfully"
        );
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Run all startup checks in order
///
/// 1. Resolve ffmpeg, then gifski (a missing binary is fatal)
/// 2. `ffmpeg -version`
/// 3. `gifski --version`
pub async fn run_startup_checks(resolver: &PathResolver) -> Result<StartupReport, StartupError> {
    let ffmpeg = resolver.resolve_binary(FFMPEG_BINARY)?;
    let gifski = resolver.resolve_binary(GIFSKI_BINARY)?;

    let banner = check_binary_runs(&ffmpeg, "-version").await?;
    let ffmpeg_version = parse_ffmpeg_version(&banner);
    if ffmpeg_version.is_none() {
        warn!(
            first_line = banner.lines().next().unwrap_or("(empty)"),
            "Could not parse FFmpeg version"
        );
    }

    check_binary_runs(&gifski, "--version").await?;

    info!(
        ffmpeg = %ffmpeg.display(),
        gifski = %gifski.display(),
        ffmpeg_version = ?ffmpeg_version,
        "Startup checks passed"
    );

    Ok(StartupReport {
        ffmpeg,
        gifski,
        ffmpeg_version,
    })
}
