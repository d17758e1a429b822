//! Conversion requests, batch plans and batch results.

use crate::paths::normalize_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Extension of every produced animation.
pub const OUTPUT_EXTENSION: &str = "gif";

/// Rejected request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("fps must be greater than zero")]
    ZeroFps,
    #[error("width must be greater than zero")]
    ZeroWidth,
    #[error("quality must be between 1 and 100, got {0}")]
    QualityOutOfRange(u8),
    #[error("input has no file name: {}", .0.display())]
    NoFileName(PathBuf),
}

/// Encoding parameters shared by every file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub fps: u32,
    pub width: u32,
    pub quality: u8,
}

impl EncodeSettings {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.fps == 0 {
            return Err(RequestError::ZeroFps);
        }
        if self.width == 0 {
            return Err(RequestError::ZeroWidth);
        }
        if !(1..=100).contains(&self.quality) {
            return Err(RequestError::QualityOutOfRange(self.quality));
        }
        Ok(())
    }
}

impl From<&gifbatch_config::EncodingConfig> for EncodeSettings {
    fn from(config: &gifbatch_config::EncodingConfig) -> Self {
        Self {
            fps: config.fps,
            width: config.width,
            quality: config.quality,
        }
    }
}

/// One file to convert. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    input_path: PathBuf,
    output_path: PathBuf,
    output_folder: PathBuf,
    settings: EncodeSettings,
}

impl ConversionRequest {
    /// Build a validated request.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        output_folder: impl Into<PathBuf>,
        settings: EncodeSettings,
    ) -> Result<Self, RequestError> {
        settings.validate()?;
        Ok(Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            output_folder: output_folder.into(),
            settings,
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn settings(&self) -> EncodeSettings {
        self.settings
    }

    pub fn fps(&self) -> u32 {
        self.settings.fps
    }

    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn quality(&self) -> u8 {
        self.settings.quality
    }

    /// File name shown in progress events.
    pub fn display_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }
}

/// Ordered list of requests; order is processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    requests: Vec<ConversionRequest>,
}

impl BatchPlan {
    pub fn new(requests: Vec<ConversionRequest>) -> Self {
        Self { requests }
    }

    /// Derive a plan from input videos.
    ///
    /// Each output lands in `output_dir` when given, otherwise in
    /// `<input parent>/<folder_name>`, named `<input stem>.gif`.
    pub fn from_inputs<I, P>(
        inputs: I,
        output_dir: Option<&Path>,
        settings: EncodeSettings,
        folder_name: &str,
    ) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut requests = Vec::new();
        for input in inputs {
            let input = normalize_path(input.as_ref());
            let stem = input
                .file_stem()
                .ok_or_else(|| RequestError::NoFileName(input.clone()))?;

            let folder = match output_dir {
                Some(dir) => normalize_path(dir),
                None => {
                    let parent = input.parent().unwrap_or_else(|| Path::new(""));
                    normalize_path(&parent.join(folder_name))
                }
            };
            let mut file_name = stem.to_os_string();
            file_name.push(".");
            file_name.push(OUTPUT_EXTENSION);
            let output = folder.join(file_name);

            requests.push(ConversionRequest::new(input, output, folder, settings)?);
        }
        Ok(Self { requests })
    }

    pub fn push(&mut self, request: ConversionRequest) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[ConversionRequest] {
        &self.requests
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionRequest> {
        self.requests.iter()
    }

    /// Distinct output folders in first-seen order.
    pub fn output_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = Vec::new();
        for request in &self.requests {
            let folder = normalize_path(request.output_folder());
            if !folders.contains(&folder) {
                folders.push(folder);
            }
        }
        folders
    }
}

/// What happened to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Converted,
    Skipped,
    Failed(String),
}

impl JobOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            JobOutcome::Converted => "converted",
            JobOutcome::Skipped => "skipped",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub converted: usize,
    pub skipped: usize,
    pub total_elapsed_secs: f64,
    /// True when the batch stopped early on a cancellation request.
    pub cancelled: bool,
}

impl BatchResult {
    pub(crate) fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Converted => self.converted += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failed(_) => {}
        }
    }

    pub(crate) fn finish(&mut self, elapsed: Duration, cancelled: bool) {
        self.total_elapsed_secs = elapsed.as_secs_f64();
        self.cancelled = cancelled;
    }

    /// Jobs that reached a converted or skipped outcome.
    pub fn processed(&self) -> usize {
        self.converted + self.skipped
    }
}
