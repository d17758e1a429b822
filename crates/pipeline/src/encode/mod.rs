//! Encoder command builders for the two pipeline stages

pub mod ffmpeg;
pub mod gifski;

pub use ffmpeg::{build_extract_command, ExtractParams, FFMPEG_BINARY};
pub use gifski::{build_encode_command, EncodeParams, GIFSKI_BINARY};

use std::ffi::OsString;
use std::path::PathBuf;

/// A fully resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl StageCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Arguments as lossy strings, for logging and tests.
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}
