//! Stage 2: encode the frame sequence into a GIF with gifski

use super::StageCommand;
use std::path::PathBuf;

/// Name of the frame-to-animation binary
pub const GIFSKI_BINARY: &str = "gifski";

/// Parameters for GIF encoding
#[derive(Debug, Clone)]
pub struct EncodeParams {
    /// Playback frame rate, matching the extraction rate
    pub fps: u32,
    /// gifski quality, 1-100
    pub quality: u8,
    /// Destination GIF
    pub output_path: PathBuf,
    /// Frame files in playback order
    pub frames: Vec<PathBuf>,
}

/// Build the gifski invocation: `--fps <n> --quality <q> -o <out> <frames...>`
pub fn build_encode_command(program: PathBuf, params: &EncodeParams) -> StageCommand {
    let mut cmd = StageCommand::new(program);

    cmd.arg("--fps").arg(params.fps.to_string());
    cmd.arg("--quality").arg(params.quality.to_string());
    cmd.arg("-o").arg(params.output_path.as_os_str());
    for frame in &params.frames {
        cmd.arg(frame.as_os_str());
    }

    cmd
}
