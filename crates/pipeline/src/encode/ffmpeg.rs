//! Stage 1: decode a video into a numbered PNG sequence with ffmpeg

use super::StageCommand;
use std::path::PathBuf;

/// Name of the frame-extraction binary
pub const FFMPEG_BINARY: &str = "ffmpeg";

/// Parameters for frame extraction
#[derive(Debug, Clone)]
pub struct ExtractParams {
    /// Absolute path to the source video
    pub input_path: PathBuf,
    /// printf-style frame template inside the job workspace
    pub frame_pattern: PathBuf,
    /// Frames sampled per second of source video
    pub fps: u32,
    /// Output width; height keeps the aspect ratio
    pub width: u32,
}

/// Build the ffmpeg invocation for frame extraction
///
/// - `-nostdin` so ffmpeg never waits on a terminal
/// - `fps` and lanczos `scale` filters
/// - `-y` to overwrite stale frames
pub fn build_extract_command(program: PathBuf, params: &ExtractParams) -> StageCommand {
    let mut cmd = StageCommand::new(program);

    cmd.arg("-nostdin");
    cmd.arg("-i").arg(params.input_path.as_os_str());
    cmd.arg("-vf").arg(filter_expression(params.fps, params.width));
    cmd.arg("-y");
    cmd.arg(params.frame_pattern.as_os_str());

    cmd
}

/// `fps=<fps>,scale=<width>:-1:flags=lanczos`
pub fn filter_expression(fps: u32, width: u32) -> String {
    format!("fps={},scale={}:-1:flags=lanczos", fps, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("/[a-zA-Z0-9_ /.-]{1,50}").unwrap()
    }

    #[test]
    fn test_filter_expression() {
        assert_eq!(filter_expression(15, 480), "fps=15,scale=480:-1:flags=lanczos");
    }

    #[test]
    fn test_exact_argument_order() {
        let params = ExtractParams {
            input_path: PathBuf::from("/videos/clip.mp4"),
            frame_pattern: PathBuf::from("/tmp/ws/frame%04d.png"),
            fps: 10,
            width: 320,
        };
        let cmd = build_extract_command(PathBuf::from("/opt/bin/ffmpeg"), &params);

        assert_eq!(cmd.program, PathBuf::from("/opt/bin/ffmpeg"));
        assert_eq!(
            cmd.display_args(),
            vec![
                "-nostdin",
                "-i",
                "/videos/clip.mp4",
                "-vf",
                "fps=10,scale=320:-1:flags=lanczos",
                "-y",
                "/tmp/ws/frame%04d.png",
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_extract_command_completeness(
            input_path in path_strategy(),
            pattern_dir in path_strategy(),
            fps in 1u32..120,
            width in 1u32..4096,
        ) {
            let frame_pattern = format!("{}/frame%04d.png", pattern_dir);
            let params = ExtractParams {
                input_path: PathBuf::from(&input_path),
                frame_pattern: PathBuf::from(&frame_pattern),
                fps,
                width,
            };

            let cmd = build_extract_command(PathBuf::from("ffmpeg"), &params);
            let args = cmd.display_args();

            prop_assert!(
                has_flag_with_value(&args, "-i", &input_path),
                "Command should contain -i with input path '{}', args: {:?}",
                input_path, args
            );
            prop_assert!(
                has_flag_with_value(&args, "-vf", &filter_expression(fps, width)),
                "Command should contain the fps/scale filter, args: {:?}",
                args
            );
            prop_assert!(args.iter().any(|a| a == "-y"));
            prop_assert_eq!(args.first().map(String::as_str), Some("-nostdin"));
            prop_assert_eq!(args.last(), Some(&frame_pattern));
        }
    }
}
