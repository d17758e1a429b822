//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Default encoding parameters applied to every file in a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    /// Frames per second sampled from the source video
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Output width in pixels; height follows the source aspect ratio
    #[serde(default = "default_width")]
    pub width: u32,
    /// gifski quality, 1-100
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_fps() -> u32 {
    15
}

fn default_width() -> u32 {
    480
}

fn default_quality() -> u8 {
    90
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            width: default_width(),
            quality: default_quality(),
        }
    }
}

/// Where the encoder binaries live
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BinaryLayout {
    /// `<root>/bin/<platform-arch>/<name>`
    #[default]
    Bundled,
    /// Looked up on `PATH`
    System,
}

impl BinaryLayout {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "bundled" => Some(Self::Bundled),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Encoder binary configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BinariesConfig {
    #[serde(default)]
    pub layout: BinaryLayout,
    /// Root of the bundled layout (defaults to the executable's directory)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Supervisor timing, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutsConfig {
    /// How long a process may stay silent before it is considered dead on arrival
    #[serde(default = "default_startup_secs")]
    pub startup_secs: u64,
    /// Delay between the graceful terminate and the forced kill
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
    /// Activity monitor cadence
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// No-progress window after which a stall warning is logged
    #[serde(default = "default_stall_threshold_secs")]
    pub stall_threshold_secs: u64,
}

fn default_startup_secs() -> u64 {
    10
}

fn default_kill_grace_secs() -> u64 {
    2
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_stall_threshold_secs() -> u64 {
    10
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            startup_secs: default_startup_secs(),
            kill_grace_secs: default_kill_grace_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            stall_threshold_secs: default_stall_threshold_secs(),
        }
    }
}

/// Output placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Folder created next to each input when no output directory is given
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
    /// Scratch root for frame extraction (defaults to the system temp dir)
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

fn default_folder_name() -> String {
    "gifs".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder_name: default_folder_name(),
            temp_root: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub binaries: BinariesConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - GIFBATCH_FPS -> encoding.fps
    /// - GIFBATCH_WIDTH -> encoding.width
    /// - GIFBATCH_QUALITY -> encoding.quality
    /// - GIFBATCH_BIN_LAYOUT -> binaries.layout
    /// - GIFBATCH_BIN_ROOT -> binaries.root
    /// - GIFBATCH_STARTUP_TIMEOUT_SECS -> timeouts.startup_secs
    /// - GIFBATCH_TEMP_ROOT -> output.temp_root
    ///
    /// Unparseable values are ignored and the existing value is kept.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("GIFBATCH_FPS") {
            if let Ok(fps) = val.parse::<u32>() {
                self.encoding.fps = fps;
            }
        }

        if let Ok(val) = env::var("GIFBATCH_WIDTH") {
            if let Ok(width) = val.parse::<u32>() {
                self.encoding.width = width;
            }
        }

        if let Ok(val) = env::var("GIFBATCH_QUALITY") {
            if let Ok(quality) = val.parse::<u8>() {
                self.encoding.quality = quality;
            }
        }

        if let Ok(val) = env::var("GIFBATCH_BIN_LAYOUT") {
            if let Some(layout) = BinaryLayout::parse(&val) {
                self.binaries.layout = layout;
            }
        }

        if let Ok(val) = env::var("GIFBATCH_BIN_ROOT") {
            if !val.is_empty() {
                self.binaries.root = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("GIFBATCH_STARTUP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.timeouts.startup_secs = secs;
            }
        }

        if let Ok(val) = env::var("GIFBATCH_TEMP_ROOT") {
            if !val.is_empty() {
                self.output.temp_root = Some(PathBuf::from(val));
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults; env overrides apply either way
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Env var tests share process state
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("GIFBATCH_FPS");
        env::remove_var("GIFBATCH_WIDTH");
        env::remove_var("GIFBATCH_QUALITY");
        env::remove_var("GIFBATCH_BIN_LAYOUT");
        env::remove_var("GIFBATCH_BIN_ROOT");
        env::remove_var("GIFBATCH_STARTUP_TIMEOUT_SECS");
        env::remove_var("GIFBATCH_TEMP_ROOT");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            fps in 1u32..120,
            width in 1u32..4096,
            quality in 1u8..=100,
            system_layout in proptest::bool::ANY,
            startup in 1u64..120,
            grace in 1u64..30,
            poll in 1u64..30,
            stall in 1u64..600,
        ) {
            let toml_str = format!(
                r#"
[encoding]
fps = {}
width = {}
quality = {}

[binaries]
layout = "{}"

[timeouts]
startup_secs = {}
kill_grace_secs = {}
poll_interval_secs = {}
stall_threshold_secs = {}

[output]
folder_name = "animated"
"#,
                fps,
                width,
                quality,
                if system_layout { "system" } else { "bundled" },
                startup,
                grace,
                poll,
                stall
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.encoding.fps, fps);
            prop_assert_eq!(config.encoding.width, width);
            prop_assert_eq!(config.encoding.quality, quality);
            prop_assert_eq!(
                config.binaries.layout,
                if system_layout { BinaryLayout::System } else { BinaryLayout::Bundled }
            );
            prop_assert_eq!(config.timeouts.startup_secs, startup);
            prop_assert_eq!(config.timeouts.kill_grace_secs, grace);
            prop_assert_eq!(config.timeouts.poll_interval_secs, poll);
            prop_assert_eq!(config.timeouts.stall_threshold_secs, stall);
            prop_assert_eq!(config.output.folder_name.as_str(), "animated");
        }

        #[test]
        fn prop_env_overrides_encoding(
            initial_fps in 1u32..60,
            override_fps in 1u32..120,
            override_width in 1u32..4096,
            override_quality in 1u8..=100,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[encoding]\nfps = {}\n", initial_fps);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("GIFBATCH_FPS", override_fps.to_string());
            env::set_var("GIFBATCH_WIDTH", override_width.to_string());
            env::set_var("GIFBATCH_QUALITY", override_quality.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.encoding.fps, override_fps);
            prop_assert_eq!(config.encoding.width, override_width);
            prop_assert_eq!(config.encoding.quality, override_quality);
        }

        #[test]
        fn prop_env_overrides_startup_timeout(
            initial in 1u64..60,
            override_secs in 1u64..600,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[timeouts]\nstartup_secs = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("GIFBATCH_STARTUP_TIMEOUT_SECS", override_secs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.timeouts.startup_secs, override_secs);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.encoding.fps, 15);
        assert_eq!(config.encoding.width, 480);
        assert_eq!(config.encoding.quality, 90);
        assert_eq!(config.binaries.layout, BinaryLayout::Bundled);
        assert_eq!(config.binaries.root, None);
        assert_eq!(config.timeouts, TimeoutsConfig::default());
        assert_eq!(config.timeouts.startup_secs, 10);
        assert_eq!(config.timeouts.kill_grace_secs, 2);
        assert_eq!(config.timeouts.poll_interval_secs, 2);
        assert_eq!(config.timeouts.stall_threshold_secs, 10);
        assert_eq!(config.output.folder_name, "gifs");
        assert_eq!(config.output.temp_root, None);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[binaries]
layout = "system"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.binaries.layout, BinaryLayout::System);
        assert_eq!(config.encoding, EncodingConfig::default());
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_invalid_layout_is_parse_error() {
        let result = Config::parse_toml("[binaries]\nlayout = \"docker\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("GIFBATCH_FPS", "fast");
        env::set_var("GIFBATCH_BIN_LAYOUT", "docker");
        env::set_var("GIFBATCH_BIN_ROOT", "/opt/gifbatch");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.encoding.fps, 15);
        assert_eq!(config.binaries.layout, BinaryLayout::Bundled);
        assert_eq!(config.binaries.root, Some(PathBuf::from("/opt/gifbatch")));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load_or_default(None).expect("defaults always load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Config::load("/definitely/not/here/gifbatch.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
