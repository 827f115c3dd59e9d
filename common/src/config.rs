use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    /// Relay endpoint receiving the multipart upload.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Blend the last snapshot 50/50 over the live feed.
    #[serde(default)]
    pub onionskin: bool,
    /// Draw the "Next capture in" text on the left display.
    #[serde(default = "default_true")]
    pub countdown: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub dispatch: DispatchMode,
}

/// How the scheduler performs the round trip to the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Await the request inside the tick; the display stalls for the round trip.
    #[default]
    Inline,
    /// Run the request on a spawned task and adopt the result when it settles.
    Background,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// MJPEG stream URL (`multipart/x-mixed-replace`).
    #[serde(default = "default_camera_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest wait for the next frame before the camera counts as gone.
    #[serde(default = "default_frame_timeout_secs")]
    pub frame_timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_display_quality")]
    pub quality: u8,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_port")]
    pub port: u16,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    #[serde(default = "default_denoising_strength")]
    pub denoising_strength: f64,
    #[serde(default = "default_gen_size")]
    pub width: u32,
    #[serde(default = "default_gen_size")]
    pub height: u32,
    #[serde(default = "default_backend_timeout_secs")]
    pub request_timeout_secs: f64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            interval_secs: default_interval_secs(),
            onionskin: false,
            countdown: true,
            request_timeout_secs: default_request_timeout_secs(),
            jpeg_quality: default_jpeg_quality(),
            dispatch: DispatchMode::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: default_camera_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            frame_timeout_secs: default_frame_timeout_secs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            quality: default_display_quality(),
            fps: default_fps(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            backend_url: default_backend_url(),
            prompt: default_prompt(),
            steps: default_steps(),
            cfg_scale: default_cfg_scale(),
            denoising_strength: default_denoising_strength(),
            width: default_gen_size(),
            height: default_gen_size(),
            request_timeout_secs: default_backend_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PreviewConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }
}

impl CameraConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.frame_timeout_secs)
    }
}

impl DisplayConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}

impl RelayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot honour (zero interval, timeouts
    /// that cannot be expressed as a `Duration`, ...).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview.interval_secs == 0 {
            return Err(ConfigError::Invalid("preview.interval_secs must be > 0".into()));
        }
        check_range(
            "preview.request_timeout_secs",
            self.preview.request_timeout_secs,
            MIN_TIMEOUT_SECS,
            MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "camera.frame_timeout_secs",
            self.camera.frame_timeout_secs,
            MIN_TIMEOUT_SECS,
            MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "relay.request_timeout_secs",
            self.relay.request_timeout_secs,
            MIN_TIMEOUT_SECS,
            MAX_TIMEOUT_SECS,
        )?;
        check_range("display.fps", self.display.fps, MIN_FPS, MAX_FPS)?;
        check_range(
            "relay.denoising_strength",
            self.relay.denoising_strength,
            0.0,
            1.0,
        )?;
        if !(1..=100).contains(&self.preview.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "preview.jpeg_quality must be within 1..=100".into(),
            ));
        }
        if !(1..=100).contains(&self.display.quality) {
            return Err(ConfigError::Invalid(
                "display.quality must be within 1..=100".into(),
            ));
        }
        Ok(())
    }
}

const MIN_TIMEOUT_SECS: f64 = 0.001;
const MAX_TIMEOUT_SECS: f64 = 3600.0;
const MIN_FPS: f64 = 0.1;
const MAX_FPS: f64 = 240.0;

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    // NaN fails both comparisons.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within {min}..={max}, got {value}"
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_endpoint() -> String {
    "http://127.0.0.1:3000/".into()
}
fn default_interval_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> f64 {
    30.0
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_camera_url() -> String {
    "http://127.0.0.1:8080/stream".into()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_frame_timeout_secs() -> f64 {
    10.0
}
fn default_output_path() -> String {
    "preview.jpg".into()
}
fn default_display_quality() -> u8 {
    85
}
fn default_fps() -> f64 {
    15.0
}
fn default_relay_port() -> u16 {
    3000
}
fn default_backend_url() -> String {
    "http://127.0.0.1:7860/sdapi/v1/img2img".into()
}
fn default_prompt() -> String {
    "a forest scene".into()
}
fn default_steps() -> u32 {
    50
}
fn default_cfg_scale() -> f64 {
    9.0
}
fn default_denoising_strength() -> f64 {
    0.6
}
fn default_gen_size() -> u32 {
    512
}
fn default_backend_timeout_secs() -> f64 {
    120.0
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.preview.interval_secs, 10);
        assert_eq!(config.preview.dispatch, DispatchMode::Inline);
        assert!(!config.preview.onionskin);
        assert!(config.preview.countdown);
        assert_eq!(config.relay.port, 3000);
        assert_eq!(config.relay.prompt, "a forest scene");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [preview]
            endpoint = "http://relay.local/"
            interval_secs = 4
            onionskin = true
            dispatch = "background"
            request_timeout_secs = 2.5

            [display]
            fps = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(config.preview.endpoint, "http://relay.local/");
        assert_eq!(config.preview.interval(), Duration::from_secs(4));
        assert_eq!(config.preview.request_timeout(), Duration::from_millis(2500));
        assert_eq!(config.preview.dispatch, DispatchMode::Background);
        assert!(config.preview.onionskin);
        // Untouched keys in a present section still default.
        assert!(config.preview.countdown);
        assert_eq!(config.display.output_path, "preview.jpg");
    }

    #[test]
    fn zero_interval_rejected() {
        let err = Config::from_toml("[preview]\ninterval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(Config::from_toml("[preview]\njpeg_quality = 0\n").is_err());
        assert!(Config::from_toml("[preview]\nrequest_timeout_secs = 0.0\n").is_err());
        assert!(Config::from_toml("[display]\nfps = 0.0\n").is_err());
        assert!(Config::from_toml("[relay]\ndenoising_strength = 1.5\n").is_err());
    }

    #[test]
    fn extreme_rates_and_timeouts_rejected() {
        assert!(Config::from_toml("[display]\nfps = 1e12\n").is_err());
        assert!(Config::from_toml("[preview]\nrequest_timeout_secs = 1e30\n").is_err());
        assert!(Config::from_toml("[relay]\nrequest_timeout_secs = 0.0001\n").is_err());
        assert!(Config::from_toml("[camera]\nframe_timeout_secs = -1.0\n").is_err());
        assert!(Config::from_toml("[display]\nfps = nan\n").is_err());

        let config = Config::from_toml("[display]\nfps = 240.0\n").unwrap();
        assert!(config.display.tick_period() > Duration::ZERO);
        assert_eq!(config.camera.frame_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn unknown_dispatch_mode_is_parse_error() {
        let err = Config::from_toml("[preview]\ndispatch = \"threaded\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
