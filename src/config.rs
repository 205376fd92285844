//! Configuration using Figment
//!
//! Settings are loaded from an optional TOML file and then from environment
//! variables prefixed with `OPI_`. The first underscore after the prefix
//! separates the section from the key:
//!
//! ```text
//! OPI_SERVER_PORT=50002
//! OPI_APPLICATION_LOG_LEVEL=debug
//! OPI_DISPLAY_MAX_LUM=3183.099
//! OPI_CAMERA_SIMULATED=false
//! ```
//!
//! Every key has a default, so an empty configuration is valid.
//!
//! # Example
//!
//! ```no_run
//! use rust_opi::config::Settings;
//!
//! let settings = Settings::load(Some("config/opi.toml".as_ref()))?;
//! println!("Listening on {}", settings.server.socket_addr());
//! # Ok::<(), rust_opi::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The sources could not be read or did not match the expected shape.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// Values parsed but are not usable.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Listening socket and device selection
    #[serde(default)]
    pub server: ServerConfig,
    /// Display description reported by QUERY
    #[serde(default)]
    pub display: DisplayConfig,
    /// Eye camera and sample correlation
    #[serde(default)]
    pub camera: CameraConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

/// Session server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port; 0 picks a free port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Registered device name to serve
    #[serde(default = "default_machine")]
    pub machine: String,
}

/// Display description, reported verbatim by QUERY
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    /// Viewing distance (cm)
    #[serde(default = "default_distance")]
    pub distance: f64,
    /// Field of view (degrees)
    #[serde(default = "default_fov", alias = "field_of_view")]
    pub fov: f64,
    /// MONO or STEREO
    #[serde(default = "default_view_mode", alias = "view_mode")]
    pub view_mode: String,
    /// Response input device
    #[serde(default = "default_input")]
    pub input: String,
    /// Use pseudo-gray bit stealing
    #[serde(default, alias = "pseudo_gray")]
    pub pseudo_gray: bool,
    /// Run full screen
    #[serde(default, alias = "full_screen")]
    pub full_screen: bool,
    /// Eye tracking available
    #[serde(default)]
    pub tracking: bool,
    /// Maximum luminance (cd/m^2)
    #[serde(default = "default_max_lum", alias = "max_lum")]
    pub max_lum: f64,
    /// Maximum pixel value
    #[serde(default = "default_max_pixel", alias = "max_pixel")]
    pub max_pixel: u32,
    /// Luminance precision (cd/m^2)
    #[serde(default = "default_lum_precision", alias = "lum_precision")]
    pub lum_precision: f64,
    /// Gamma calibration file
    #[serde(default, alias = "gamma_file")]
    pub gamma_file: String,
    /// Update loop rate (Hz)
    #[serde(default = "default_frame_rate", alias = "frame_rate")]
    pub frame_rate: f64,
}

/// Eye camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Request eye samples at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Answer requests with a simulated camera
    #[serde(default = "default_enabled")]
    pub simulated: bool,
    /// Capacity of the request and response queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Give up on a sample after this many milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Poll the response queue this often (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Latency of the simulated camera (ms)
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "rust_opi".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    50001
}

fn default_machine() -> String {
    "display".to_string()
}

fn default_distance() -> f64 {
    50.0
}

fn default_fov() -> f64 {
    60.0
}

fn default_view_mode() -> String {
    "MONO".to_string()
}

fn default_input() -> String {
    "mouse".to_string()
}

fn default_max_lum() -> f64 {
    3183.099
}

fn default_max_pixel() -> u32 {
    255
}

fn default_lum_precision() -> f64 {
    0.1
}

fn default_frame_rate() -> f64 {
    60.0
}

fn default_enabled() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    16
}

fn default_max_wait_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_latency_ms() -> u64 {
    4
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            machine: default_machine(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            distance: default_distance(),
            fov: default_fov(),
            view_mode: default_view_mode(),
            input: default_input(),
            pseudo_gray: false,
            full_screen: false,
            tracking: false,
            max_lum: default_max_lum(),
            max_pixel: default_max_pixel(),
            lum_precision: default_lum_precision(),
            gamma_file: String::new(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            simulated: default_enabled(),
            queue_capacity: default_queue_capacity(),
            max_wait_ms: default_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            latency_ms: default_latency_ms(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load from an optional TOML file and `OPI_` environment variables.
    ///
    /// Environment variables take precedence over the file. The result is
    /// validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if a source cannot be parsed or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Self::env()))
    }

    /// Load from a TOML file only, ignoring the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn env() -> Env {
        Env::prefixed("OPI_").map(|key| key.as_str().replacen('_', ".", 1).into())
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Self = figment.extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - A machine is named
    /// - Frame rate is positive
    /// - Camera queues hold at least one item
    /// - The camera poll interval fits inside the sample wait
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.server.machine.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.machine cannot be empty".to_string(),
            ));
        }

        if !(self.display.frame_rate.is_finite() && self.display.frame_rate > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid display.frame_rate {}. Must be positive",
                self.display.frame_rate
            )));
        }

        if self.camera.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "camera.queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.camera.poll_interval_ms == 0
            || self.camera.poll_interval_ms > self.camera.max_wait_ms
        {
            return Err(ConfigError::ValidationError(format!(
                "camera.poll_interval_ms {} must be between 1 and max_wait_ms {}",
                self.camera.poll_interval_ms, self.camera.max_wait_ms
            )));
        }

        Ok(())
    }
}

impl ServerConfig {
    /// `address:port` to bind.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl DisplayConfig {
    /// Time between update ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }
}

impl CameraConfig {
    /// Sample wait bound.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Sample poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
