//! Configuration management (`config.toml`).
//!
//! Handles loading, saving, and providing defaults for application settings.
//! Every section is optional in the file; missing keys fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::logging::DEFAULT_LOG_FILTER;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Window settings
    #[serde(default)]
    pub window: WindowConfig,
    /// Video capture settings
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Particle field settings
    #[serde(default)]
    pub particles: ParticleConfig,
    /// Camera and controller settings
    #[serde(default)]
    pub camera: CameraConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Initial window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,
    #[serde(default = "default_window_height")]
    pub height: u32,
    #[serde(default = "default_window_title")]
    pub title: String,
}

/// Which sink receives captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Pipe frames to an external `ffmpeg` process
    #[default]
    Ffmpeg,
    /// Write the raw interleaved RGBA stream to the output file
    Raw,
}

/// Video capture settings.
///
/// Capture always runs at a fixed resolution and frame rate, independent of
/// the window size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Output file (default: `tmp.mp4`)
    #[serde(default = "default_capture_output")]
    pub output: PathBuf,
    #[serde(default = "default_capture_width")]
    pub width: u32,
    #[serde(default = "default_capture_height")]
    pub height: u32,
    #[serde(default = "default_capture_fps")]
    pub fps: u32,
    #[serde(default)]
    pub encoder: EncoderKind,
    /// Path or name of the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

/// Particle field settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// Particles per row (also the background texture width)
    #[serde(default = "default_grid_x")]
    pub grid_x: u32,
    /// Particles per column (also the background texture height)
    #[serde(default = "default_grid_y")]
    pub grid_y: u32,
    #[serde(default = "default_speed_min")]
    pub speed_min: f32,
    #[serde(default = "default_speed_mid")]
    pub speed_mid: f32,
    #[serde(default = "default_speed_top")]
    pub speed_top: f32,
    /// Half-extent of the cube particles are seeded in
    #[serde(default = "default_bounds")]
    pub bounds: f32,
    /// Image sampled as the particle color source
    #[serde(default = "default_background")]
    pub background: PathBuf,
}

/// Camera and first-person controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_walk_speed")]
    pub walk_speed: f32,
    /// Movement speed while the sprint key is held
    #[serde(default = "default_sprint_speed")]
    pub sprint_speed: f32,
    /// Radians per pixel of mouse motion
    #[serde(default = "default_sensitivity")]
    pub mouse_sensitivity: f32,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_window_title() -> String {
    "streak".to_string()
}

fn default_capture_output() -> PathBuf {
    PathBuf::from("tmp.mp4")
}
fn default_capture_width() -> u32 {
    1920
}
fn default_capture_height() -> u32 {
    1080
}
fn default_capture_fps() -> u32 {
    25
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_grid_x() -> u32 {
    960
}
fn default_grid_y() -> u32 {
    955
}
fn default_speed_min() -> f32 {
    50.0
}
fn default_speed_mid() -> f32 {
    100.0
}
fn default_speed_top() -> f32 {
    200.0
}
fn default_bounds() -> f32 {
    5000.0
}
fn default_background() -> PathBuf {
    PathBuf::from("bridge.jpg")
}

fn default_fov() -> f32 {
    90.0
}
fn default_near() -> f32 {
    1.0
}
fn default_far() -> f32 {
    1000.0
}
fn default_walk_speed() -> f32 {
    40.0
}
fn default_sprint_speed() -> f32 {
    100.0
}
fn default_sensitivity() -> f32 {
    0.01
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
            title: default_window_title(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: default_capture_output(),
            width: default_capture_width(),
            height: default_capture_height(),
            fps: default_capture_fps(),
            encoder: EncoderKind::default(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            grid_x: default_grid_x(),
            grid_y: default_grid_y(),
            speed_min: default_speed_min(),
            speed_mid: default_speed_mid(),
            speed_top: default_speed_top(),
            bounds: default_bounds(),
            background: default_background(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov(),
            near: default_near(),
            far: default_far(),
            walk_speed: default_walk_speed(),
            sprint_speed: default_sprint_speed(),
            mouse_sensitivity: default_sensitivity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl ParticleConfig {
    /// Total number of particles drawn each frame.
    #[inline]
    pub fn particle_count(&self) -> u32 {
        self.grid_x * self.grid_y
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/streak`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "", "streak").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from the platform config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> Config {
    config_dir()
        .and_then(|dir| load_from(dir.join("config.toml")).ok())
        .unwrap_or_default()
}

/// Loads the configuration from an explicit path.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_from(path: impl AsRef<Path>) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Saves the configuration to the platform config directory.
///
/// Creates the directory if it doesn't exist. Does nothing when no
/// config directory can be determined.
pub fn save(config: &Config) -> Result<()> {
    if let Some(dir) = config_dir() {
        save_to(config, dir.join("config.toml"))?;
    }
    Ok(())
}

/// Saves the configuration to an explicit path.
pub fn save_to(config: &Config, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Default value tests
    // =============================================================

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capture.output, PathBuf::from("tmp.mp4"));
        assert_eq!((config.capture.width, config.capture.height), (1920, 1080));
        assert_eq!(config.capture.fps, 25);
        assert_eq!(config.capture.encoder, EncoderKind::Ffmpeg);
        assert_eq!(config.particles.particle_count(), 960 * 955);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_particle_speeds_are_ordered() {
        let p = ParticleConfig::default();
        assert!(p.speed_min < p.speed_mid && p.speed_mid < p.speed_top);
    }

    // =============================================================
    // TOML serialization tests
    // =============================================================

    #[test]
    fn test_config_deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_deserialize_partial_capture() {
        let toml_str = r#"
[capture]
fps = 60
encoder = "raw"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capture.fps, 60);
        assert_eq!(config.capture.encoder, EncoderKind::Raw);
        assert_eq!(config.capture.width, 1920); // default
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_config_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.window.width = 800;
        config.window.height = 600;
        config.camera.fov_degrees = 70.0;
        config.particles.background = PathBuf::from("assets/sky.png");

        save_to(&config, &path).unwrap();
        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[window\nwidth = ").unwrap();
        assert!(matches!(
            load_from(&path),
            Err(crate::Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_from(dir.path().join("absent.toml")),
            Err(crate::Error::Io(_))
        ));
    }
}
