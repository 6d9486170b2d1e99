//! Configuration management for the face tracker

use crate::colorbins::BinRanges;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel ranges and resolution shared by the skin, fg and bg histograms
    pub histogram: BinRanges,

    /// Kalman geometry model
    pub geometry: GeometryConfig,

    /// Colour model learning and scoring
    pub color: ColorConfig,

    /// Caller-side bookkeeping
    pub session: SessionConfig,
}

/// Geometry (Kalman) parameters
///
/// Noise values are standard deviations expressed as fractions of the
/// current radius or of the observed box size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Smallest radius the estimate may shrink to, in pixels
    pub radius_floor: f64,

    /// Per-frame drift of the centre, per unit radius
    pub position_noise: f64,

    /// Per-frame drift of the radius, per unit radius
    pub radius_noise: f64,

    /// Per-frame drift of the `dx, dy` offsets, per unit radius
    pub offset_noise: f64,

    /// Prior standard deviation of the centre after a reset, per unit image size
    pub prior_scale: f64,

    /// Haar centre measurement noise, per unit box size
    pub haar_position_noise: f64,

    /// Haar size measurement noise, per unit box size
    pub haar_size_noise: f64,

    /// Colour centroid measurement noise, per unit radius
    pub color_position_noise: f64,

    /// Colour spread measurement noise, per unit radius
    pub color_size_noise: f64,
}

/// Colour model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Seed for the synthetic skin particles
    pub seed: u64,

    /// Mean colour of the synthetic skin particles
    pub skin_mean: [f64; 3],

    /// Per-channel standard deviation of the synthetic skin particles
    pub skin_stddev: [f64; 3],

    /// Number of synthetic skin particles seeded on reset
    pub skin_particles: usize,

    /// Foreground decay applied before each relearning, in (0, 1]
    pub fg_decay: f64,

    /// Background decay applied before each relearning, in (0, 1]
    pub bg_decay: f64,

    /// Cap on interior foreground bins after relearning
    pub fg_saturation: u32,

    /// Sampling step for whole-frame background accumulation
    pub bg_step: usize,

    /// Sampling step when relearning skin from the face window
    pub skin_step: usize,

    /// Half-size of the skin relearning window, per unit radius
    pub skin_window: f64,

    /// Share of a Haar box scored against the skin histogram
    pub candidate_window: f64,

    /// Sampling step when scoring Haar boxes
    pub candidate_step: usize,

    /// Half-size of the colour-only search window, per unit radius
    pub search_window: f64,

    /// Sampling step of the colour-only search window
    pub search_step: usize,

    /// Skin mass below which a colour-only update is skipped
    pub min_mass: f64,

    /// `|dx|, |dy|` per unit radius below which the face counts as static
    pub static_threshold: f64,
}

/// Caller-side bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames without an accepted update before the tracker is reset
    pub lost_after_frames: u64,

    /// Try a colour-only update when no Haar candidate is accepted
    pub color_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            histogram: BinRanges::default(),
            geometry: GeometryConfig::default(),
            color: ColorConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            radius_floor: 8.0,
            position_noise: 0.2,
            radius_noise: 0.1,
            offset_noise: 0.1,
            prior_scale: 1.0,
            haar_position_noise: 0.1,
            haar_size_noise: 0.2,
            color_position_noise: 0.3,
            color_size_noise: 0.3,
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            skin_mean: [140.0, 120.0, 145.0],
            skin_stddev: [50.0, 5.0, 5.0],
            skin_particles: 1000,
            fg_decay: 0.9,
            bg_decay: 0.5,
            fg_saturation: 1000,
            bg_step: 4,
            skin_step: 2,
            skin_window: 0.7,
            candidate_window: 0.5,
            candidate_step: 2,
            search_window: 2.0,
            search_step: 2,
            min_mass: 4.0,
            static_threshold: 0.25,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lost_after_frames: 30,
            color_fallback: true,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text does not parse.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Serialize configuration to YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first unusable value.
    pub fn validate(&self) -> Result<()> {
        self.histogram
            .validate()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let geometry = &self.geometry;
        if !(geometry.radius_floor > 0.0) {
            return Err(Error::ConfigError("Radius floor must be positive".to_string()));
        }
        let noises = [
            ("position_noise", geometry.position_noise),
            ("radius_noise", geometry.radius_noise),
            ("offset_noise", geometry.offset_noise),
            ("prior_scale", geometry.prior_scale),
            ("haar_position_noise", geometry.haar_position_noise),
            ("haar_size_noise", geometry.haar_size_noise),
            ("color_position_noise", geometry.color_position_noise),
            ("color_size_noise", geometry.color_size_noise),
        ];
        for (name, value) in noises {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::ConfigError(format!("{name} must be positive and finite")));
            }
        }

        let color = &self.color;
        for (name, decay) in [("fg_decay", color.fg_decay), ("bg_decay", color.bg_decay)] {
            if !(decay > 0.0 && decay <= 1.0) {
                return Err(Error::ConfigError(format!("{name} must be in (0, 1]")));
            }
        }
        for (name, step) in [
            ("bg_step", color.bg_step),
            ("skin_step", color.skin_step),
            ("candidate_step", color.candidate_step),
            ("search_step", color.search_step),
        ] {
            if step == 0 {
                return Err(Error::ConfigError(format!("{name} must be greater than 0")));
            }
        }
        if color.skin_stddev.iter().any(|&s| s < 0.0) {
            return Err(Error::ConfigError("Skin stddev must be non-negative".to_string()));
        }
        if color.fg_saturation == 0 {
            return Err(Error::ConfigError("Foreground saturation must be greater than 0".to_string()));
        }
        for (name, window) in [
            ("skin_window", color.skin_window),
            ("candidate_window", color.candidate_window),
            ("search_window", color.search_window),
        ] {
            if !(window > 0.0) {
                return Err(Error::ConfigError(format!("{name} must be positive")));
            }
        }
        if color.min_mass < 0.0 {
            return Err(Error::ConfigError("Minimum colour mass must be non-negative".to_string()));
        }
        if !(color.static_threshold > 0.0) {
            return Err(Error::ConfigError("Static threshold must be positive".to_string()));
        }

        if self.session.lost_after_frames == 0 {
            return Err(Error::ConfigError(
                "lost_after_frames must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Face tracker configuration

# Channel ranges (inclusive) and number of interior bins per channel
histogram:
  y: { min: 60, max: 240, bins: 10 }
  u: { min: 100, max: 150, bins: 10 }
  v: { min: 120, max: 170, bins: 10 }

# Kalman geometry model (noise as fractions of radius / box size)
geometry:
  radius_floor: 8.0
  position_noise: 0.2
  radius_noise: 0.1
  offset_noise: 0.1
  prior_scale: 1.0
  haar_position_noise: 0.1
  haar_size_noise: 0.2
  color_position_noise: 0.3
  color_size_noise: 0.3

# Colour models
color:
  seed: 24301
  skin_mean: [140.0, 120.0, 145.0]
  skin_stddev: [50.0, 5.0, 5.0]
  skin_particles: 1000
  fg_decay: 0.9
  bg_decay: 0.5
  fg_saturation: 1000
  bg_step: 4
  skin_step: 2
  skin_window: 0.7
  candidate_window: 0.5
  candidate_step: 2
  search_window: 2.0
  search_step: 2
  min_mass: 4.0
  static_threshold: 0.25

# Caller-side bookkeeping
session:
  lost_after_frames: 30
  color_fallback: true
"#;
