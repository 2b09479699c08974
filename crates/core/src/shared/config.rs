use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    CARD_ASPECT_RATIO, CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_ACCUMULATOR_CAPACITY,
    DEFAULT_MAX_LONG_SIDE, DEFAULT_TRIGGER_THRESHOLD,
};
use crate::shared::error::CardError;

/// Tuning for the contour-based card detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Douglas-Peucker epsilon as a fraction of the contour perimeter.
    pub approx_epsilon: f64,
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
    pub aspect_ratio: f32,
    pub aspect_tolerance: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            canny_low: 20.0,
            canny_high: 60.0,
            approx_epsilon: 0.02,
            min_area_ratio: 0.05,
            max_area_ratio: 0.95,
            aspect_ratio: CARD_ASPECT_RATIO,
            aspect_tolerance: 0.065,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    /// A capture fires once the count is strictly greater than this.
    pub threshold: usize,
    pub capacity: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_TRIGGER_THRESHOLD,
            capacity: DEFAULT_ACCUMULATOR_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifierConfig {
    pub aspect_ratio: f32,
    pub max_long_side: u32,
}

impl RectifierConfig {
    pub fn validate(&self) -> Result<(), CardError> {
        if !(self.aspect_ratio >= 1.0 && self.aspect_ratio.is_finite()) || self.max_long_side == 0 {
            return Err(CardError::Config(
                "rectifier.aspect_ratio must be >= 1 and max_long_side non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RectifierConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: CARD_ASPECT_RATIO,
            max_long_side: DEFAULT_MAX_LONG_SIDE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub detector: DetectorConfig,
    pub accumulator: AccumulatorConfig,
    pub rectifier: RectifierConfig,
}

impl ScanConfig {
    /// `<config dir>/cardscan/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, CardError> {
        let json = fs::read_to_string(path).map_err(|source| CardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| CardError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file at [`ScanConfig::default_path`], falling back to
    /// defaults when it is missing or unreadable.
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring config {}: {e}", path.display());
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CardError> {
        let io_err = |source| CardError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CardError::Config(e.to_string()))?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), CardError> {
        let d = &self.detector;
        if !(d.blur_sigma > 0.0) {
            return Err(CardError::Config("detector.blur_sigma must be positive".into()));
        }
        if !(d.canny_low >= 0.0 && d.canny_low <= d.canny_high) {
            return Err(CardError::Config(
                "detector.canny_low must be within 0..=canny_high".into(),
            ));
        }
        if !(d.approx_epsilon > 0.0) {
            return Err(CardError::Config("detector.approx_epsilon must be positive".into()));
        }
        if !(d.min_area_ratio >= 0.0 && d.min_area_ratio < d.max_area_ratio && d.max_area_ratio <= 1.0)
        {
            return Err(CardError::Config(
                "detector area ratios must satisfy 0 <= min < max <= 1".into(),
            ));
        }
        if !(d.aspect_ratio >= 1.0 && d.aspect_tolerance > 0.0) {
            return Err(CardError::Config(
                "detector.aspect_ratio must be >= 1 and aspect_tolerance positive".into(),
            ));
        }

        let a = &self.accumulator;
        if a.capacity <= a.threshold {
            return Err(CardError::Config(format!(
                "accumulator.capacity ({}) must exceed threshold ({})",
                a.capacity, a.threshold
            )));
        }

        self.rectifier.validate()
    }
}
