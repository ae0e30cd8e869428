use std::collections::HashMap;
use std::path::Path;

use bevy::color::{Color, Srgba};
use serde::{Deserialize, Serialize};

use crate::layout::LayoutParams;
use crate::shared_consts::*;

// Named parameters, spelled the way a style sheet would spell them.
pub const SPACING_UNIT: &str = "spacing-unit";
pub const BOTTOM_PEG_ROW_SIZE: &str = "bottom-peg-row-size";
pub const PEG_RADIUS: &str = "peg-radius";
pub const BEAD_RADIUS: &str = "bead-radius";
pub const CANVAS_WIDTH: &str = "canvas-width";
pub const CANVAS_HEIGHT: &str = "canvas-height";
pub const BEAD_SPAWN_RANGE: &str = "bead-spawn-range";
pub const TOP_PEG_Y: &str = "top-peg-y";
pub const SPAWN_INTERVAL_MS: &str = "spawn-interval-ms";
pub const REAP_INTERVAL_MS: &str = "reap-interval-ms";
pub const BEAD_MAX_AGE_MS: &str = "bead-max-age-ms";
pub const PEG_COLOR: &str = "peg-color";
pub const BEAD_COLOR: &str = "bead-color";
pub const WALL_COLOR: &str = "wall-color";
pub const SENSOR_COLOR: &str = "sensor-color";
pub const BAR_COLOR: &str = "bar-color";
pub const BACKGROUND_COLOR: &str = "background-color";

const ENV_PREFIX: &str = "GALTON_";

#[derive(Debug)]
pub enum ConfigError {
    NotPositive { name: &'static str, value: f64 },
    InvalidRowCount(f64),
    NotANumber { name: String, value: String },
    InvalidColor { name: String, value: String },
    BeadTooLarge { bead_diameter: f32, tube_width: f32 },
    PegsOverlap { peg_radius: f32, spacing_unit: f32 },
    SpawnRangeOutsideCanvas { range: f32, half_width: f32 },
    Io { path: String, source: std::io::Error },
    Json { path: String, source: serde_json::Error },
    NotAnObject(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotPositive { name, value } => {
                write!(f, "parameter '{}' must be positive, got {}", name, value)
            }
            ConfigError::InvalidRowCount(v) => {
                write!(f, "parameter '{}' must be an integer >= 1, got {}", BOTTOM_PEG_ROW_SIZE, v)
            }
            ConfigError::NotANumber { name, value } => {
                write!(f, "parameter '{}' is not a number: {:?}", name, value)
            }
            ConfigError::InvalidColor { name, value } => {
                write!(f, "parameter '{}' is not a hex color: {:?}", name, value)
            }
            ConfigError::BeadTooLarge { bead_diameter, tube_width } => write!(
                f,
                "bead diameter {} does not fit a tube of width {}",
                bead_diameter, tube_width
            ),
            ConfigError::PegsOverlap { peg_radius, spacing_unit } => write!(
                f,
                "peg radius {} overlaps neighbours at spacing unit {}",
                peg_radius, spacing_unit
            ),
            ConfigError::SpawnRangeOutsideCanvas { range, half_width } => write!(
                f,
                "bead spawn range {} exceeds half the canvas width {}",
                range, half_width
            ),
            ConfigError::Io { path, source } => write!(f, "cannot read config {}: {}", path, source),
            ConfigError::Json { path, source } => write!(f, "invalid config {}: {}", path, source),
            ConfigError::NotAnObject(path) => write!(f, "config {} must be a JSON object", path),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Where named parameters come from. The board only needs "read a number" and
/// "read a string"; the retrieval mechanism stays behind this trait.
pub trait ParamSource {
    fn number(&self, name: &str) -> Result<Option<f64>, ConfigError>;
    fn string(&self, name: &str) -> Option<String>;
}

fn parse_number(name: &str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim().parse::<f64>().map_err(|_| ConfigError::NotANumber {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

/// `GALTON_SPACING_UNIT=24` style overrides.
#[derive(Debug, Clone, Default)]
pub struct EnvParams {
    vars: HashMap<String, String>,
}

impl EnvParams {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self { vars }
    }

    fn key(name: &str) -> String {
        format!("{}{}", ENV_PREFIX, name.replace('-', "_").to_uppercase())
    }
}

impl ParamSource for EnvParams {
    fn number(&self, name: &str) -> Result<Option<f64>, ConfigError> {
        match self.vars.get(&Self::key(name)) {
            Some(raw) => parse_number(name, raw).map(Some),
            None => Ok(None),
        }
    }

    fn string(&self, name: &str) -> Option<String> {
        self.vars.get(&Self::key(name)).cloned()
    }
}

/// A flat JSON object keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct JsonParams {
    values: serde_json::Map<String, serde_json::Value>,
}

impl JsonParams {
    pub fn from_json(origin: &str, text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: origin.to_string(),
            source,
        })?;
        match value {
            serde_json::Value::Object(values) => Ok(Self { values }),
            _ => Err(ConfigError::NotAnObject(origin.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: origin.clone(),
            source,
        })?;
        Self::from_json(&origin, &text)
    }
}

impl ParamSource for JsonParams {
    fn number(&self, name: &str) -> Result<Option<f64>, ConfigError> {
        match self.values.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
            Some(serde_json::Value::String(s)) => parse_number(name, s).map(Some),
            Some(other) => Err(ConfigError::NotANumber {
                name: name.to_string(),
                value: other.to_string(),
            }),
        }
    }

    fn string(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardStyle {
    pub peg_color: String,
    pub bead_color: String,
    pub wall_color: String,
    pub sensor_color: String,
    pub bar_color: String,
    pub background_color: String,
}

impl Default for BoardStyle {
    fn default() -> Self {
        Self {
            peg_color: DEFAULT_PEG_COLOR.to_string(),
            bead_color: DEFAULT_BEAD_COLOR.to_string(),
            wall_color: DEFAULT_WALL_COLOR.to_string(),
            sensor_color: DEFAULT_SENSOR_COLOR.to_string(),
            bar_color: DEFAULT_BAR_COLOR.to_string(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
        }
    }
}

/// Parsed colors, ready for the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub peg: Color,
    pub bead: Color,
    pub wall: Color,
    pub sensor: Color,
    pub bar: Color,
    pub background: Color,
}

fn parse_color(name: &str, value: &str) -> Result<Color, ConfigError> {
    Srgba::hex(value).map(Color::from).map_err(|_| ConfigError::InvalidColor {
        name: name.to_string(),
        value: value.to_string(),
    })
}

impl BoardStyle {
    pub fn palette(&self) -> Result<Palette, ConfigError> {
        Ok(Palette {
            peg: parse_color(PEG_COLOR, &self.peg_color)?,
            bead: parse_color(BEAD_COLOR, &self.bead_color)?,
            wall: parse_color(WALL_COLOR, &self.wall_color)?,
            sensor: parse_color(SENSOR_COLOR, &self.sensor_color)?,
            bar: parse_color(BAR_COLOR, &self.bar_color)?,
            background: parse_color(BACKGROUND_COLOR, &self.background_color)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub spawn_interval_ms: u64,
    pub reap_interval_ms: u64,
    // None keeps stuck beads until they fall off the board.
    pub bead_max_age_ms: Option<u64>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            spawn_interval_ms: DEFAULT_SPAWN_INTERVAL_MS,
            reap_interval_ms: DEFAULT_REAP_INTERVAL_MS,
            bead_max_age_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    pub layout: LayoutParams,
    pub style: BoardStyle,
    pub timings: Timings,
}

fn positive_ms(name: &'static str, v: f64) -> Result<u64, ConfigError> {
    if !(v.is_finite() && v >= 1.0) {
        return Err(ConfigError::NotPositive { name, value: v });
    }
    Ok(v.round() as u64)
}

impl BoardConfig {
    /// Overrides every parameter `src` provides; missing ones keep their value.
    pub fn apply(&mut self, src: &dyn ParamSource) -> Result<(), ConfigError> {
        let l = &mut self.layout;
        let floats: [(&str, &mut f32); 7] = [
            (SPACING_UNIT, &mut l.spacing_unit),
            (PEG_RADIUS, &mut l.peg_radius),
            (BEAD_RADIUS, &mut l.bead_radius),
            (CANVAS_WIDTH, &mut l.canvas_width),
            (CANVAS_HEIGHT, &mut l.canvas_height),
            (BEAD_SPAWN_RANGE, &mut l.bead_spawn_range),
            (TOP_PEG_Y, &mut l.top_peg_y),
        ];
        for (name, slot) in floats {
            if let Some(v) = src.number(name)? {
                *slot = v as f32;
            }
        }
        if let Some(v) = src.number(BOTTOM_PEG_ROW_SIZE)? {
            if !(v.is_finite() && v >= 1.0 && v.fract() == 0.0 && v <= u32::MAX as f64) {
                return Err(ConfigError::InvalidRowCount(v));
            }
            l.bottom_peg_row_size = v as u32;
        }

        if let Some(v) = src.number(SPAWN_INTERVAL_MS)? {
            self.timings.spawn_interval_ms = positive_ms("spawn-interval-ms", v)?;
        }
        if let Some(v) = src.number(REAP_INTERVAL_MS)? {
            self.timings.reap_interval_ms = positive_ms("reap-interval-ms", v)?;
        }
        if let Some(v) = src.number(BEAD_MAX_AGE_MS)? {
            // 0 switches age-based reaping off
            self.timings.bead_max_age_ms = if v == 0.0 {
                None
            } else {
                Some(positive_ms("bead-max-age-ms", v)?)
            };
        }

        let s = &mut self.style;
        let colors: [(&str, &mut String); 6] = [
            (PEG_COLOR, &mut s.peg_color),
            (BEAD_COLOR, &mut s.bead_color),
            (WALL_COLOR, &mut s.wall_color),
            (SENSOR_COLOR, &mut s.sensor_color),
            (BAR_COLOR, &mut s.bar_color),
            (BACKGROUND_COLOR, &mut s.background_color),
        ];
        for (name, slot) in colors {
            if let Some(v) = src.string(name) {
                *slot = v;
            }
        }
        Ok(())
    }

    /// Rejects parameters that would produce degenerate geometry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.layout;
        let positives: [(&'static str, f32); 5] = [
            ("spacing-unit", l.spacing_unit),
            ("peg-radius", l.peg_radius),
            ("bead-radius", l.bead_radius),
            ("canvas-width", l.canvas_width),
            ("canvas-height", l.canvas_height),
        ];
        for (name, v) in positives {
            if !(v.is_finite() && v > 0.0) {
                return Err(ConfigError::NotPositive { name, value: v as f64 });
            }
        }
        if !(l.bead_spawn_range.is_finite() && l.bead_spawn_range >= 0.0) {
            return Err(ConfigError::NotPositive { name: "bead-spawn-range", value: l.bead_spawn_range as f64 });
        }
        if !(l.top_peg_y.is_finite() && l.top_peg_y >= 0.0) {
            return Err(ConfigError::NotPositive { name: "top-peg-y", value: l.top_peg_y as f64 });
        }
        if l.bottom_peg_row_size == 0 {
            return Err(ConfigError::InvalidRowCount(0.0));
        }
        if l.peg_radius >= l.spacing_unit {
            return Err(ConfigError::PegsOverlap { peg_radius: l.peg_radius, spacing_unit: l.spacing_unit });
        }
        let tube_width = l.spacing_unit - WALL_THICKNESS;
        if 2.0 * l.bead_radius >= tube_width {
            return Err(ConfigError::BeadTooLarge { bead_diameter: 2.0 * l.bead_radius, tube_width });
        }
        let half_width = 0.5 * l.canvas_width;
        if l.bead_spawn_range > half_width {
            return Err(ConfigError::SpawnRangeOutsideCanvas { range: l.bead_spawn_range, half_width });
        }
        if self.timings.spawn_interval_ms == 0 {
            return Err(ConfigError::NotPositive { name: "spawn-interval-ms", value: 0.0 });
        }
        if self.timings.reap_interval_ms == 0 {
            return Err(ConfigError::NotPositive { name: "reap-interval-ms", value: 0.0 });
        }
        self.style.palette()?;
        Ok(())
    }

    /// Defaults, then the optional JSON file, then the environment.
    pub fn from_sources(sources: &[&dyn ParamSource]) -> Result<Self, ConfigError> {
        let mut config = BoardConfig::default();
        for src in sources {
            config.apply(*src)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reads `GALTON_CONFIG` (a JSON file) and `GALTON_*` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let env = EnvParams::from_env();
        match std::env::var("GALTON_CONFIG").ok() {
            Some(path) => {
                let file = JsonParams::from_path(Path::new(&path))?;
                Self::from_sources(&[&file, &env])
            }
            None => Self::from_sources(&[&env]),
        }
    }
}
