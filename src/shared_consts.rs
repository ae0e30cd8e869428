// Board units are pixels; rapier works in meters internally.
pub const PIXELS_PER_METER: f32 = 50.0;

// Gravity in board pixels per second squared (downward in world space).
pub const GRAVITY: f32 = -980.0;

pub const DEFAULT_SPACING_UNIT: f32 = 30.0;
pub const DEFAULT_BOTTOM_PEG_ROW_SIZE: u32 = 9;
pub const DEFAULT_PEG_RADIUS: f32 = 5.0;
pub const DEFAULT_BEAD_RADIUS: f32 = 8.0;
pub const DEFAULT_CANVAS_WIDTH: f32 = 800.0;
pub const DEFAULT_CANVAS_HEIGHT: f32 = 600.0;
pub const DEFAULT_BEAD_SPAWN_RANGE: f32 = 10.0;
pub const DEFAULT_TOP_PEG_Y: f32 = 100.0;

pub const DEFAULT_SPAWN_INTERVAL_MS: u64 = 250;
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 5000;

pub const WALL_THICKNESS: f32 = 1.0;
pub const SENSOR_SIZE_RATIO: f32 = 0.8;

pub const BEAD_FRICTION: f32 = 1e-5;
pub const BEAD_RESTITUTION: f32 = 0.001;
pub const BEAD_DENSITY: f32 = 1e-3;

pub const DEFAULT_PEG_COLOR: &str = "#d138d3";
pub const DEFAULT_BEAD_COLOR: &str = "#ffc83d";
pub const DEFAULT_WALL_COLOR: &str = "#f0f0f0";
pub const DEFAULT_SENSOR_COLOR: &str = "#590000";
pub const DEFAULT_BAR_COLOR: &str = "#3d8bff";
pub const DEFAULT_BACKGROUND_COLOR: &str = "#2b2e30";
