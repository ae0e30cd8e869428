//! Board geometry.
//!
//! Everything here is in board coordinates: x grows to the right and is centered
//! on the pyramid axis, y grows downward from the bead spawn line at `y = 0`.
//! The engine works in world coordinates with y pointing up; use [`to_world`]
//! and [`board_y`] at the boundary.

use std::f32::consts::FRAC_PI_2;

use bevy::math::{Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::shared_consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    pub spacing_unit: f32,
    pub bottom_peg_row_size: u32,
    pub peg_radius: f32,
    pub bead_radius: f32,
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// Beads spawn at `x` uniform in `[-bead_spawn_range, bead_spawn_range)`.
    pub bead_spawn_range: f32,
    pub top_peg_y: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            spacing_unit: DEFAULT_SPACING_UNIT,
            bottom_peg_row_size: DEFAULT_BOTTOM_PEG_ROW_SIZE,
            peg_radius: DEFAULT_PEG_RADIUS,
            bead_radius: DEFAULT_BEAD_RADIUS,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            bead_spawn_range: DEFAULT_BEAD_SPAWN_RANGE,
            top_peg_y: DEFAULT_TOP_PEG_Y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peg {
    pub center: Vec2,
    pub radius: f32,
}

/// A vertical separator between two bins. `length` runs along the rotated
/// axis, so the wall is `length` tall once `angle` is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubeWall {
    pub center: Vec2,
    pub length: f32,
    pub thickness: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSlot {
    pub bin: usize,
    pub center: Vec2,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardLayout {
    pub params: LayoutParams,
    pub pegs: Vec<Peg>,
    pub walls: Vec<TubeWall>,
    pub sensors: Vec<SensorSlot>,
    pub pyramid_height: f32,
    pub tube_height: f32,
    pub tube_bottom_y: f32,
    /// Left end of the histogram baseline (first bin's x, tube bottom y).
    pub histogram_origin: Vec2,
    pub bar_width: f32,
    pub bar_capacity: f32,
}

pub fn to_world(p: Vec2) -> Vec2 {
    Vec2::new(p.x, -p.y)
}

pub fn board_y(world_y: f32) -> f32 {
    -world_y
}

impl BoardLayout {
    pub fn compute(params: &LayoutParams) -> Self {
        let n = params.bottom_peg_row_size as usize;
        let unit = params.spacing_unit;
        let peg_hspacing = 2.0 * unit;

        let mut pegs = Vec::with_capacity(n * (n + 1) / 2);
        for row in 0..n {
            let shift = row as f32 * peg_hspacing / 2.0;
            let y = params.top_peg_y + row as f32 * unit;
            for k in 0..=row {
                pegs.push(Peg {
                    center: Vec2::new(-shift + k as f32 * peg_hspacing, y),
                    radius: params.peg_radius,
                });
            }
        }

        let pyramid_height = (n as f32 - 1.0) * unit;
        // A single-row pyramid has no height; keep the tubes one unit tall.
        let tube_height = pyramid_height.max(unit);
        let wall_center_y = params.top_peg_y + pyramid_height + tube_height / 2.0 + unit;
        let tube_bottom_y = wall_center_y + tube_height / 2.0;

        let wall_count = 2 * n + 1;
        let wall_shift = (wall_count - 1) as f32 * unit / 2.0;
        let walls = (0..wall_count)
            .map(|i| TubeWall {
                center: Vec2::new(-wall_shift + i as f32 * unit, wall_center_y),
                length: tube_height,
                thickness: WALL_THICKNESS,
                angle: FRAC_PI_2,
            })
            .collect();

        let sensor_count = wall_count - 1;
        let sensor_shift = sensor_count.saturating_sub(1) as f32 * unit / 2.0;
        let sensor_size = SENSOR_SIZE_RATIO * unit;
        let sensors: Vec<SensorSlot> = (0..sensor_count)
            .map(|bin| SensorSlot {
                bin,
                center: Vec2::new(-sensor_shift + bin as f32 * unit, tube_bottom_y - sensor_size),
                size: sensor_size,
            })
            .collect();

        let histogram_origin = Vec2::new(-sensor_shift, tube_bottom_y);

        Self {
            params: *params,
            pegs,
            walls,
            sensors,
            pyramid_height,
            tube_height,
            tube_bottom_y,
            histogram_origin,
            bar_width: sensor_size,
            bar_capacity: tube_height,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.sensors.len()
    }

    /// x of bin `bin`'s center, measured from the histogram origin.
    pub fn bin_x(&self, bin: usize) -> f32 {
        self.histogram_origin.x + bin as f32 * self.params.spacing_unit
    }

    /// Smallest rectangle holding the spawn line, every peg and every wall.
    pub fn bounds(&self) -> Rect {
        let p = &self.params;
        let half_walls = self.walls.first().map(|w| -w.center.x).unwrap_or(0.0) + WALL_THICKNESS;
        let half_pegs = self
            .pegs
            .iter()
            .map(|peg| peg.center.x.abs() + peg.radius)
            .fold(0.0_f32, f32::max);
        let half_width = half_walls.max(half_pegs).max(p.bead_spawn_range + p.bead_radius);
        Rect::new(-half_width, -p.bead_radius, half_width, self.tube_bottom_y)
    }

    pub fn bead_spawn_point(&self, x: f32) -> Vec2 {
        Vec2::new(x.clamp(-self.params.bead_spawn_range, self.params.bead_spawn_range), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: u32) -> LayoutParams {
        LayoutParams { bottom_peg_row_size: n, ..Default::default() }
    }

    #[test]
    fn counts_follow_row_size() {
        for n in 1..=15u32 {
            let layout = BoardLayout::compute(&params(n));
            let n = n as usize;
            assert_eq!(layout.pegs.len(), n * (n + 1) / 2);
            assert_eq!(layout.walls.len(), 2 * n + 1);
            assert_eq!(layout.sensors.len(), 2 * n);
            assert_eq!(layout.bin_count(), layout.walls.len() - 1);
        }
    }

    #[test]
    fn zero_rows_build_an_empty_board() {
        let layout = BoardLayout::compute(&params(0));
        assert!(layout.pegs.is_empty());
        assert!(layout.sensors.is_empty());
        assert_eq!(layout.walls.len(), 1);
        assert_eq!(layout.bin_count(), 0);
        assert_eq!(layout.histogram_origin.x, 0.0);
    }

    #[test]
    fn single_row_board() {
        let layout = BoardLayout::compute(&params(1));
        assert_eq!(layout.pegs.len(), 1);
        assert_eq!(layout.pegs[0].center, Vec2::new(0.0, 100.0));
        assert_eq!(layout.walls.len(), 3);
        assert_eq!(layout.sensors.len(), 2);
        assert!(layout.tube_height > 0.0);
        assert_eq!(layout.sensors[0].center.x, -15.0);
        assert_eq!(layout.sensors[1].center.x, 15.0);
    }

    #[test]
    fn pyramid_rows_are_centered() {
        let layout = BoardLayout::compute(&params(9));
        let mut start = 0;
        for row in 0..9usize {
            let pegs = &layout.pegs[start..start + row + 1];
            let sum: f32 = pegs.iter().map(|p| p.center.x).sum();
            assert!(sum.abs() < 1e-3, "row {} not centered", row);
            assert!(pegs.iter().all(|p| p.center.y == 100.0 + row as f32 * 30.0));
            for w in pegs.windows(2) {
                assert_eq!(w[1].center.x - w[0].center.x, 60.0);
            }
            start += row + 1;
        }
    }

    #[test]
    fn sensors_sit_between_walls() {
        let layout = BoardLayout::compute(&params(4));
        for (i, sensor) in layout.sensors.iter().enumerate() {
            let left = layout.walls[i].center.x;
            let right = layout.walls[i + 1].center.x;
            assert_eq!(sensor.bin, i);
            assert!((sensor.center.x - (left + right) / 2.0).abs() < 1e-4);
            assert_eq!(sensor.size, 24.0);
            assert_eq!(sensor.center.y, layout.tube_bottom_y - 24.0);
            assert_eq!(layout.bin_x(i), sensor.center.x);
        }
    }

    #[test]
    fn walls_hang_below_the_pyramid() {
        let layout = BoardLayout::compute(&params(9));
        assert_eq!(layout.pyramid_height, 240.0);
        assert_eq!(layout.tube_height, 240.0);
        for wall in &layout.walls {
            assert_eq!(wall.center.y, 100.0 + 240.0 + 120.0 + 30.0);
            assert_eq!(wall.length, 240.0);
            assert_eq!(wall.angle, FRAC_PI_2);
        }
        assert_eq!(layout.walls[0].center.x, -270.0);
        assert_eq!(layout.walls[18].center.x, 270.0);
        assert_eq!(layout.tube_bottom_y, 610.0);
        assert_eq!(layout.histogram_origin, Vec2::new(-255.0, 610.0));
    }

    #[test]
    fn derived_values_track_the_spacing_unit() {
        let small = BoardLayout::compute(&LayoutParams { spacing_unit: 20.0, ..params(3) });
        let large = BoardLayout::compute(&LayoutParams { spacing_unit: 40.0, ..params(3) });
        assert_eq!(small.bar_width, 16.0);
        assert_eq!(large.bar_width, 32.0);
        assert_eq!(large.bar_capacity, 2.0 * small.bar_capacity);
        assert_eq!(large.histogram_origin.x, 2.0 * small.histogram_origin.x);
    }

    #[test]
    fn layout_is_deterministic() {
        let a = BoardLayout::compute(&params(9));
        let b = BoardLayout::compute(&params(9));
        assert_eq!(a, b);
        for (pa, pb) in a.pegs.iter().zip(&b.pegs) {
            assert_eq!(pa.center.x.to_bits(), pb.center.x.to_bits());
            assert_eq!(pa.center.y.to_bits(), pb.center.y.to_bits());
        }
    }

    #[test]
    fn bounds_cover_the_board() {
        let layout = BoardLayout::compute(&params(9));
        let b = layout.bounds();
        for peg in &layout.pegs {
            assert!(b.contains(peg.center));
        }
        for wall in &layout.walls {
            assert!(b.min.x <= wall.center.x && wall.center.x <= b.max.x);
        }
        assert_eq!(b.max.y, layout.tube_bottom_y);
    }

    #[test]
    fn world_conversion_flips_y() {
        assert_eq!(to_world(Vec2::new(3.0, 10.0)), Vec2::new(3.0, -10.0));
        assert_eq!(board_y(-10.0), 10.0);
    }
}
