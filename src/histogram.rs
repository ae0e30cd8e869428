use bevy::{
    prelude::{Commands, Component, Entity, EventReader, Query, Res, Transform, Vec2, Vec3, With},
    render::prelude::Mesh2d,
    sprite::MeshMaterial2d,
};

use crate::{
    bodies::BodyAssets,
    board::GaltonBoard,
    layout::{to_world, BoardLayout},
    tally::{BinTally, CountersChanged},
};

const BAR_Z: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBar {
    pub bin: usize,
    /// Center of the bar's bottom edge, board coordinates.
    pub base: Vec2,
    pub width: f32,
    pub height: f32,
}

impl HistogramBar {
    /// Board-space center of the bar rectangle.
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.base.x, self.base.y - self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct HistogramBarSprite {
    pub bin: usize,
}

/// One bar per bin, left to right, scaled so the fullest bin fills the tube.
pub fn histogram_bars(layout: &BoardLayout, tally: &BinTally) -> Vec<HistogramBar> {
    (0..layout.bin_count())
        .map(|bin| HistogramBar {
            bin,
            base: Vec2::new(layout.bin_x(bin), layout.histogram_origin.y),
            width: layout.bar_width,
            height: layout.bar_capacity * tally.bar_ratio(bin),
        })
        .collect()
}

/// Full clear-and-repaint, once per frame in which any counter moved.
pub fn redraw_histogram(
    mut commands: Commands,
    mut counters_changed: EventReader<CountersChanged>,
    board: Res<GaltonBoard>,
    q_bars: Query<Entity, With<HistogramBarSprite>>,
    assets: Res<BodyAssets>,
) {
    if counters_changed.read().count() == 0 {
        return;
    }

    for entity in q_bars.iter() {
        commands.entity(entity).despawn();
    }

    for bar in histogram_bars(&board.layout, &board.tally) {
        if bar.height <= 0.0 {
            continue;
        }
        let center = to_world(bar.center());
        commands.spawn((
            HistogramBarSprite { bin: bar.bin },
            Mesh2d(assets.bar_mesh.clone()),
            MeshMaterial2d(assets.bar_material.clone()),
            Transform::from_xyz(center.x, center.y, BAR_Z).with_scale(Vec3::new(bar.width, bar.height, 1.0)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutParams;

    #[test]
    fn empty_tally_draws_flat_bars() {
        let layout = BoardLayout::compute(&LayoutParams::default());
        let tally = BinTally::new(layout.bin_count());
        let bars = histogram_bars(&layout, &tally);
        assert_eq!(bars.len(), 18);
        assert!(bars.iter().all(|b| b.height == 0.0));
    }

    #[test]
    fn fullest_bin_fills_the_capacity() {
        let layout = BoardLayout::compute(&LayoutParams { bottom_peg_row_size: 2, ..Default::default() });
        let mut tally = BinTally::new(layout.bin_count());
        let ids: Vec<_> = (0..4).map(|bin| tally.allocate_sensor(bin).unwrap()).collect();
        for _ in 0..4 {
            tally.record_pair(Some(ids[2]), None);
        }
        tally.record_pair(None, Some(ids[0]));

        let bars = histogram_bars(&layout, &tally);
        assert_eq!(bars[2].height, layout.bar_capacity);
        assert_eq!(bars[0].height, layout.bar_capacity / 4.0);
        assert_eq!(bars[1].height, 0.0);
        assert_eq!(bars[3].height, 0.0);
    }

    #[test]
    fn bars_grow_up_from_the_tube_bottom() {
        let layout = BoardLayout::compute(&LayoutParams { bottom_peg_row_size: 1, ..Default::default() });
        let mut tally = BinTally::new(2);
        let id = tally.allocate_sensor(1).unwrap();
        tally.record_pair(Some(id), None);

        let bars = histogram_bars(&layout, &tally);
        assert_eq!(bars[1].base, Vec2::new(15.0, layout.tube_bottom_y));
        assert_eq!(bars[1].width, 24.0);
        let center = bars[1].center();
        assert_eq!(center.y, layout.tube_bottom_y - layout.bar_capacity / 2.0);
        assert_eq!(bars[0].base.x, layout.sensors[0].center.x);
    }
}
