use std::collections::HashMap;

use bevy::log::debug;
use bevy::prelude::{Component, Entity, Event, EventReader, EventWriter, Query, ResMut};
use bevy_rapier2d::prelude::CollisionEvent;

use crate::board::GaltonBoard;

/// Opaque handle handed out when a sensor body is created. Bins are looked up
/// by this id, never by entity or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(u32);

impl SensorId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct BinSensor {
    pub id: SensorId,
    pub bin: usize,
}

/// Sent at most once per frame, after the collision batch bumped any bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Event)]
pub struct CountersChanged {
    pub increments: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    BinOutOfRange { bin: usize, bins: usize },
}

impl std::fmt::Display for TallyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyError::BinOutOfRange { bin, bins } => {
                write!(f, "bin {} out of range for {} bins", bin, bins)
            }
        }
    }
}

impl std::error::Error for TallyError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinTally {
    sensor_bins: HashMap<SensorId, usize>,
    next_id: u32,
    counters: Vec<u64>,
    top_counter: u64,
}

impl BinTally {
    pub fn new(bins: usize) -> Self {
        Self {
            sensor_bins: HashMap::with_capacity(bins),
            next_id: 0,
            counters: vec![0; bins],
            top_counter: 0,
        }
    }

    /// Hands out a fresh id for a sensor body covering `bin`.
    pub fn allocate_sensor(&mut self, bin: usize) -> Result<SensorId, TallyError> {
        if bin >= self.counters.len() {
            return Err(TallyError::BinOutOfRange { bin, bins: self.counters.len() });
        }
        let id = SensorId(self.next_id);
        self.next_id += 1;
        self.sensor_bins.insert(id, bin);
        Ok(id)
    }

    pub fn bin_of(&self, id: SensorId) -> Option<usize> {
        self.sensor_bins.get(&id).copied()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_bins.len()
    }

    /// Counts one collision end. Exactly one side has to be a known sensor;
    /// returns the bumped bin.
    pub fn record_pair(&mut self, a: Option<SensorId>, b: Option<SensorId>) -> Option<usize> {
        let bin_a = a.and_then(|id| self.bin_of(id));
        let bin_b = b.and_then(|id| self.bin_of(id));
        let bin = match (bin_a, bin_b) {
            (Some(bin), None) | (None, Some(bin)) => bin,
            _ => return None,
        };
        let counter = &mut self.counters[bin];
        *counter += 1;
        self.top_counter = self.top_counter.max(*counter);
        Some(bin)
    }

    /// Applies one engine step's worth of pairs; returns how many bins moved.
    pub fn record_batch<I>(&mut self, pairs: I) -> u32
    where
        I: IntoIterator<Item = (Option<SensorId>, Option<SensorId>)>,
    {
        pairs
            .into_iter()
            .filter_map(|(a, b)| self.record_pair(a, b))
            .count() as u32
    }

    pub fn counters(&self) -> &[u64] {
        &self.counters
    }

    pub fn top_counter(&self) -> u64 {
        self.top_counter
    }

    pub fn total(&self) -> u64 {
        self.counters.iter().sum()
    }

    /// Fill ratio of `bin` relative to the fullest bin, 0 while nothing counted.
    pub fn bar_ratio(&self, bin: usize) -> f32 {
        match (self.counters.get(bin), self.top_counter) {
            (_, 0) | (None, _) => 0.0,
            (Some(&count), top) => count as f32 / top as f32,
        }
    }
}

pub fn tally_collision_ends(
    mut collision_events: EventReader<CollisionEvent>,
    q_sensors: Query<&BinSensor>,
    mut board: ResMut<GaltonBoard>,
    mut changed: EventWriter<CountersChanged>,
) {
    let sensor_of = |e: Entity| q_sensors.get(e).ok().map(|s| s.id);
    let pairs: Vec<(Option<SensorId>, Option<SensorId>)> = collision_events
        .read()
        .filter_map(|event| match event {
            CollisionEvent::Stopped(e1, e2, _) => Some((sensor_of(*e1), sensor_of(*e2))),
            CollisionEvent::Started(..) => None,
        })
        .collect();
    if pairs.is_empty() {
        return;
    }

    let increments = board.tally.record_batch(pairs);
    if increments > 0 {
        debug!("tally: {} increments, top={}", increments, board.tally.top_counter());
        changed.write(CountersChanged { increments });
    }
}
