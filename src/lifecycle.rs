use std::time::Duration;

use bevy::{
    log::debug,
    prelude::{
        Assets, Commands, Entity, EventReader, Mesh, Query, Res, ResMut, Resource, Time, Timer,
        TimerMode, Transform,
    },
    sprite::ColorMaterial,
    window::WindowOccluded,
};

use crate::{
    bodies::{bead, spawn_body, Bead, BodyAssets},
    board::{GaltonBoard, RngResource},
    config::Timings,
    layout::board_y,
};

/// Spawn and reap cadence. Both timers repeat until [`BeadLifecycle::cancel`].
#[derive(Debug, Clone, Resource)]
pub struct BeadLifecycle {
    spawn_timer: Timer,
    reap_timer: Timer,
    max_age: Option<Duration>,
    spawning_enabled: bool,
    cancelled: bool,
    spawned: u64,
    reaped: u64,
}

impl BeadLifecycle {
    pub fn new(timings: &Timings) -> Self {
        Self {
            spawn_timer: Timer::new(Duration::from_millis(timings.spawn_interval_ms), TimerMode::Repeating),
            reap_timer: Timer::new(Duration::from_millis(timings.reap_interval_ms), TimerMode::Repeating),
            max_age: timings.bead_max_age_ms.map(Duration::from_millis),
            spawning_enabled: true,
            cancelled: false,
            spawned: 0,
            reaped: 0,
        }
    }

    /// True when a bead should be dropped now. Firings while the host is
    /// hidden are dropped, not queued.
    pub fn tick_spawn(&mut self, delta: Duration, visible: bool) -> bool {
        if self.cancelled {
            return false;
        }
        let fired = self.spawn_timer.tick(delta).just_finished();
        fired && visible && self.spawning_enabled
    }

    pub fn tick_reap(&mut self, delta: Duration) -> bool {
        if self.cancelled {
            return false;
        }
        self.reap_timer.tick(delta).just_finished()
    }

    /// Stops both periodic tasks for good.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.spawn_timer.pause();
        self.reap_timer.pause();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn spawn_interval(&self) -> Duration {
        self.spawn_timer.duration()
    }

    pub fn reap_interval(&self) -> Duration {
        self.reap_timer.duration()
    }

    pub fn set_spawn_interval(&mut self, interval: Duration) {
        self.spawn_timer.set_duration(interval);
        self.spawn_timer.reset();
    }

    pub fn set_reap_interval(&mut self, interval: Duration) {
        self.reap_timer.set_duration(interval);
        self.reap_timer.reset();
    }

    pub fn spawning_enabled(&self) -> bool {
        self.spawning_enabled
    }

    pub fn set_spawning_enabled(&mut self, enabled: bool) {
        self.spawning_enabled = enabled;
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: Option<Duration>) {
        self.max_age = max_age;
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    pub fn reaped(&self) -> u64 {
        self.reaped
    }
}

/// Whether the window is on screen. Headless runs never flip it.
#[derive(Debug, Clone, Copy, Resource)]
pub struct HostVisibility {
    pub visible: bool,
}

impl Default for HostVisibility {
    fn default() -> Self {
        Self { visible: true }
    }
}

pub fn is_fallen(bead_board_y: f32, canvas_height: f32) -> bool {
    bead_board_y > canvas_height
}

pub fn is_expired(age: Duration, max_age: Option<Duration>) -> bool {
    matches!(max_age, Some(max) if age > max)
}

/// Picks the beads a reap pass removes. Items are `(key, board_y, age)`.
pub fn beads_to_reap<K, I>(beads: I, canvas_height: f32, max_age: Option<Duration>) -> Vec<K>
where
    I: IntoIterator<Item = (K, f32, Duration)>,
{
    beads
        .into_iter()
        .filter(|(_, y, age)| is_fallen(*y, canvas_height) || is_expired(*age, max_age))
        .map(|(key, _, _)| key)
        .collect()
}

pub fn track_host_visibility(
    mut occluded_events: EventReader<WindowOccluded>,
    mut visibility: ResMut<HostVisibility>,
) {
    for event in occluded_events.read() {
        visibility.visible = !event.occluded;
        debug!("host visible: {}", visibility.visible);
    }
}

pub fn spawn_beads(
    mut commands: Commands,
    time: Res<Time>,
    mut lifecycle: ResMut<BeadLifecycle>,
    visibility: Res<HostVisibility>,
    board: Res<GaltonBoard>,
    mut rng_resource: ResMut<RngResource>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    assets: Res<BodyAssets>,
) {
    if !lifecycle.tick_spawn(time.delta(), visibility.visible) {
        return;
    }
    let body = bead(&board.layout, &board.palette, &mut rng_resource.rng);
    spawn_body(&mut commands, &mut meshes, &mut materials, &assets, &body, time.elapsed_secs());
    lifecycle.spawned += 1;
}

pub fn reap_beads(
    mut commands: Commands,
    time: Res<Time>,
    mut lifecycle: ResMut<BeadLifecycle>,
    board: Res<GaltonBoard>,
    q_beads: Query<(Entity, &Transform, &Bead)>,
) {
    if !lifecycle.tick_reap(time.delta()) {
        return;
    }
    let now = time.elapsed_secs();
    let doomed = beads_to_reap(
        q_beads.iter().map(|(entity, transform, bead)| {
            let age = Duration::from_secs_f32((now - bead.spawned_at).max(0.0));
            (entity, board_y(transform.translation.y), age)
        }),
        board.layout.params.canvas_height,
        lifecycle.max_age,
    );
    if doomed.is_empty() {
        return;
    }
    for entity in &doomed {
        commands.entity(*entity).despawn();
    }
    lifecycle.reaped += doomed.len() as u64;
    debug!("reaped {} beads ({} total)", doomed.len(), lifecycle.reaped);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings() -> Timings {
        Timings { spawn_interval_ms: 250, reap_interval_ms: 5000, bead_max_age_ms: None }
    }

    #[test]
    fn spawns_on_the_interval() {
        let mut lc = BeadLifecycle::new(&timings());
        assert!(!lc.tick_spawn(Duration::from_millis(200), true));
        assert!(lc.tick_spawn(Duration::from_millis(60), true));
        assert!(!lc.tick_spawn(Duration::from_millis(10), true));
    }

    #[test]
    fn hidden_host_skips_without_queueing() {
        let mut lc = BeadLifecycle::new(&timings());
        assert!(!lc.tick_spawn(Duration::from_millis(250), false));
        assert!(!lc.tick_spawn(Duration::from_millis(250), false));
        // back in view: the missed firings are gone, only the next one counts
        assert!(!lc.tick_spawn(Duration::from_millis(100), true));
        assert!(lc.tick_spawn(Duration::from_millis(150), true));
    }

    #[test]
    fn disabled_spawning_is_silent() {
        let mut lc = BeadLifecycle::new(&timings());
        lc.set_spawning_enabled(false);
        assert!(!lc.tick_spawn(Duration::from_millis(300), true));
        lc.set_spawning_enabled(true);
        assert!(lc.tick_spawn(Duration::from_millis(250), true));
    }

    #[test]
    fn reap_runs_on_its_own_interval() {
        let mut lc = BeadLifecycle::new(&timings());
        assert!(!lc.tick_reap(Duration::from_millis(4999)));
        assert!(lc.tick_reap(Duration::from_millis(1)));
    }

    #[test]
    fn cancel_stops_both_tasks() {
        let mut lc = BeadLifecycle::new(&timings());
        lc.cancel();
        assert!(lc.is_cancelled());
        assert!(!lc.tick_spawn(Duration::from_secs(10), true));
        assert!(!lc.tick_reap(Duration::from_secs(10)));
    }

    #[test]
    fn intervals_can_be_retuned() {
        let mut lc = BeadLifecycle::new(&timings());
        lc.set_spawn_interval(Duration::from_millis(50));
        assert_eq!(lc.spawn_interval(), Duration::from_millis(50));
        assert!(lc.tick_spawn(Duration::from_millis(50), true));
        lc.set_reap_interval(Duration::from_secs(1));
        assert_eq!(lc.reap_interval(), Duration::from_secs(1));
    }

    #[test]
    fn fall_line_is_strict() {
        assert!(is_fallen(601.0, 600.0));
        assert!(!is_fallen(600.0, 600.0));
        assert!(!is_fallen(599.0, 600.0));
    }

    #[test]
    fn reap_picks_fallen_beads_only() {
        let beads = vec![("below", 601.0, Duration::ZERO), ("above", 599.0, Duration::ZERO)];
        assert_eq!(beads_to_reap(beads, 600.0, None), vec!["below"]);
    }

    #[test]
    fn max_age_reaps_stuck_beads() {
        let beads = vec![
            ("stuck", 300.0, Duration::from_secs(61)),
            ("young", 300.0, Duration::from_secs(5)),
        ];
        assert!(beads_to_reap(beads.clone(), 600.0, None).is_empty());
        assert_eq!(beads_to_reap(beads, 600.0, Some(Duration::from_secs(60))), vec!["stuck"]);
    }
}
