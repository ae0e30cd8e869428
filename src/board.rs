use rand::{rngs::StdRng, SeedableRng};

use bevy::{
    app::{AppExit, Last},
    log::info,
    math::Rect,
    prelude::{
        Added, App, Assets, Camera2d, ClearColor, Commands, Entity, EventReader, IntoScheduleConfigs,
        Mesh, Or, OrthographicProjection, Plugin, Projection, Query, Res, ResMut, Resource, Startup,
        Transform, Update, Vec2, With, World,
    },
    sprite::ColorMaterial,
};
use bevy_rapier2d::prelude::{
    DebugRenderMode, NoUserData, RapierConfiguration, RapierDebugRenderPlugin, RapierPhysicsPlugin,
};

use crate::{
    bodies::{board_bodies, spawn_body, Bead, BoardFixture, BodyAssets},
    config::{BoardConfig, ConfigError, Palette},
    histogram::{redraw_histogram, HistogramBarSprite},
    layout::{to_world, BoardLayout},
    lifecycle::{reap_beads, spawn_beads, track_host_visibility, BeadLifecycle, HostVisibility},
    shared_consts::{GRAVITY, PIXELS_PER_METER},
    tally::{tally_collision_ends, BinTally, CountersChanged, TallyError},
};

const CAMERA_MARGIN: f32 = 1.1;

#[derive(Debug)]
pub enum BoardError {
    Config(ConfigError),
    Tally(TallyError),
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::Config(e) => write!(f, "configuration error: {}", e),
            BoardError::Tally(e) => write!(f, "sensor registration failed: {}", e),
        }
    }
}

impl std::error::Error for BoardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoardError::Config(e) => Some(e),
            BoardError::Tally(e) => Some(e),
        }
    }
}

impl From<ConfigError> for BoardError {
    fn from(e: ConfigError) -> Self {
        BoardError::Config(e)
    }
}

impl From<TallyError> for BoardError {
    fn from(e: TallyError) -> Self {
        BoardError::Tally(e)
    }
}

/// The simulation context: geometry, colors and the bin tally for one board.
#[derive(Debug, Clone, Resource)]
pub struct GaltonBoard {
    pub config: BoardConfig,
    pub layout: BoardLayout,
    pub palette: Palette,
    pub tally: BinTally,
}

impl GaltonBoard {
    pub fn new(config: BoardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let palette = config.style.palette()?;
        let layout = BoardLayout::compute(&config.layout);
        let tally = BinTally::new(layout.bin_count());
        Ok(Self { config, layout, palette, tally })
    }
}

#[derive(Resource)]
pub struct RngResource {
    pub rng: StdRng,
}

impl RngResource {
    pub fn seeded(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

/// Orthographic scale that fits `bounds` inside a `viewport` sized window.
pub fn fit_scale(bounds: Rect, viewport: Vec2) -> f32 {
    let size = bounds.size();
    if viewport.x <= 0.0 || viewport.y <= 0.0 {
        return 1.0;
    }
    (size.x / viewport.x).max(size.y / viewport.y).max(f32::EPSILON) * CAMERA_MARGIN
}

fn setup_camera(mut commands: Commands, board: Res<GaltonBoard>) {
    let bounds = board.layout.bounds();
    let params = &board.layout.params;
    let center = to_world(bounds.center());
    commands.spawn((
        Camera2d,
        Projection::Orthographic(OrthographicProjection {
            scale: fit_scale(bounds, Vec2::new(params.canvas_width, params.canvas_height)),
            ..OrthographicProjection::default_2d()
        }),
        Transform::from_xyz(center.x, center.y, 0.0),
    ));
}

fn init_body_assets(world: &mut World) {
    world.init_resource::<BodyAssets>();
}

fn spawn_board(
    mut commands: Commands,
    mut board: ResMut<GaltonBoard>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    assets: Res<BodyAssets>,
) {
    let board = &mut *board;
    let bodies = match board_bodies(&board.layout, &board.palette, &mut board.tally) {
        Ok(bodies) => bodies,
        Err(e) => {
            bevy::log::error!("cannot build board: {}", e);
            return;
        }
    };
    for body in &bodies {
        spawn_body(&mut commands, &mut meshes, &mut materials, &assets, body, 0.0);
    }
    info!(
        "board ready: {} pegs, {} walls, {} bins",
        board.layout.pegs.len(),
        board.layout.walls.len(),
        board.layout.bin_count()
    );
}

fn apply_gravity(mut q_config: Query<&mut RapierConfiguration, Added<RapierConfiguration>>) {
    for mut config in q_config.iter_mut() {
        config.gravity = Vec2::new(0.0, GRAVITY);
    }
}

/// Stops the periodic tasks and hands every body back to the engine.
pub fn teardown_on_exit(
    mut commands: Commands,
    mut exit_events: EventReader<AppExit>,
    mut lifecycle: ResMut<BeadLifecycle>,
    board: Res<GaltonBoard>,
    q_bodies: Query<Entity, Or<(With<Bead>, With<BoardFixture>, With<HistogramBarSprite>)>>,
) {
    if exit_events.read().count() == 0 || lifecycle.is_cancelled() {
        return;
    }
    lifecycle.cancel();
    for entity in q_bodies.iter() {
        commands.entity(entity).despawn();
    }
    info!(
        "teardown: spawned={} reaped={} counted={} top={} counters={:?}",
        lifecycle.spawned(),
        lifecycle.reaped(),
        board.tally.total(),
        board.tally.top_counter(),
        board.tally.counters()
    );
}

pub struct GaltonPlugin {
    board: GaltonBoard,
    seed: Option<u64>,
    debug_render: bool,
}

impl GaltonPlugin {
    pub fn new(config: BoardConfig) -> Result<Self, BoardError> {
        Ok(Self {
            board: GaltonBoard::new(config)?,
            seed: None,
            debug_render: false,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_debug_render(mut self, on: bool) -> Self {
        self.debug_render = on;
        self
    }
}

impl Plugin for GaltonPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RapierPhysicsPlugin::<NoUserData>::pixels_per_meter(PIXELS_PER_METER));
        if self.debug_render {
            app.add_plugins(RapierDebugRenderPlugin {
                mode: DebugRenderMode::COLLIDER_SHAPES,
                ..RapierDebugRenderPlugin::default()
            });
        }
        app.insert_resource(ClearColor(self.board.palette.background))
            .insert_resource(BeadLifecycle::new(&self.board.config.timings))
            .insert_resource(RngResource::seeded(self.seed))
            .insert_resource(self.board.clone())
            .init_resource::<HostVisibility>()
            .add_event::<CountersChanged>()
            .add_systems(Startup, ((init_body_assets, spawn_board).chain(), setup_camera))
            .add_systems(
                Update,
                (
                    apply_gravity,
                    track_host_visibility,
                    (spawn_beads, reap_beads),
                    (tally_collision_ends, redraw_histogram).chain(),
                ),
            )
            .add_systems(Last, teardown_on_exit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_scale_keeps_the_board_on_screen() {
        let bounds = Rect::new(-300.0, 0.0, 300.0, 600.0);
        let scale = fit_scale(bounds, Vec2::new(800.0, 600.0));
        assert!((scale - 1.1).abs() < 1e-5);
        let small = fit_scale(Rect::new(-50.0, 0.0, 50.0, 100.0), Vec2::new(800.0, 600.0));
        assert!(small < 1.0);
    }

    #[test]
    fn board_rejects_bad_config() {
        let mut config = BoardConfig::default();
        config.layout.bottom_peg_row_size = 0;
        assert!(GaltonBoard::new(config.clone()).is_err());
        assert!(matches!(GaltonPlugin::new(config), Err(BoardError::Config(_))));
    }

    #[test]
    fn board_sizes_the_tally_from_the_layout() {
        let board = GaltonBoard::new(BoardConfig::default()).unwrap();
        assert_eq!(board.tally.counters().len(), 18);
        assert_eq!(board.layout.walls.len(), 19);
    }
}
