use rand::Rng;

use bevy::{
    math::primitives::{Circle, Rectangle},
    prelude::{
        Assets, Color, Commands, Component, Entity, FromWorld, Handle, Mesh, Quat, Resource, Transform,
        Vec2, World,
    },
    render::prelude::Mesh2d,
    sprite::{ColorMaterial, MeshMaterial2d},
};
use bevy_rapier2d::prelude::{
    ActiveEvents, Collider, ColliderMassProperties, Friction, Restitution, RigidBody, Sensor,
};

use crate::{
    board::GaltonBoard,
    config::Palette,
    layout::{to_world, BoardLayout},
    shared_consts::{BEAD_DENSITY, BEAD_FRICTION, BEAD_RESTITUTION},
    tally::{BinSensor, BinTally, TallyError},
};

const FIXTURE_Z: f32 = 1.0;
const SENSOR_Z: f32 = 0.5;
const BEAD_Z: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeadMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
}

impl Default for BeadMaterial {
    fn default() -> Self {
        Self {
            friction: BEAD_FRICTION,
            restitution: BEAD_RESTITUTION,
            density: BEAD_DENSITY,
        }
    }
}

/// What the engine is asked to create. Positions are board coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyDescriptor {
    StaticCircle {
        center: Vec2,
        radius: f32,
        color: Color,
    },
    StaticRect {
        center: Vec2,
        width: f32,
        height: f32,
        angle: f32,
        color: Color,
        sensor: Option<BinSensor>,
    },
    DynamicCircle {
        center: Vec2,
        radius: f32,
        material: BeadMaterial,
        color: Color,
    },
}

impl BodyDescriptor {
    pub fn center(&self) -> Vec2 {
        match *self {
            BodyDescriptor::StaticCircle { center, .. }
            | BodyDescriptor::StaticRect { center, .. }
            | BodyDescriptor::DynamicCircle { center, .. } => center,
        }
    }

    pub fn is_static(&self) -> bool {
        !matches!(self, BodyDescriptor::DynamicCircle { .. })
    }

    pub fn sensor(&self) -> Option<BinSensor> {
        match *self {
            BodyDescriptor::StaticRect { sensor, .. } => sensor,
            _ => None,
        }
    }
}

/// Marks pegs, tube walls and sensors so teardown can find them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct BoardFixture;

#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct Bead {
    /// `Time::elapsed_secs` at spawn.
    pub spawned_at: f32,
}

/// Render handles shared by every bead and every histogram bar.
#[derive(Debug, Clone, Resource)]
pub struct BodyAssets {
    pub bead_mesh: Handle<Mesh>,
    pub bead_material: Handle<ColorMaterial>,
    /// Unit square, scaled per bar.
    pub bar_mesh: Handle<Mesh>,
    pub bar_material: Handle<ColorMaterial>,
}

impl FromWorld for BodyAssets {
    fn from_world(world: &mut World) -> Self {
        let (bead_radius, bead_color, bar_color) = {
            let board = world.resource::<GaltonBoard>();
            (board.layout.params.bead_radius, board.palette.bead, board.palette.bar)
        };
        let (bead_mesh, bar_mesh) = {
            let mut meshes = world.resource_mut::<Assets<Mesh>>();
            (meshes.add(Circle::new(bead_radius)), meshes.add(Rectangle::new(1.0, 1.0)))
        };
        let mut materials = world.resource_mut::<Assets<ColorMaterial>>();
        Self {
            bead_mesh,
            bead_material: materials.add(ColorMaterial::from(bead_color)),
            bar_mesh,
            bar_material: materials.add(ColorMaterial::from(bar_color)),
        }
    }
}

/// Pegs, walls and sensors for `layout`. Sensor ids are allocated from `tally`
/// here, so every sensor is registered before it exists in the engine.
pub fn board_bodies(
    layout: &BoardLayout,
    palette: &Palette,
    tally: &mut BinTally,
) -> Result<Vec<BodyDescriptor>, TallyError> {
    let mut bodies = Vec::with_capacity(layout.pegs.len() + layout.walls.len() + layout.sensors.len());

    bodies.extend(layout.pegs.iter().map(|peg| BodyDescriptor::StaticCircle {
        center: peg.center,
        radius: peg.radius,
        color: palette.peg,
    }));

    bodies.extend(layout.walls.iter().map(|wall| BodyDescriptor::StaticRect {
        center: wall.center,
        width: wall.length,
        height: wall.thickness,
        angle: wall.angle,
        color: palette.wall,
        sensor: None,
    }));

    for slot in &layout.sensors {
        let id = tally.allocate_sensor(slot.bin)?;
        bodies.push(BodyDescriptor::StaticRect {
            center: slot.center,
            width: slot.size,
            height: slot.size,
            angle: 0.0,
            color: palette.sensor,
            sensor: Some(BinSensor { id, bin: slot.bin }),
        });
    }

    Ok(bodies)
}

/// One bead on the spawn line, x drawn uniformly from the spawn range.
pub fn bead<R: Rng>(layout: &BoardLayout, palette: &Palette, rng: &mut R) -> BodyDescriptor {
    let range = layout.params.bead_spawn_range;
    let x = if range > 0.0 { rng.gen_range(-range, range) } else { 0.0 };
    BodyDescriptor::DynamicCircle {
        center: layout.bead_spawn_point(x),
        radius: layout.params.bead_radius,
        material: BeadMaterial::default(),
        color: palette.bead,
    }
}

/// Beads render with the shared handles in `assets`; fixtures get their own.
pub fn spawn_body(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<ColorMaterial>,
    assets: &BodyAssets,
    body: &BodyDescriptor,
    now_secs: f32,
) -> Entity {
    let world = to_world(body.center());
    match *body {
        BodyDescriptor::StaticCircle { radius, color, .. } => commands
            .spawn((
                BoardFixture,
                RigidBody::Fixed,
                Collider::ball(radius),
                Mesh2d(meshes.add(Circle::new(radius))),
                MeshMaterial2d(materials.add(ColorMaterial::from(color))),
                Transform::from_xyz(world.x, world.y, FIXTURE_Z),
            ))
            .id(),
        BodyDescriptor::StaticRect { width, height, angle, color, sensor, .. } => {
            let z = if sensor.is_some() { SENSOR_Z } else { FIXTURE_Z };
            // y is mirrored on the way to world space, so is the rotation
            let transform = Transform::from_xyz(world.x, world.y, z).with_rotation(Quat::from_rotation_z(-angle));
            let mut entity = commands.spawn((
                BoardFixture,
                RigidBody::Fixed,
                Collider::cuboid(width / 2.0, height / 2.0),
                Mesh2d(meshes.add(Rectangle::new(width, height))),
                MeshMaterial2d(materials.add(ColorMaterial::from(color))),
                transform,
            ));
            if let Some(bin_sensor) = sensor {
                entity.insert((Sensor, ActiveEvents::COLLISION_EVENTS, bin_sensor));
            }
            entity.id()
        }
        BodyDescriptor::DynamicCircle { radius, material, .. } => commands
            .spawn((
                Bead { spawned_at: now_secs },
                RigidBody::Dynamic,
                Collider::ball(radius),
                Friction::coefficient(material.friction),
                Restitution::coefficient(material.restitution),
                ColliderMassProperties::Density(material.density),
                Mesh2d(assets.bead_mesh.clone()),
                MeshMaterial2d(assets.bead_material.clone()),
                Transform::from_xyz(world.x, world.y, BEAD_Z),
            ))
            .id(),
    }
}
