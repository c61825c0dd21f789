//! Built-in ECS systems.

use glam::{Affine2, Affine3A};
use hecs::World;
use serde_json::Value;

use crate::components::{Position2D, Position3D, Rotation2D, Rotation3D, Scale2D, Scale3D, Transform2D, Transform3D};
use crate::error::{StageError, StageResult};
use crate::names;
use crate::pipeline::{Phase, Pipeline, SystemContext, SystemKind};
use crate::prefab;
use crate::registry::ComponentRegistry;

/// Recompute 2D transforms from position, rotation and scale.
pub fn transform_update_2d(world: &mut World) {
    for (transform, pos, rot, scale) in
        world.query_mut::<(&mut Transform2D, &Position2D, &Rotation2D, &Scale2D)>()
    {
        transform.0 = Affine2::from_scale_angle_translation(scale.0, rot.0, pos.0);
    }
}

/// Recompute 3D transforms from position, rotation and scale.
pub fn transform_update_3d(world: &mut World) {
    for (transform, pos, rot, scale) in
        world.query_mut::<(&mut Transform3D, &Position3D, &Rotation3D, &Scale3D)>()
    {
        transform.0 = Affine3A::from_scale_rotation_translation(scale.0, rot.0, pos.0);
    }
}

fn run_transform_update_2d(ctx: &mut SystemContext) {
    transform_update_2d(ctx.world);
}

fn run_transform_update_3d(ctx: &mut SystemContext) {
    transform_update_3d(ctx.world);
}

/// Spawn a prefab instance from manual-run parameters:
/// `{ "prefab": "Name", "components": { "Position3D": [0, 1, 0] } }`.
pub fn instantiate_from_params(
    world: &mut World,
    registry: &ComponentRegistry,
    params: Option<&Value>,
) -> StageResult<hecs::Entity> {
    let invalid = |reason: &str| StageError::InvalidParameters {
        system: names::systems::PREFAB_INSTANTIATION.to_owned(),
        reason: reason.to_owned(),
    };

    let params = params
        .and_then(Value::as_object)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| invalid("at least 'prefab' needs to be specified"))?;
    let prefab_name = match params.get("prefab") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(invalid("'prefab' must be a string")),
        None => return Err(invalid("'prefab' must name the prefab to instantiate")),
    };
    let overrides = match params.get("components") {
        Some(Value::Object(components)) => Some(components),
        Some(_) => return Err(invalid("'components' must be an object")),
        None => None,
    };

    prefab::instantiate_named(world, registry, prefab_name, overrides)
}

fn run_prefab_instantiation(ctx: &mut SystemContext) {
    if let Err(err) = instantiate_from_params(ctx.world, ctx.components, ctx.params) {
        log::warn!("{}: {err}", names::systems::PREFAB_INSTANTIATION);
    }
}

/// Register the built-in gameplay systems.
pub fn register_systems(pipeline: &mut Pipeline) {
    pipeline.add(
        names::systems::TRANSFORM_UPDATE_2D,
        SystemKind::Phase(Phase::PreRender),
        run_transform_update_2d,
    );
    pipeline.add(
        names::systems::TRANSFORM_UPDATE_3D,
        SystemKind::Phase(Phase::PreRender),
        run_transform_update_3d,
    );
    pipeline.add(
        names::systems::PREFAB_INSTANTIATION,
        SystemKind::OnDemand,
        run_prefab_instantiation,
    );
}
