//! Prefabs: named template entities that instances inherit components from.
//!
//! Inheritance is an `IsA` list on the instance (or derived prefab). Querying
//! "is-a P" walks that relation transitively. Instantiation copies every
//! registered component from the prefab chain, root first, so closer
//! ancestors override further ones.

use std::collections::HashSet;

use hecs::{Entity, World};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::components::{
    IsA, Name, Position2D, Position3D, Prefab, Rotation2D, Rotation3D, Scale2D, Scale3D, Transform2D,
    Transform3D,
};
use crate::error::{StageError, StageResult};
use crate::names;
use crate::registry::ComponentRegistry;

/// Find a live entity by its [`Name`].
pub fn lookup(world: &World, name: &str) -> Option<Entity> {
    world
        .query::<(Entity, &Name)>()
        .iter()
        .find(|(_, n)| n.0 == name)
        .map(|(e, _)| e)
}

/// Create the prefab `name`, or return the existing one.
pub fn create_prefab(world: &mut World, name: &str) -> Entity {
    match lookup(world, name) {
        Some(entity) => {
            if world.get::<&Prefab>(entity).is_err() {
                let _ = world.insert_one(entity, Prefab);
            }
            entity
        }
        None => world.spawn((Prefab, Name(name.to_owned()))),
    }
}

/// Make `entity` inherit from `parent`. Duplicate edges are ignored.
pub fn add_is_a(world: &mut World, entity: Entity, parent: Entity) {
    if let Ok(mut is_a) = world.get::<&mut IsA>(entity) {
        if !is_a.0.contains(&parent) {
            is_a.0.push(parent);
        }
        return;
    }
    let _ = world.insert_one(entity, IsA(vec![parent]));
}

/// True if `entity` inherits from `prefab`, directly or transitively.
pub fn is_a(world: &World, entity: Entity, prefab: Entity) -> bool {
    let mut pending = match world.get::<&IsA>(entity) {
        Ok(is_a) => is_a.0.clone(),
        Err(_) => return false,
    };
    let mut visited = Vec::new();

    while let Some(current) = pending.pop() {
        if current == prefab {
            return true;
        }
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        if let Ok(parents) = world.get::<&IsA>(current) {
            pending.extend(parents.0.iter().copied());
        }
    }
    false
}

/// `roots` plus every prefab that inherits from one of them, transitively.
pub fn descendants(world: &World, roots: &[Entity]) -> HashSet<Entity> {
    let mut found: HashSet<Entity> = roots.iter().copied().collect();
    let mut prefabs = world.query::<(Entity, &IsA)>().with::<&Prefab>();
    loop {
        let before = found.len();
        for (entity, is_a) in prefabs.iter() {
            if !found.contains(&entity) && is_a.0.iter().any(|parent| found.contains(parent)) {
                found.insert(entity);
            }
        }
        if found.len() == before {
            return found;
        }
    }
}

/// `prefab` and all of its ancestors, roots first, each listed once.
pub fn ancestry(world: &World, prefab: Entity) -> Vec<Entity> {
    fn visit(world: &World, entity: Entity, visiting: &mut Vec<Entity>, out: &mut Vec<Entity>) {
        if visiting.contains(&entity) {
            return;
        }
        visiting.push(entity);
        let parents = world.get::<&IsA>(entity).map(|p| p.0.clone()).unwrap_or_default();
        for parent in parents {
            visit(world, parent, visiting, out);
        }
        out.push(entity);
    }

    let mut visiting = Vec::new();
    let mut out = Vec::new();
    visit(world, prefab, &mut visiting, &mut out);
    out
}

/// Spawn an instance of `prefab` carrying copies of its inherited components.
pub fn instantiate(world: &mut World, registry: &ComponentRegistry, prefab: Entity) -> Entity {
    let instance = world.spawn((IsA(vec![prefab]),));
    for ancestor in ancestry(world, prefab) {
        registry.copy_all(world, ancestor, instance);
    }
    instance
}

/// Instantiate the prefab called `name`, then set `overrides` on the
/// instance by component name. Overrides that fail are logged and skipped.
pub fn instantiate_named(
    world: &mut World,
    registry: &ComponentRegistry,
    name: &str,
    overrides: Option<&Map<String, Value>>,
) -> StageResult<Entity> {
    let prefab = lookup(world, name)
        .filter(|e| world.get::<&Prefab>(*e).is_ok())
        .ok_or_else(|| StageError::PrefabNotFound(name.to_owned()))?;

    let instance = instantiate(world, registry, prefab);
    for (component, value) in overrides.into_iter().flatten() {
        if let Err(err) = registry.set(world, instance, component, value) {
            log::warn!("Instance of '{name}': {err}");
        }
    }
    Ok(instance)
}

/// Host-authored prefab description.
///
/// ```json
/// { "name": "Tree", "parents": [{ "name": "stagehand::Entity3D" }],
///   "components": { "Scale3D": [2.0, 2.0, 2.0] } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrefabDefinition {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<PrefabDefinition>,
    #[serde(default)]
    pub components: Map<String, Value>,
}

impl PrefabDefinition {
    /// Create the prefab, link its parents, then set its own components.
    ///
    /// Components that fail to convert are skipped with a warning; the prefab
    /// itself is still registered.
    pub fn register(&self, world: &mut World, registry: &ComponentRegistry) -> StageResult<Entity> {
        if self.name.is_empty() {
            return Err(StageError::UnnamedPrefab);
        }

        let prefab = create_prefab(world, &self.name);
        for parent in &self.parents {
            match parent.register(world, registry) {
                Ok(parent_entity) => add_is_a(world, prefab, parent_entity),
                Err(err) => log::warn!("Prefab '{}': parent skipped: {err}", self.name),
            }
        }

        for (component, value) in &self.components {
            if let Err(err) = registry.set(world, prefab, component, value) {
                log::warn!("Prefab '{}': {err}", self.name);
            }
        }

        Ok(prefab)
    }
}

/// Spawn the prefabs every stage starts with.
pub fn register_builtin_prefabs(world: &mut World) {
    let entity_2d = create_prefab(world, names::prefabs::ENTITY_2D);
    let _ = world.insert(
        entity_2d,
        (
            Position2D::default(),
            Rotation2D::default(),
            Scale2D::default(),
            Transform2D::default(),
        ),
    );

    let entity_3d = create_prefab(world, names::prefabs::ENTITY_3D);
    let _ = world.insert(
        entity_3d,
        (
            Position3D::default(),
            Rotation3D::default(),
            Scale3D::default(),
            Transform3D::default(),
        ),
    );
}
