//! Name-keyed component registry.
//!
//! Bridges statically typed `hecs` storage and the dynamically typed values a
//! host script passes around (`serde_json::Value`). Each registered type
//! contributes a table of monomorphized functions, built once at registration.

use std::collections::BTreeMap;

use hecs::{Entity, World};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StageError, StageResult};

/// Bound shared by every component reachable by name.
pub trait RegisteredComponent: hecs::Component + Serialize + DeserializeOwned + Default + Clone {}

impl<T> RegisteredComponent for T where T: hecs::Component + Serialize + DeserializeOwned + Default + Clone {}

/// Introspection data for a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    pub name: &'static str,
    pub type_name: &'static str,
    pub is_singleton: bool,
}

/// Type-erased operations for a single component type.
struct ComponentFunctions {
    info: ComponentInfo,
    getter: fn(&World, Entity) -> Option<serde_json::Result<Value>>,
    setter: fn(&mut World, Entity, &Value) -> serde_json::Result<bool>,
    defaulter: fn() -> serde_json::Result<Value>,
    copier: fn(&mut World, Entity, Entity) -> bool,
}

/// Catalogue of components addressable by name.
///
/// Populated explicitly during stage construction; see
/// [`crate::components::register_components`].
#[derive(Default)]
pub struct ComponentRegistry {
    /// Ordered by name so listings are stable.
    entries: BTreeMap<&'static str, ComponentFunctions>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component that can live on any entity.
    pub fn register<T: RegisteredComponent>(&mut self, name: &'static str) {
        self.insert::<T>(name, false);
    }

    /// Register a component that only lives on the singleton entity.
    pub fn register_singleton<T: RegisteredComponent>(&mut self, name: &'static str) {
        self.insert::<T>(name, true);
    }

    fn insert<T: RegisteredComponent>(&mut self, name: &'static str, is_singleton: bool) {
        let functions = ComponentFunctions {
            info: ComponentInfo {
                name,
                type_name: std::any::type_name::<T>(),
                is_singleton,
            },
            getter: get_value::<T>,
            setter: set_value::<T>,
            defaulter: default_value::<T>,
            copier: copy_component::<T>,
        };
        if self.entries.insert(name, functions).is_some() {
            log::warn!("Component '{name}' registered twice; keeping the latest registration");
        }
    }

    /// All registered component names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn inspect(&self, name: &str) -> StageResult<ComponentInfo> {
        self.entry(name).map(|e| e.info)
    }

    /// Read a component as a dynamic value.
    pub fn get(&self, world: &World, entity: Entity, name: &str) -> StageResult<Value> {
        let entry = self.entry(name)?;
        match (entry.getter)(world, entity) {
            Some(value) => value.map_err(|source| StageError::Conversion {
                component: name.to_owned(),
                source,
            }),
            None if !world.contains(entity) => Err(StageError::EntityNotAlive(entity.to_bits().get())),
            None => Err(StageError::MissingComponent {
                component: name.to_owned(),
                entity: entity.to_bits().get(),
            }),
        }
    }

    /// Convert `value` and insert (or overwrite) the component on `entity`.
    pub fn set(&self, world: &mut World, entity: Entity, name: &str, value: &Value) -> StageResult<()> {
        let entry = self.entry(name)?;
        let inserted = (entry.setter)(world, entity, value).map_err(|source| StageError::Conversion {
            component: name.to_owned(),
            source,
        })?;
        if inserted {
            Ok(())
        } else {
            Err(StageError::EntityNotAlive(entity.to_bits().get()))
        }
    }

    /// The value a freshly added component would hold.
    pub fn default_value(&self, name: &str) -> StageResult<Value> {
        let entry = self.entry(name)?;
        (entry.defaulter)().map_err(|source| StageError::Conversion {
            component: name.to_owned(),
            source,
        })
    }

    /// Copy every registered component present on `from` onto `to`.
    /// Returns how many components were copied.
    pub fn copy_all(&self, world: &mut World, from: Entity, to: Entity) -> usize {
        self.entries
            .values()
            .filter(|e| !e.info.is_singleton)
            .filter(|e| (e.copier)(world, from, to))
            .count()
    }

    fn entry(&self, name: &str) -> StageResult<&ComponentFunctions> {
        self.entries
            .get(name)
            .ok_or_else(|| StageError::UnknownComponent(name.to_owned()))
    }
}

fn get_value<T: RegisteredComponent>(world: &World, entity: Entity) -> Option<serde_json::Result<Value>> {
    world.get::<&T>(entity).ok().map(|c| serde_json::to_value(&*c))
}

fn set_value<T: RegisteredComponent>(world: &mut World, entity: Entity, value: &Value) -> serde_json::Result<bool> {
    let component = T::deserialize(value)?;
    Ok(world.insert_one(entity, component).is_ok())
}

fn default_value<T: RegisteredComponent>() -> serde_json::Result<Value> {
    serde_json::to_value(T::default())
}

fn copy_component<T: RegisteredComponent>(world: &mut World, from: Entity, to: Entity) -> bool {
    let Some(value) = world.get::<&T>(from).ok().map(|c| (*c).clone()) else {
        return false;
    };
    world.insert_one(to, value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{register_components, Position3D, Scale2D};
    use glam::Vec3;
    use serde_json::json;

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        register_components(&mut registry);
        registry
    }

    #[test]
    fn set_then_get_by_name() {
        let registry = registry();
        let mut world = World::new();
        let e = world.spawn(());

        registry.set(&mut world, e, "Position3D", &json!([1.0, 2.0, 3.0])).unwrap();

        assert_eq!(world.get::<&Position3D>(e).unwrap().0, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(registry.get(&world, e, "Position3D").unwrap(), json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn unknown_component_is_reported() {
        let registry = registry();
        let err = registry.default_value("Velocity").unwrap_err();
        assert!(matches!(err, StageError::UnknownComponent(name) if name == "Velocity"));
        assert!(!registry.contains("Velocity"));
    }

    #[test]
    fn missing_component_differs_from_dead_entity() {
        let registry = registry();
        let mut world = World::new();
        let e = world.spawn(());

        let err = registry.get(&world, e, "Color").unwrap_err();
        assert!(matches!(err, StageError::MissingComponent { .. }));

        world.despawn(e).unwrap();
        let err = registry.get(&world, e, "Color").unwrap_err();
        assert!(matches!(err, StageError::EntityNotAlive(_)));
    }

    #[test]
    fn wrong_value_shape_is_a_conversion_error() {
        let registry = registry();
        let mut world = World::new();
        let e = world.spawn(());

        let err = registry.set(&mut world, e, "Scale2D", &json!("big")).unwrap_err();
        assert!(matches!(err, StageError::Conversion { .. }));
        assert!(world.get::<&Scale2D>(e).is_err());
    }

    #[test]
    fn defaults_and_inspection() {
        let registry = registry();
        assert_eq!(registry.default_value("Scale3D").unwrap(), json!([1.0, 1.0, 1.0]));

        let info = registry.inspect("WorldConfiguration").unwrap();
        assert!(info.is_singleton);
        assert!(!registry.inspect("Color").unwrap().is_singleton);
    }

    #[test]
    fn copy_all_skips_absent_components() {
        let registry = registry();
        let mut world = World::new();
        let from = world.spawn((Position3D(Vec3::X), Scale2D::default()));
        let to = world.spawn(());

        assert_eq!(registry.copy_all(&mut world, from, to), 2);
        assert_eq!(world.get::<&Position3D>(to).unwrap().0, Vec3::X);
    }
}
