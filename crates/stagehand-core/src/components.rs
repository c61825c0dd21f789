//! Core ECS components.
//!
//! Spatial components wrap `glam` types. Components are plain data structs;
//! the few methods here only read the wrapped value.

use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Affine3A, Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::names;
use crate::registry::ComponentRegistry;

/// 2D position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position2D(pub Vec2);

/// 2D rotation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rotation2D(pub f32);

/// Non-uniform 2D scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scale2D(pub Vec2);

/// World-space 2D affine transform, composed by the transform update system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform2D(pub Affine2);

/// 3D position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position3D(pub Vec3);

/// 3D rotation as a quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rotation3D(pub Quat);

/// Non-uniform 3D scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scale3D(pub Vec3);

/// World-space 3D affine transform. This is what instanced and multimesh
/// renderers push to the rendering server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform3D(pub Affine3A);

/// Per-instance vertex colour, `(r, g, b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
#[serde(transparent)]
pub struct Color(pub Vec4);

/// Per-instance custom shader data, `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
#[serde(transparent)]
pub struct CustomData(pub Vec4);

/// Unique, lookup-able entity name. Prefabs always carry one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(pub String);

/// Marker: entity is a prefab template. Prefabs never match instance queries.
#[derive(Debug, Clone, Copy)]
pub struct Prefab;

/// The prefabs this entity inherits from, in declaration order.
/// Instances and derived prefabs both carry it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsA(pub Vec<hecs::Entity>);

/// Marker for the entity that holds singleton components.
#[derive(Debug, Clone, Copy)]
pub struct Singleton;

/// Free-form key/value configuration mirrored from the stage's properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldConfiguration(pub Map<String, Value>);

/// Names of the stage node's direct scene children, captured at ready time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneChildren(pub Vec<String>);

impl Default for Position2D {
    fn default() -> Self {
        Self(Vec2::ZERO)
    }
}

impl Default for Scale2D {
    fn default() -> Self {
        Self(Vec2::ONE)
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self(Affine2::IDENTITY)
    }
}

impl Default for Position3D {
    fn default() -> Self {
        Self(Vec3::ZERO)
    }
}

impl Default for Rotation3D {
    fn default() -> Self {
        Self(Quat::IDENTITY)
    }
}

impl Default for Scale3D {
    fn default() -> Self {
        Self(Vec3::ONE)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self(Affine3A::IDENTITY)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self(Vec4::ONE)
    }
}

/// Register every built-in component with the name-keyed registry.
pub fn register_components(registry: &mut ComponentRegistry) {
    use names::components as n;

    registry.register::<Position2D>(n::POSITION_2D);
    registry.register::<Rotation2D>(n::ROTATION_2D);
    registry.register::<Scale2D>(n::SCALE_2D);
    registry.register::<Transform2D>(n::TRANSFORM_2D);
    registry.register::<Position3D>(n::POSITION_3D);
    registry.register::<Rotation3D>(n::ROTATION_3D);
    registry.register::<Scale3D>(n::SCALE_3D);
    registry.register::<Transform3D>(n::TRANSFORM_3D);
    registry.register::<Color>(n::COLOR);
    registry.register::<CustomData>(n::CUSTOM_DATA);
    registry.register_singleton::<WorldConfiguration>(n::WORLD_CONFIGURATION);
    registry.register_singleton::<SceneChildren>(n::SCENE_CHILDREN);
}
