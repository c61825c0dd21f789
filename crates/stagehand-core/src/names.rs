//! Stable names for phases, systems, prefabs and components.
//!
//! These strings are part of the scripting surface: the host enables, disables
//! and runs systems, and addresses components, by these names.

pub mod systems {
    pub const ENTITY_RENDERING_MULTIMESH: &str =
        "stagehand::entity_rendering::Entity Rendering (MultiMesh)";
    pub const ENTITY_RENDERING_INSTANCED: &str =
        "stagehand::entity_rendering::Entity Rendering (Instanced)";
    pub const PREFAB_INSTANTIATION: &str = "stagehand::Prefab Instantiation";
    pub const TRANSFORM_UPDATE_2D: &str = "stagehand::Transform Update (2D)";
    pub const TRANSFORM_UPDATE_3D: &str = "stagehand::Transform Update (3D)";
}

pub mod prefabs {
    pub const ENTITY_2D: &str = "stagehand::Entity2D";
    pub const ENTITY_3D: &str = "stagehand::Entity3D";
}

pub mod components {
    pub const POSITION_2D: &str = "Position2D";
    pub const ROTATION_2D: &str = "Rotation2D";
    pub const SCALE_2D: &str = "Scale2D";
    pub const TRANSFORM_2D: &str = "Transform2D";
    pub const POSITION_3D: &str = "Position3D";
    pub const ROTATION_3D: &str = "Rotation3D";
    pub const SCALE_3D: &str = "Scale3D";
    pub const TRANSFORM_3D: &str = "Transform3D";
    pub const COLOR: &str = "Color";
    pub const CUSTOM_DATA: &str = "CustomData";
    pub const WORLD_CONFIGURATION: &str = "WorldConfiguration";
    pub const SCENE_CHILDREN: &str = "SceneChildren";
}
