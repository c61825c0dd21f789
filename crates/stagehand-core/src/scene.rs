//! Scene child descriptors handed over by the host at ready time.
//!
//! The host serializes the stage node's direct children as JSON, each with
//! its `name` and engine `class`. Only renderer nodes carry configuration;
//! every other class is kept by name.
//!
//! ```json
//! [
//!   { "name": "Trees", "class": "InstancedRenderer3D",
//!     "prefabs_rendered": ["Tree"], "scenario": 3,
//!     "lod_levels": [{ "mesh": 4, "fade_max": 50.0 }] },
//!   { "name": "Camera", "class": "Camera3D" }
//! ]
//! ```

use serde::{Deserialize, Serialize};

use crate::rendering::query::Axis;
use crate::rendering::server::{FadeMode, Rid, TransformFormat};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneChild {
    pub name: String,
    #[serde(flatten)]
    pub node: SceneNode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum SceneNode {
    MultiMeshRenderer2D(MultiMeshRendererNode),
    MultiMeshRenderer3D(MultiMeshRendererNode),
    InstancedRenderer3D(InstancedRendererNode),
    #[default]
    #[serde(other)]
    Other,
}

/// Instance ordering requested by a batched renderer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawOrder {
    #[default]
    None,
    X,
    Y,
    Z,
}

impl DrawOrder {
    pub fn axis(self) -> Option<Axis> {
        match self {
            DrawOrder::None => None,
            DrawOrder::X => Some(Axis::X),
            DrawOrder::Y => Some(Axis::Y),
            DrawOrder::Z => Some(Axis::Z),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiMeshRendererNode {
    #[serde(default)]
    pub multimesh: Option<MultiMeshResource>,
    #[serde(default)]
    pub prefabs_rendered: Vec<String>,
    #[serde(default)]
    pub draw_order: DrawOrder,
}

/// Snapshot of the host batched resource assigned to a renderer node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMeshResource {
    pub rid: Rid,
    pub transform_format: TransformFormat,
    #[serde(default)]
    pub use_colors: bool,
    #[serde(default)]
    pub use_custom_data: bool,
    #[serde(default)]
    pub instance_count: usize,
    #[serde(default)]
    pub visible_instance_count: usize,
    /// Existing instance buffer, used to seed the packing cache.
    #[serde(default)]
    pub buffer: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstancedRendererNode {
    #[serde(default)]
    pub prefabs_rendered: Vec<String>,
    #[serde(default)]
    pub lod_levels: Vec<LodLevel>,
    /// Scenario of the node's 3D world; absent when the node is outside one.
    #[serde(default)]
    pub scenario: Option<Rid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LodLevel {
    #[serde(default)]
    pub mesh: Option<Rid>,
    #[serde(default)]
    pub fade_min: f32,
    #[serde(default)]
    pub fade_max: f32,
    #[serde(default)]
    pub fade_min_margin: f32,
    #[serde(default)]
    pub fade_max_margin: f32,
    #[serde(default)]
    pub fade_mode: FadeMode,
}

/// Parse the host's JSON list of scene children.
pub fn parse_children(json: &str) -> serde_json::Result<Vec<SceneChild>> {
    serde_json::from_str(json)
}
