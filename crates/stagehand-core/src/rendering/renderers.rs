//! Renderer Registry: what each sync system iterates every render tick.
//!
//! Both structures live as components on the stage's singleton entity.

use std::collections::HashMap;

use crate::rendering::query::InstanceQuery;
use crate::rendering::server::{FadeMode, Rid, TransformFormat, VisibilityRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    Instanced,
    MultiMesh,
}

/// One batched resource, shared by every node that references it.
#[derive(Debug, Clone)]
pub struct MultiMeshRendererConfig {
    pub rid: Rid,
    /// One query per registering node, walked in order when packing.
    pub queries: Vec<InstanceQuery>,
    pub transform_format: TransformFormat,
    pub use_colors: bool,
    pub use_custom_data: bool,
    pub instance_count: usize,
    pub visible_instance_count: usize,
}

impl MultiMeshRendererConfig {
    pub fn stride(&self) -> usize {
        self.transform_format.stride(self.use_colors, self.use_custom_data)
    }
}

/// Mesh and fade band for one level of detail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodConfig {
    pub mesh: Rid,
    pub fade_min: f32,
    pub fade_max: f32,
    pub fade_min_margin: f32,
    pub fade_max_margin: f32,
    pub fade_mode: FadeMode,
}

impl LodConfig {
    pub fn visibility_range(&self) -> VisibilityRange {
        VisibilityRange {
            begin: self.fade_min,
            end: self.fade_max,
            begin_margin: self.fade_min_margin,
            end_margin: self.fade_max_margin,
            fade_mode: self.fade_mode,
        }
    }
}

/// Per-entity draw instances for one prefab set, one instance per LOD.
/// Sole owner of its draw instance handles.
#[derive(Debug)]
pub struct InstancedRendererConfig {
    pub scenario: Rid,
    pub lod_configs: Vec<LodConfig>,
    pub query: InstanceQuery,
    /// Indexed `slot * lod_count + lod`. Owned: every valid handle is freed
    /// before it is dropped from the array.
    pub instance_rids: Vec<Rid>,
    pub previous_entity_count: usize,
}

impl InstancedRendererConfig {
    pub fn new(scenario: Rid, lod_configs: Vec<LodConfig>, query: InstanceQuery) -> Self {
        Self {
            scenario,
            lod_configs,
            query,
            instance_rids: Vec::new(),
            previous_entity_count: 0,
        }
    }

    pub fn lod_count(&self) -> usize {
        self.lod_configs.len()
    }

    /// Entity slots the handle array currently covers.
    pub fn slot_capacity(&self) -> usize {
        match self.lod_count() {
            0 => 0,
            n => self.instance_rids.len() / n,
        }
    }

    pub fn live_handles(&self) -> usize {
        self.instance_rids.iter().filter(|rid| rid.is_valid()).count()
    }
}

/// The registry singleton.
#[derive(Debug, Default)]
pub struct Renderers {
    pub by_kind: HashMap<RendererKind, HashMap<Rid, MultiMeshRendererConfig>>,
    pub instanced: Vec<InstancedRendererConfig>,
}

impl Renderers {
    pub fn multimesh(&self) -> Option<&HashMap<Rid, MultiMeshRendererConfig>> {
        self.by_kind.get(&RendererKind::MultiMesh)
    }

    pub fn multimesh_mut(&mut self) -> Option<&mut HashMap<Rid, MultiMeshRendererConfig>> {
        self.by_kind.get_mut(&RendererKind::MultiMesh)
    }

    pub fn is_empty(&self) -> bool {
        self.instanced.is_empty() && self.by_kind.values().all(HashMap::is_empty)
    }
}

/// Packed instance buffers, one per batched resource.
#[derive(Debug, Default)]
pub struct MultiMeshBuffers(pub HashMap<Rid, Vec<f32>>);
