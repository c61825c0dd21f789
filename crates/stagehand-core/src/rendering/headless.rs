//! In-memory rendering server.
//!
//! Keeps the state a real server would hold so that native hosts and tests
//! can run the sync systems and inspect what was submitted.

use std::collections::HashMap;

use crate::components::Transform3D;
use crate::rendering::server::{RenderingServer, Rid, TransformFormat, VisibilityRange};

/// Batched resource state.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMeshState {
    pub instance_count: usize,
    pub format: TransformFormat,
    pub use_colors: bool,
    pub use_custom_data: bool,
    pub buffer: Vec<f32>,
    pub visible_instances: usize,
    pub allocations: usize,
}

impl MultiMeshState {
    pub fn stride(&self) -> usize {
        self.format.stride(self.use_colors, self.use_custom_data)
    }
}

/// Draw instance state.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceState {
    pub mesh: Rid,
    pub scenario: Rid,
    pub visible: bool,
    pub transform: Transform3D,
    pub visibility_range: Option<VisibilityRange>,
}

#[derive(Debug, Default)]
pub struct HeadlessServer {
    next_rid: u64,
    multimeshes: HashMap<Rid, MultiMeshState>,
    instances: HashMap<Rid, InstanceState>,
    created: usize,
    freed: usize,
    rejected_calls: usize,
}

impl HeadlessServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self) -> Rid {
        self.next_rid += 1;
        Rid(self.next_rid)
    }

    /// Mint a handle standing in for a mesh resource.
    pub fn create_mesh(&mut self) -> Rid {
        self.mint()
    }

    /// Mint a handle standing in for a scenario (3D world).
    pub fn create_scenario(&mut self) -> Rid {
        self.mint()
    }

    /// Create an empty batched resource.
    pub fn create_multimesh(&mut self, format: TransformFormat, use_colors: bool, use_custom_data: bool) -> Rid {
        let rid = self.mint();
        self.multimeshes.insert(
            rid,
            MultiMeshState {
                instance_count: 0,
                format,
                use_colors,
                use_custom_data,
                buffer: Vec::new(),
                visible_instances: 0,
                allocations: 0,
            },
        );
        rid
    }

    pub fn multimesh(&self, rid: Rid) -> Option<&MultiMeshState> {
        self.multimeshes.get(&rid)
    }

    pub fn instance(&self, rid: Rid) -> Option<&InstanceState> {
        self.instances.get(&rid)
    }

    /// Draw instances that are still allocated.
    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn created_instances(&self) -> usize {
        self.created
    }

    pub fn freed_instances(&self) -> usize {
        self.freed
    }

    /// Calls that referenced unknown handles or malformed buffers.
    pub fn rejected_calls(&self) -> usize {
        self.rejected_calls
    }

    fn reject(&mut self, call: &str, rid: Rid) {
        log::warn!("HeadlessServer: {call} rejected for {rid:?}");
        self.rejected_calls += 1;
    }
}

impl RenderingServer for HeadlessServer {
    fn multimesh_allocate_data(
        &mut self,
        multimesh: Rid,
        instances: usize,
        format: TransformFormat,
        use_colors: bool,
        use_custom_data: bool,
    ) {
        log::trace!("HeadlessServer: allocating {instances} instances for {multimesh:?}");
        let Some(state) = self.multimeshes.get_mut(&multimesh) else {
            self.reject("multimesh_allocate_data", multimesh);
            return;
        };
        state.instance_count = instances;
        state.format = format;
        state.use_colors = use_colors;
        state.use_custom_data = use_custom_data;
        state.buffer = vec![0.0; instances * state.stride()];
        state.visible_instances = instances;
        state.allocations += 1;
    }

    fn multimesh_set_buffer(&mut self, multimesh: Rid, buffer: &[f32]) {
        let accepted = match self.multimeshes.get_mut(&multimesh) {
            Some(state) => {
                let stride = state.stride();
                let fits = buffer.len() % stride == 0 && buffer.len() <= state.instance_count * stride;
                if fits {
                    state.buffer[..buffer.len()].copy_from_slice(buffer);
                }
                fits
            }
            None => false,
        };
        if !accepted {
            self.reject("multimesh_set_buffer", multimesh);
        }
    }

    fn multimesh_set_visible_instances(&mut self, multimesh: Rid, visible: usize) {
        match self.multimeshes.get_mut(&multimesh) {
            Some(state) => state.visible_instances = visible,
            None => self.reject("multimesh_set_visible_instances", multimesh),
        }
    }

    fn instance_create(&mut self, mesh: Rid, scenario: Rid) -> Rid {
        let rid = self.mint();
        self.instances.insert(
            rid,
            InstanceState {
                mesh,
                scenario,
                visible: true,
                transform: Transform3D::default(),
                visibility_range: None,
            },
        );
        self.created += 1;
        rid
    }

    fn free_rid(&mut self, rid: Rid) {
        if self.instances.remove(&rid).is_some() {
            self.freed += 1;
        } else if self.multimeshes.remove(&rid).is_none() {
            self.reject("free_rid", rid);
        }
    }

    fn instance_set_visible(&mut self, instance: Rid, visible: bool) {
        match self.instances.get_mut(&instance) {
            Some(state) => state.visible = visible,
            None => self.reject("instance_set_visible", instance),
        }
    }

    fn instance_set_transform(&mut self, instance: Rid, transform: &Transform3D) {
        match self.instances.get_mut(&instance) {
            Some(state) => state.transform = *transform,
            None => self.reject("instance_set_transform", instance),
        }
    }

    fn instance_geometry_set_visibility_range(&mut self, instance: Rid, range: &VisibilityRange) {
        match self.instances.get_mut(&instance) {
            Some(state) => state.visibility_range = Some(*range),
            None => self.reject("instance_geometry_set_visibility_range", instance),
        }
    }
}
