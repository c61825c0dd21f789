//! The host rendering server as seen by the sync systems.
//!
//! Resources are opaque [`Rid`] handles minted by the host. The trait covers
//! only the batched-buffer and draw-instance calls the sync systems make.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::components::Transform3D;

/// Opaque rendering server resource handle. Zero is never a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rid(pub u64);

impl Rid {
    pub const INVALID: Rid = Rid(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Per-instance transform layout of a batched resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformFormat {
    #[serde(rename = "2d")]
    Transform2D,
    #[serde(rename = "3d")]
    Transform3D,
}

impl TransformFormat {
    /// Floats occupied by the transform alone.
    pub const fn base_stride(self) -> usize {
        match self {
            TransformFormat::Transform2D => 8,
            TransformFormat::Transform3D => 12,
        }
    }

    /// Floats per instance record including the optional colour and custom blocks.
    pub const fn stride(self, use_colors: bool, use_custom_data: bool) -> usize {
        self.base_stride() + if use_colors { 4 } else { 0 } + if use_custom_data { 4 } else { 0 }
    }
}

/// Which geometry fades when crossing a visibility range margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeMode {
    Disabled,
    #[default]
    #[serde(rename = "self")]
    SelfOnly,
    Dependencies,
}

impl FadeMode {
    /// Wire value shared with the host.
    pub const fn as_u32(self) -> u32 {
        match self {
            FadeMode::Disabled => 0,
            FadeMode::SelfOnly => 1,
            FadeMode::Dependencies => 2,
        }
    }
}

/// Distance band in which a draw instance is visible.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisibilityRange {
    pub begin: f32,
    pub end: f32,
    pub begin_margin: f32,
    pub end_margin: f32,
    pub fade_mode: FadeMode,
}

/// Calls the sync systems make on the host rendering server.
///
/// Implementations must tolerate any call order; the sync systems never read
/// state back.
pub trait RenderingServer {
    /// (Re)allocate instance storage for a batched resource.
    fn multimesh_allocate_data(
        &mut self,
        multimesh: Rid,
        instances: usize,
        format: TransformFormat,
        use_colors: bool,
        use_custom_data: bool,
    );

    /// Replace the packed instance records, starting at instance 0.
    fn multimesh_set_buffer(&mut self, multimesh: Rid, buffer: &[f32]);

    fn multimesh_set_visible_instances(&mut self, multimesh: Rid, visible: usize);

    /// Create a draw instance of `mesh` inside `scenario`.
    fn instance_create(&mut self, mesh: Rid, scenario: Rid) -> Rid;

    fn free_rid(&mut self, rid: Rid);

    fn instance_set_visible(&mut self, instance: Rid, visible: bool);

    fn instance_set_transform(&mut self, instance: Rid, transform: &Transform3D);

    fn instance_geometry_set_visibility_range(&mut self, instance: Rid, range: &VisibilityRange);
}

impl<S: RenderingServer> RenderingServer for Rc<RefCell<S>> {
    fn multimesh_allocate_data(
        &mut self,
        multimesh: Rid,
        instances: usize,
        format: TransformFormat,
        use_colors: bool,
        use_custom_data: bool,
    ) {
        self.borrow_mut()
            .multimesh_allocate_data(multimesh, instances, format, use_colors, use_custom_data);
    }

    fn multimesh_set_buffer(&mut self, multimesh: Rid, buffer: &[f32]) {
        self.borrow_mut().multimesh_set_buffer(multimesh, buffer);
    }

    fn multimesh_set_visible_instances(&mut self, multimesh: Rid, visible: usize) {
        self.borrow_mut().multimesh_set_visible_instances(multimesh, visible);
    }

    fn instance_create(&mut self, mesh: Rid, scenario: Rid) -> Rid {
        self.borrow_mut().instance_create(mesh, scenario)
    }

    fn free_rid(&mut self, rid: Rid) {
        self.borrow_mut().free_rid(rid);
    }

    fn instance_set_visible(&mut self, instance: Rid, visible: bool) {
        self.borrow_mut().instance_set_visible(instance, visible);
    }

    fn instance_set_transform(&mut self, instance: Rid, transform: &Transform3D) {
        self.borrow_mut().instance_set_transform(instance, transform);
    }

    fn instance_geometry_set_visibility_range(&mut self, instance: Rid, range: &VisibilityRange) {
        self.borrow_mut().instance_geometry_set_visibility_range(instance, range);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_covers_optional_blocks() {
        assert_eq!(TransformFormat::Transform2D.stride(false, false), 8);
        assert_eq!(TransformFormat::Transform2D.stride(true, true), 16);
        assert_eq!(TransformFormat::Transform3D.stride(true, false), 16);
        assert_eq!(TransformFormat::Transform3D.stride(false, true), 16);
        assert_eq!(TransformFormat::Transform3D.stride(true, true), 20);
    }

    #[test]
    fn zero_rid_is_invalid() {
        assert!(!Rid::INVALID.is_valid());
        assert!(Rid(7).is_valid());
        assert_eq!(Rid::default(), Rid::INVALID);
    }

    #[test]
    fn formats_and_fade_modes_parse_from_host_names() {
        let format: TransformFormat = serde_json::from_str("\"3d\"").unwrap();
        assert_eq!(format, TransformFormat::Transform3D);
        let fade: FadeMode = serde_json::from_str("\"self\"").unwrap();
        assert_eq!(fade, FadeMode::SelfOnly);
        assert_eq!(FadeMode::Dependencies.as_u32(), 2);
    }
}
