//! JavaScript rendering server bridge.
//!
//! The host passes an object with camelCase methods mirroring
//! [`RenderingServer`]. Handles cross the boundary as `BigInt`, transforms as
//! 12 floats (three basis rows, each followed by its origin component).

use wasm_bindgen::prelude::*;

use crate::components::Transform3D;
use crate::rendering::query::InstanceTransform;
use crate::rendering::server::{RenderingServer, Rid, TransformFormat, VisibilityRange};

#[wasm_bindgen]
extern "C" {
    pub type JsRenderingServer;

    #[wasm_bindgen(method, js_name = multimeshAllocateData)]
    fn js_multimesh_allocate_data(
        this: &JsRenderingServer,
        multimesh: u64,
        instances: u32,
        format: u32,
        use_colors: bool,
        use_custom_data: bool,
    );

    #[wasm_bindgen(method, js_name = multimeshSetBuffer)]
    fn js_multimesh_set_buffer(this: &JsRenderingServer, multimesh: u64, buffer: &[f32]);

    #[wasm_bindgen(method, js_name = multimeshSetVisibleInstances)]
    fn js_multimesh_set_visible_instances(this: &JsRenderingServer, multimesh: u64, visible: u32);

    #[wasm_bindgen(method, js_name = instanceCreate)]
    fn js_instance_create(this: &JsRenderingServer, mesh: u64, scenario: u64) -> u64;

    #[wasm_bindgen(method, js_name = freeRid)]
    fn js_free_rid(this: &JsRenderingServer, rid: u64);

    #[wasm_bindgen(method, js_name = instanceSetVisible)]
    fn js_instance_set_visible(this: &JsRenderingServer, instance: u64, visible: bool);

    #[wasm_bindgen(method, js_name = instanceSetTransform)]
    fn js_instance_set_transform(this: &JsRenderingServer, instance: u64, transform: &[f32]);

    #[wasm_bindgen(method, js_name = instanceGeometrySetVisibilityRange)]
    fn js_instance_geometry_set_visibility_range(
        this: &JsRenderingServer,
        instance: u64,
        min: f32,
        max: f32,
        min_margin: f32,
        max_margin: f32,
        fade_mode: u32,
    );
}

/// Host-side format codes.
fn format_code(format: TransformFormat) -> u32 {
    match format {
        TransformFormat::Transform2D => 0,
        TransformFormat::Transform3D => 1,
    }
}

fn clamp_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl RenderingServer for JsRenderingServer {
    fn multimesh_allocate_data(
        &mut self,
        multimesh: Rid,
        instances: usize,
        format: TransformFormat,
        use_colors: bool,
        use_custom_data: bool,
    ) {
        self.js_multimesh_allocate_data(
            multimesh.0,
            clamp_u32(instances),
            format_code(format),
            use_colors,
            use_custom_data,
        );
    }

    fn multimesh_set_buffer(&mut self, multimesh: Rid, buffer: &[f32]) {
        self.js_multimesh_set_buffer(multimesh.0, buffer);
    }

    fn multimesh_set_visible_instances(&mut self, multimesh: Rid, visible: usize) {
        self.js_multimesh_set_visible_instances(multimesh.0, clamp_u32(visible));
    }

    fn instance_create(&mut self, mesh: Rid, scenario: Rid) -> Rid {
        Rid(self.js_instance_create(mesh.0, scenario.0))
    }

    fn free_rid(&mut self, rid: Rid) {
        self.js_free_rid(rid.0);
    }

    fn instance_set_visible(&mut self, instance: Rid, visible: bool) {
        self.js_instance_set_visible(instance.0, visible);
    }

    fn instance_set_transform(&mut self, instance: Rid, transform: &Transform3D) {
        let mut packed = [0.0f32; 12];
        transform.write_packed(&mut packed);
        self.js_instance_set_transform(instance.0, &packed);
    }

    fn instance_geometry_set_visibility_range(&mut self, instance: Rid, range: &VisibilityRange) {
        self.js_instance_geometry_set_visibility_range(
            instance.0,
            range.begin,
            range.end,
            range.begin_margin,
            range.end_margin,
            range.fade_mode.as_u32(),
        );
    }
}
