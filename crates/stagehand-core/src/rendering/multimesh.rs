//! Batched (MultiMesh) render sync.
//!
//! Per-instance record layout, in floats:
//!
//! | format | transform | + colour | + custom | + both |
//! |--------|-----------|----------|----------|--------|
//! | 2D     | 8         | 12       | 12       | 16     |
//! | 3D     | 12        | 16       | 16       | 20     |
//!
//! Transforms are row-major. 2D: `(x.x, y.x, 0, origin.x, x.y, y.y, 0, origin.y)`.
//! 3D: `(row0.x, row1.x, row2.x, origin.x, row0.y, ..., row2.z, origin.z)`.
//! Colour follows as `(r, g, b, a)`, then custom data as `(x, y, z, w)`.

use std::ops::ControlFlow;

use hecs::World;

use crate::components::{Transform2D, Transform3D};
use crate::names;
use crate::pipeline::SystemContext;
use crate::rendering::capacity::{capacity_class, outside_hysteresis};
use crate::rendering::query::{InstanceTransform, PreparedQuery};
use crate::rendering::renderers::{MultiMeshBuffers, MultiMeshRendererConfig, Renderers};
use crate::rendering::server::{RenderingServer, TransformFormat};

/// Sync one batched resource with the world. `buffer` is the resource's
/// cached instance buffer and is resized here when the capacity class changes.
pub fn update_multimesh<T: InstanceTransform>(
    server: &mut dyn RenderingServer,
    world: &World,
    config: &mut MultiMeshRendererConfig,
    buffer: &mut Vec<f32>,
) {
    let stride = config.stride();
    let base = T::FORMAT.base_stride();

    let queries: Vec<PreparedQuery<'_>> = config.queries.iter().map(|q| q.prepare(world)).collect();
    let total_matches: usize = queries.iter().map(|q| q.count(world)).sum();
    if total_matches == 0 && config.instance_count == 0 {
        server.multimesh_set_visible_instances(config.rid, 0);
        config.visible_instance_count = 0;
        return;
    }

    let capacity = capacity_class(config.instance_count.max(total_matches));
    let required = capacity * stride;

    if outside_hysteresis(buffer.len(), required) || buffer.len() % stride != 0 {
        server.multimesh_allocate_data(
            config.rid,
            capacity,
            config.transform_format,
            config.use_colors,
            config.use_custom_data,
        );
        if !buffer.is_empty() {
            log::info!(
                "{}: resizing buffer for {:?} from {} to {}",
                names::systems::ENTITY_RENDERING_MULTIMESH,
                config.rid,
                buffer.len(),
                required
            );
        }
        buffer.resize(required, 0.0);
    }

    let mut written = 0usize;
    for query in &queries {
        query.run::<T, _>(world, |row| {
            if written >= capacity {
                return ControlFlow::Break(());
            }
            let record = &mut buffer[written * stride..(written + 1) * stride];
            row.transform.write_packed(&mut record[..base]);

            let mut cursor = base;
            if config.use_colors {
                let color = row.color.unwrap_or_default();
                record[cursor..cursor + 4].copy_from_slice(bytemuck::cast_slice(std::slice::from_ref(&color)));
                cursor += 4;
            }
            if config.use_custom_data {
                let custom = row.custom_data.unwrap_or_default();
                record[cursor..cursor + 4].copy_from_slice(bytemuck::cast_slice(std::slice::from_ref(&custom)));
            }

            written += 1;
            ControlFlow::Continue(())
        });
        if written >= capacity {
            break;
        }
    }

    server.multimesh_set_buffer(config.rid, &buffer[..written * stride]);
    server.multimesh_set_visible_instances(config.rid, written);
    config.visible_instance_count = written;
}

/// `OnRender` system: sync every registered batched resource.
pub fn entity_rendering_multimesh(ctx: &mut SystemContext) {
    let world: &World = &*ctx.world;
    let mut registry = world.query_one::<(&mut Renderers, &mut MultiMeshBuffers)>(ctx.singleton);
    let Ok((renderers, buffers)) = registry.get() else {
        return;
    };
    let Some(configs) = renderers.multimesh_mut() else {
        return;
    };
    if configs.is_empty() {
        return;
    }

    let Some(server) = ctx.server.as_deref_mut() else {
        log::error!(
            "{}: rendering server not available",
            names::systems::ENTITY_RENDERING_MULTIMESH
        );
        return;
    };

    for config in configs.values_mut() {
        let buffer = buffers.0.entry(config.rid).or_default();
        match config.transform_format {
            TransformFormat::Transform2D => update_multimesh::<Transform2D>(server, world, config, buffer),
            TransformFormat::Transform3D => update_multimesh::<Transform3D>(server, world, config, buffer),
        }
    }
}
