//! Per-entity instanced render sync.
//!
//! Every matched entity owns one draw instance per LOD level. Handles persist
//! across frames; slots past the live entity count are hidden, and only freed
//! when the handle array shrinks a capacity class or at teardown.

use std::ops::ControlFlow;

use hecs::World;

use crate::components::Transform3D;
use crate::names;
use crate::pipeline::SystemContext;
use crate::rendering::capacity::{capacity_class, outside_hysteresis};
use crate::rendering::renderers::{InstancedRendererConfig, Renderers};
use crate::rendering::server::{RenderingServer, Rid};

/// Sync one instanced renderer with the world.
pub fn update_instanced_renderer(
    server: &mut dyn RenderingServer,
    world: &World,
    renderer: &mut InstancedRendererConfig,
) {
    let lod_count = renderer.lod_count();
    if lod_count == 0 {
        return;
    }

    let query = renderer.query.prepare(world);
    let entity_count = query.count(world);

    let current = renderer.instance_rids.len() / lod_count;
    let target = capacity_class(entity_count);
    if outside_hysteresis(current, target) {
        let new_len = target * lod_count;
        if new_len < renderer.instance_rids.len() {
            for rid in renderer.instance_rids.drain(new_len..) {
                if rid.is_valid() {
                    server.free_rid(rid);
                }
            }
        }
        renderer.instance_rids.resize(new_len, Rid::INVALID);
    }

    let InstancedRendererConfig {
        scenario,
        lod_configs,
        instance_rids,
        previous_entity_count,
        ..
    } = renderer;

    let previous = *previous_entity_count;
    let mut entity_index = 0usize;
    query.run::<Transform3D, _>(world, |row| {
        if entity_index >= entity_count {
            return ControlFlow::Break(());
        }
        for (lod, lod_config) in lod_configs.iter().enumerate() {
            let slot = &mut instance_rids[entity_index * lod_count + lod];

            let is_new = !slot.is_valid();
            if is_new {
                *slot = server.instance_create(lod_config.mesh, *scenario);
                server.instance_geometry_set_visibility_range(*slot, &lod_config.visibility_range());
            }
            if is_new || entity_index >= previous {
                server.instance_set_visible(*slot, true);
            }
            server.instance_set_transform(*slot, &row.transform);
        }
        entity_index += 1;
        ControlFlow::Continue(())
    });

    if entity_count < previous {
        let start = entity_count * lod_count;
        let end = (previous * lod_count).min(instance_rids.len());
        for rid in instance_rids.iter().take(end).skip(start) {
            if rid.is_valid() {
                server.instance_set_visible(*rid, false);
            }
        }
    }

    *previous_entity_count = entity_count;
}

/// Free every draw instance owned by the instanced renderers.
pub fn free_instanced_renderers(server: &mut dyn RenderingServer, renderers: &mut Renderers) -> usize {
    let mut freed = 0;
    for renderer in &mut renderers.instanced {
        for rid in renderer.instance_rids.drain(..) {
            if rid.is_valid() {
                server.free_rid(rid);
                freed += 1;
            }
        }
        renderer.previous_entity_count = 0;
    }
    freed
}

/// `OnRender` system: sync every registered instanced renderer.
pub fn entity_rendering_instanced(ctx: &mut SystemContext) {
    let world: &World = &*ctx.world;
    let Ok(mut renderers) = world.get::<&mut Renderers>(ctx.singleton) else {
        return;
    };
    if renderers.instanced.is_empty() {
        return;
    }

    let Some(server) = ctx.server.as_deref_mut() else {
        log::error!(
            "{}: rendering server not available",
            names::systems::ENTITY_RENDERING_INSTANCED
        );
        return;
    };

    for renderer in &mut renderers.instanced {
        update_instanced_renderer(server, world, renderer);
    }
}
