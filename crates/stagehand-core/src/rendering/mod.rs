//! Entity rendering: keeps host draw state in step with the ECS world.
//!
//! Registration builds the renderer registry once at ready time; the two
//! `OnRender` systems then push query results to the rendering server every
//! tick. Nothing flows back from the server into the world.

pub mod capacity;
pub mod headless;
pub mod instanced;
pub mod multimesh;
pub mod query;
pub mod registration;
pub mod renderers;
pub mod server;

use crate::names;
use crate::pipeline::{Phase, Pipeline, SystemKind};

/// Register both render sync systems in `OnRender`.
pub fn register_systems(pipeline: &mut Pipeline) {
    pipeline.add(
        names::systems::ENTITY_RENDERING_MULTIMESH,
        SystemKind::Phase(Phase::OnRender),
        multimesh::entity_rendering_multimesh,
    );
    pipeline.add(
        names::systems::ENTITY_RENDERING_INSTANCED,
        SystemKind::Phase(Phase::OnRender),
        instanced::entity_rendering_instanced,
    );
}
