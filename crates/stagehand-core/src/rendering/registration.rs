//! Renderer Registration: turn renderer nodes into registry entries.
//!
//! Runs once when the stage becomes ready. Misconfigured nodes are reported
//! with a warning and left out; nothing here fails the stage.

use hecs::World;

use crate::prefab;
use crate::rendering::query::{Axis, InstanceQuery, InstanceQueryBuilder};
use crate::rendering::renderers::{
    InstancedRendererConfig, LodConfig, MultiMeshBuffers, MultiMeshRendererConfig, RendererKind, Renderers,
};
use crate::rendering::server::{Rid, TransformFormat};
use crate::scene::{InstancedRendererNode, MultiMeshRendererNode, SceneChild, SceneNode};

/// Upper bound on LOD levels per instanced renderer.
pub const MAX_LOD_LEVELS: usize = 8;

#[derive(Debug, Default)]
pub struct RegistrationOutcome {
    pub renderers: Renderers,
    pub buffers: MultiMeshBuffers,
    /// Distinct batched resources registered.
    pub multimesh_count: usize,
    /// Instanced renderer nodes accepted.
    pub instanced_count: usize,
}

/// Build the renderer registry from the stage's direct children.
pub fn register_renderers(world: &World, children: &[SceneChild]) -> RegistrationOutcome {
    let mut outcome = RegistrationOutcome::default();

    for child in children {
        match &child.node {
            SceneNode::MultiMeshRenderer2D(node) => {
                register_multimesh(world, &child.name, node, TransformFormat::Transform2D, &mut outcome)
            }
            SceneNode::MultiMeshRenderer3D(node) => {
                register_multimesh(world, &child.name, node, TransformFormat::Transform3D, &mut outcome)
            }
            SceneNode::InstancedRenderer3D(node) => register_instanced(world, &child.name, node, &mut outcome),
            SceneNode::Other => {}
        }
    }

    log::debug!(
        "Registered {} MultiMesh and {} instanced renderers",
        outcome.multimesh_count,
        outcome.instanced_count
    );
    outcome
}

fn with_prefab_terms(
    world: &World,
    node_name: &str,
    mut builder: InstanceQueryBuilder,
    prefabs: &[String],
) -> InstanceQuery {
    for name in prefabs {
        match prefab::lookup(world, name) {
            Some(entity) => builder = builder.is_a(entity),
            None => log::warn!("'{node_name}': prefab not found: {name}"),
        }
    }
    builder.build()
}

fn register_multimesh(
    world: &World,
    name: &str,
    node: &MultiMeshRendererNode,
    format: TransformFormat,
    outcome: &mut RegistrationOutcome,
) {
    let Some(resource) = &node.multimesh else {
        log::warn!("'{name}' has no MultiMesh resource assigned");
        return;
    };
    if node.prefabs_rendered.is_empty() {
        log::warn!("'{name}' has empty 'prefabs_rendered'");
        return;
    }
    if resource.transform_format != format {
        log::warn!(
            "'{name}': MultiMesh uses {:?} but the node renders {:?}",
            resource.transform_format,
            format
        );
        return;
    }

    // Depth ordering only exists in 3D.
    let axis = node
        .draw_order
        .axis()
        .filter(|axis| format == TransformFormat::Transform3D || *axis != Axis::Z);
    let builder = InstanceQuery::builder(format)
        .with_color(resource.use_colors)
        .with_custom_data(resource.use_custom_data)
        .order_by(axis);
    let query = with_prefab_terms(world, name, builder, &node.prefabs_rendered);

    let configs = outcome.renderers.by_kind.entry(RendererKind::MultiMesh).or_default();
    let config = configs.entry(resource.rid).or_insert_with(|| {
        outcome.multimesh_count += 1;
        outcome.buffers.0.insert(resource.rid, resource.buffer.clone());
        MultiMeshRendererConfig {
            rid: resource.rid,
            queries: Vec::new(),
            transform_format: resource.transform_format,
            use_colors: resource.use_colors,
            use_custom_data: resource.use_custom_data,
            instance_count: resource.instance_count,
            visible_instance_count: resource.visible_instance_count,
        }
    });
    config.queries.push(query);
}

fn validate_instanced(name: &str, node: &InstancedRendererNode) -> bool {
    let mut valid = true;

    if node.lod_levels.is_empty() {
        log::warn!("'{name}': no LOD levels configured; at least one LOD level with a mesh is required");
        valid = false;
    }
    if node.prefabs_rendered.is_empty() {
        log::warn!("'{name}': 'prefabs_rendered' is empty");
        valid = false;
    }

    for (i, lod) in node.lod_levels.iter().enumerate() {
        if !lod.mesh.is_some_and(Rid::is_valid) {
            log::warn!("'{name}': LOD {i} has no mesh assigned");
            valid = false;
        }
        if lod.fade_max < lod.fade_min {
            log::warn!("'{name}': LOD {i} has fade_max < fade_min; visibility ranges may be wrong");
        }
        if lod.fade_min_margin < 0.0 {
            log::warn!("'{name}': LOD {i} has negative fade_min_margin");
        }
        if lod.fade_max_margin < 0.0 {
            log::warn!("'{name}': LOD {i} has negative fade_max_margin");
        }
    }

    valid
}

fn register_instanced(world: &World, name: &str, node: &InstancedRendererNode, outcome: &mut RegistrationOutcome) {
    if !validate_instanced(name, node) {
        return;
    }

    let Some(scenario) = node.scenario.filter(|rid| rid.is_valid()) else {
        log::warn!("'{name}': could not get the 3D world scenario");
        return;
    };

    if node.lod_levels.len() > MAX_LOD_LEVELS {
        log::warn!(
            "'{name}': {} LOD levels configured, only the first {MAX_LOD_LEVELS} are used",
            node.lod_levels.len()
        );
    }
    let lod_configs = node
        .lod_levels
        .iter()
        .take(MAX_LOD_LEVELS)
        .map(|lod| LodConfig {
            mesh: lod.mesh.unwrap_or(Rid::INVALID),
            fade_min: lod.fade_min,
            fade_max: lod.fade_max,
            fade_min_margin: lod.fade_min_margin,
            fade_max_margin: lod.fade_max_margin,
            fade_mode: lod.fade_mode,
        })
        .collect();

    let builder = InstanceQuery::builder(TransformFormat::Transform3D);
    let query = with_prefab_terms(world, name, builder, &node.prefabs_rendered);

    outcome
        .renderers
        .instanced
        .push(InstancedRendererConfig::new(scenario, lod_configs, query));
    outcome.instanced_count += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefab::create_prefab;
    use crate::scene::{DrawOrder, LodLevel, MultiMeshResource};

    fn world() -> World {
        let mut world = World::new();
        create_prefab(&mut world, "Crate");
        create_prefab(&mut world, "Tree");
        world
    }

    fn resource(rid: u64, format: TransformFormat) -> MultiMeshResource {
        MultiMeshResource {
            rid: Rid(rid),
            transform_format: format,
            use_colors: true,
            use_custom_data: false,
            instance_count: 0,
            visible_instance_count: 0,
            buffer: vec![0.5; 16],
        }
    }

    fn multimesh_child(name: &str, rid: u64, prefabs: &[&str], draw_order: DrawOrder) -> SceneChild {
        SceneChild {
            name: name.to_owned(),
            node: SceneNode::MultiMeshRenderer3D(MultiMeshRendererNode {
                multimesh: Some(resource(rid, TransformFormat::Transform3D)),
                prefabs_rendered: prefabs.iter().map(|s| s.to_string()).collect(),
                draw_order,
            }),
        }
    }

    fn lod(mesh: u64) -> LodLevel {
        LodLevel {
            mesh: Some(Rid(mesh)),
            fade_max: 100.0,
            ..LodLevel::default()
        }
    }

    fn instanced_child(lods: Vec<LodLevel>, scenario: Option<Rid>) -> SceneChild {
        SceneChild {
            name: "Trees".to_owned(),
            node: SceneNode::InstancedRenderer3D(InstancedRendererNode {
                prefabs_rendered: vec!["Tree".to_owned()],
                lod_levels: lods,
                scenario,
            }),
        }
    }

    #[test]
    fn nodes_sharing_a_resource_fold_into_one_entry() {
        let world = world();
        let children = vec![
            multimesh_child("A", 5, &["Crate"], DrawOrder::None),
            multimesh_child("B", 5, &["Tree"], DrawOrder::Y),
            multimesh_child("C", 6, &["Crate"], DrawOrder::None),
        ];

        let outcome = register_renderers(&world, &children);

        assert_eq!(outcome.multimesh_count, 2);
        let configs = outcome.renderers.multimesh().unwrap();
        assert_eq!(configs.len(), 2);
        let shared = &configs[&Rid(5)];
        assert_eq!(shared.queries.len(), 2);
        assert_eq!(shared.queries[1].order_by(), Some(Axis::Y));
        assert!(shared.use_colors);
        assert_eq!(outcome.buffers.0[&Rid(5)], vec![0.5; 16]);
    }

    #[test]
    fn misconfigured_multimesh_nodes_are_skipped() {
        let world = world();
        let mut no_resource = multimesh_child("NoResource", 1, &["Crate"], DrawOrder::None);
        if let SceneNode::MultiMeshRenderer3D(node) = &mut no_resource.node {
            node.multimesh = None;
        }
        let no_prefabs = multimesh_child("NoPrefabs", 2, &[], DrawOrder::None);
        let mismatched = SceneChild {
            name: "Mismatched".to_owned(),
            node: SceneNode::MultiMeshRenderer2D(MultiMeshRendererNode {
                multimesh: Some(resource(3, TransformFormat::Transform3D)),
                prefabs_rendered: vec!["Crate".to_owned()],
                draw_order: DrawOrder::None,
            }),
        };

        let outcome = register_renderers(&world, &[no_resource, no_prefabs, mismatched]);
        assert_eq!(outcome.multimesh_count, 0);
        assert!(outcome.renderers.is_empty());
        assert!(outcome.buffers.0.is_empty());
    }

    #[test]
    fn unresolved_prefabs_are_omitted() {
        let world = world();
        let outcome = register_renderers(
            &world,
            &[
                multimesh_child("Partial", 1, &["Missing", "Crate"], DrawOrder::None),
                multimesh_child("Nothing", 2, &["Missing"], DrawOrder::None),
            ],
        );

        let configs = outcome.renderers.multimesh().unwrap();
        assert_eq!(configs[&Rid(1)].queries[0].prefabs().len(), 1);
        assert!(configs[&Rid(2)].queries[0].is_trivial());
        assert_eq!(outcome.multimesh_count, 2);
    }

    #[test]
    fn depth_order_is_ignored_in_2d() {
        let world = world();
        let child = SceneChild {
            name: "Sprites".to_owned(),
            node: SceneNode::MultiMeshRenderer2D(MultiMeshRendererNode {
                multimesh: Some(resource(9, TransformFormat::Transform2D)),
                prefabs_rendered: vec!["Crate".to_owned()],
                draw_order: DrawOrder::Z,
            }),
        };
        let outcome = register_renderers(&world, &[child]);
        let config = &outcome.renderers.multimesh().unwrap()[&Rid(9)];
        assert_eq!(config.queries[0].order_by(), None);
        assert_eq!(config.stride(), 12);
    }

    #[test]
    fn instanced_renderer_is_registered() {
        let world = world();
        let outcome = register_renderers(&world, &[instanced_child(vec![lod(2), lod(3)], Some(Rid(1)))]);

        assert_eq!(outcome.instanced_count, 1);
        let renderer = &outcome.renderers.instanced[0];
        assert_eq!(renderer.scenario, Rid(1));
        assert_eq!(renderer.lod_count(), 2);
        assert_eq!(renderer.lod_configs[1].mesh, Rid(3));
        assert!(renderer.instance_rids.is_empty());
    }

    #[test]
    fn invalid_instanced_renderers_are_skipped() {
        let world = world();
        let mut meshless = lod(2);
        meshless.mesh = None;
        let children = [
            instanced_child(Vec::new(), Some(Rid(1))),
            instanced_child(vec![meshless], Some(Rid(1))),
            instanced_child(vec![lod(2)], None),
        ];

        let outcome = register_renderers(&world, &children);
        assert_eq!(outcome.instanced_count, 0);
        assert!(outcome.renderers.instanced.is_empty());
    }

    #[test]
    fn inverted_fade_band_only_warns() {
        let world = world();
        let mut inverted = lod(2);
        inverted.fade_min = 50.0;
        inverted.fade_max = 10.0;
        inverted.fade_max_margin = -1.0;

        let outcome = register_renderers(&world, &[instanced_child(vec![inverted], Some(Rid(1)))]);
        assert_eq!(outcome.instanced_count, 1);
    }

    #[test]
    fn lod_levels_are_capped() {
        let world = world();
        let lods = (0..12).map(|i| lod(10 + i)).collect();
        let outcome = register_renderers(&world, &[instanced_child(lods, Some(Rid(1)))]);
        assert_eq!(outcome.renderers.instanced[0].lod_count(), MAX_LOD_LEVELS);
    }
}
