//! The stage: an ECS world driven by the host's node lifecycle.
//!
//! The host creates a stage, optionally hands it a rendering server, calls
//! [`Stage::ready`] once the scene children are known, then forwards its
//! frame callbacks. Scripts reach components, prefabs and systems by name.

use hecs::{Entity, World};
use serde_json::{Map, Value};

use crate::components::{register_components, SceneChildren, Singleton, WorldConfiguration};
use crate::config::{ProgressTick, StageConfig};
use crate::error::{StageError, StageResult};
use crate::names;
use crate::pipeline::{Pipeline, SystemContext};
use crate::prefab::{self, PrefabDefinition};
use crate::registry::ComponentRegistry;
use crate::rendering::instanced::free_instanced_renderers;
use crate::rendering::registration::register_renderers;
use crate::rendering::renderers::{MultiMeshBuffers, Renderers};
use crate::rendering::server::RenderingServer;
use crate::scene::SceneChild;
use crate::signal::{self, PendingSignals, Signal};
use crate::systems;

/// Entity id that addresses the singleton entity from scripts.
pub const SINGLETON_ID: u64 = 0;

pub struct Stage {
    pub world: World,
    singleton: Entity,
    components: ComponentRegistry,
    pipeline: Pipeline,
    server: Option<Box<dyn RenderingServer>>,
    config: StageConfig,
    tick_count: u64,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new(StageConfig::default())
    }
}

fn server_ref(server: &mut Option<Box<dyn RenderingServer>>) -> Option<&mut dyn RenderingServer> {
    match server {
        Some(server) => Some(server.as_mut()),
        None => None,
    }
}

impl Stage {
    pub fn new(config: StageConfig) -> Self {
        let mut components = ComponentRegistry::new();
        register_components(&mut components);

        let mut pipeline = Pipeline::new();
        systems::register_systems(&mut pipeline);
        crate::rendering::register_systems(&mut pipeline);

        let mut world = World::new();
        let singleton = world.spawn((Singleton, PendingSignals::default()));
        prefab::register_builtin_prefabs(&mut world);

        log::debug!(
            "Stage created: {} components, {} systems, progress tick {:?}",
            components.names().count(),
            pipeline.names().count(),
            config.progress_tick
        );

        Self {
            world,
            singleton,
            components,
            pipeline,
            server: None,
            config,
            tick_count: 0,
        }
    }

    pub fn set_rendering_server(&mut self, server: Box<dyn RenderingServer>) {
        self.server = Some(server);
    }

    pub fn has_rendering_server(&self) -> bool {
        self.server.is_some()
    }

    pub fn singleton(&self) -> Entity {
        self.singleton
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn progress_tick(&self) -> ProgressTick {
        self.config.progress_tick
    }

    pub fn set_progress_tick(&mut self, progress_tick: ProgressTick) {
        self.config.progress_tick = progress_tick;
    }

    /// The stage entered the scene tree with the given direct children.
    ///
    /// Mirrors the world configuration and child names into singletons, then
    /// registers every renderer child. Sync systems with nothing to render are
    /// disabled. Returns the number of renderers registered.
    pub fn ready(&mut self, children: &[SceneChild]) -> usize {
        if self.world.get::<&Renderers>(self.singleton).is_ok() {
            self.exit_tree();
        }

        let configuration = WorldConfiguration(self.config.world_configuration.clone());
        let child_names = SceneChildren(children.iter().map(|c| c.name.clone()).collect());
        let outcome = register_renderers(&self.world, children);

        let _ = self.world.insert(
            self.singleton,
            (configuration, child_names, outcome.renderers, outcome.buffers),
        );

        for (system, count, label) in [
            (names::systems::ENTITY_RENDERING_MULTIMESH, outcome.multimesh_count, "MultiMesh"),
            (names::systems::ENTITY_RENDERING_INSTANCED, outcome.instanced_count, "instanced"),
        ] {
            if count > 0 {
                log::info!("Registered {count} {label} entity renderers");
            }
            if let Err(err) = self.pipeline.set_enabled(system, count > 0) {
                log::warn!("{err}");
            }
        }

        outcome.multimesh_count + outcome.instanced_count
    }

    /// Host rendering-frame callback.
    pub fn process(&mut self, delta: f32) {
        if self.config.progress_tick == ProgressTick::Rendering {
            self.progress(delta);
        }
    }

    /// Host fixed-rate physics callback.
    pub fn physics_process(&mut self, delta: f32) {
        if self.config.progress_tick == ProgressTick::Physics {
            self.progress(delta);
        }
    }

    /// Run every enabled system once, phase by phase.
    pub fn progress(&mut self, delta: f32) {
        let mut ctx = SystemContext {
            world: &mut self.world,
            singleton: self.singleton,
            components: &self.components,
            server: server_ref(&mut self.server),
            params: None,
            delta_time: delta,
        };
        self.pipeline.progress(&mut ctx);
        self.tick_count += 1;
    }

    /// How many times the world has progressed.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    fn resolve(&self, component: &str, id: u64) -> StageResult<Entity> {
        let info = self.components.inspect(component)?;
        if id == SINGLETON_ID {
            return Ok(self.singleton);
        }
        if info.is_singleton {
            return Err(StageError::SingletonOnly {
                component: component.to_owned(),
                entity: id,
            });
        }
        Entity::from_bits(id)
            .filter(|e| self.world.contains(*e))
            .ok_or(StageError::EntityNotAlive(id))
    }

    /// Set a component by name. Id 0 addresses the singleton entity.
    pub fn set_component(&mut self, component: &str, id: u64, value: &Value) -> StageResult<()> {
        let entity = self.resolve(component, id)?;
        self.components.set(&mut self.world, entity, component, value)?;
        if entity == self.singleton && component == names::components::WORLD_CONFIGURATION {
            self.config.world_configuration = self.world_configuration();
        }
        Ok(())
    }

    /// Read a component by name. Id 0 addresses the singleton entity.
    pub fn get_component(&self, component: &str, id: u64) -> StageResult<Value> {
        let entity = self.resolve(component, id)?;
        self.components.get(&self.world, entity, component)
    }

    pub fn register_prefab(&mut self, definition: &PrefabDefinition) -> StageResult<u64> {
        let prefab = definition.register(&mut self.world, &self.components)?;
        Ok(prefab.to_bits().get())
    }

    /// Spawn an instance of a named prefab, overriding some of its components.
    pub fn instantiate_prefab(&mut self, name: &str, overrides: Option<&Map<String, Value>>) -> StageResult<u64> {
        let instance = prefab::instantiate_named(&mut self.world, &self.components, name, overrides)?;
        Ok(instance.to_bits().get())
    }

    pub fn enable_system(&mut self, name: &str, enabled: bool) -> StageResult<()> {
        self.pipeline.set_enabled(name, enabled)
    }

    /// Run a system once, now. Empty parameters are the same as none.
    pub fn run_system(&mut self, name: &str, params: Option<&Value>) -> StageResult<()> {
        let params = params.filter(|p| !p.is_null() && p.as_object().is_none_or(|o| !o.is_empty()));
        let mut ctx = SystemContext {
            world: &mut self.world,
            singleton: self.singleton,
            components: &self.components,
            server: server_ref(&mut self.server),
            params,
            delta_time: 0.0,
        };
        self.pipeline.run(name, &mut ctx)
    }

    pub fn set_world_configuration(&mut self, configuration: Map<String, Value>) {
        let _ = self
            .world
            .insert_one(self.singleton, WorldConfiguration(configuration.clone()));
        self.config.world_configuration = configuration;
    }

    pub fn world_configuration(&self) -> Map<String, Value> {
        match self.world.get::<&WorldConfiguration>(self.singleton) {
            Ok(configuration) => configuration.0.clone(),
            Err(_) => self.config.world_configuration.clone(),
        }
    }

    /// Signals raised by systems since the last call, oldest first.
    pub fn drain_signals(&mut self) -> Vec<Signal> {
        signal::drain_signals(&self.world)
    }

    /// The stage left the scene tree: free every draw instance and drop the
    /// renderer registry. Returns the number of instances freed.
    ///
    /// Without a rendering server nothing can be freed; the registry is kept
    /// so a later call can still release it.
    pub fn exit_tree(&mut self) -> usize {
        let freed = {
            let Ok(mut renderers) = self.world.get::<&mut Renderers>(self.singleton) else {
                return 0;
            };
            let Some(server) = server_ref(&mut self.server) else {
                log::error!("Cannot free entity renderers: rendering server not available");
                return 0;
            };
            free_instanced_renderers(server, &mut renderers)
        };

        let _ = self.world.remove::<(Renderers, MultiMeshBuffers)>(self.singleton);
        log::debug!("Stage left the tree, freed {freed} draw instances");
        freed
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        let holds_instances = self
            .world
            .get::<&Renderers>(self.singleton)
            .is_ok_and(|r| r.instanced.iter().any(|i| i.live_handles() > 0));
        if holds_instances {
            self.exit_tree();
        }
    }
}

// ── Dev-tools debug methods ──────────────────────────────────────
#[cfg(feature = "dev-tools")]
impl Stage {
    /// Number of live entities, prefabs and the singleton included.
    pub fn debug_entity_count(&self) -> u32 {
        self.world.len()
    }

    /// Registered renderers and allocated draw instances, as JSON.
    pub fn debug_renderer_summary(&self) -> Value {
        let Ok(renderers) = self.world.get::<&Renderers>(self.singleton) else {
            return Value::Null;
        };
        serde_json::json!({
            "multimesh": renderers.multimesh().map_or(0, |m| m.len()),
            "instanced": renderers.instanced.len(),
            "instance_handles": renderers.instanced.iter().map(|i| i.live_handles()).sum::<usize>(),
            "ticks": self.tick_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::components::{Prefab, Transform3D};
    use crate::pipeline::{Phase, SystemKind};
    use crate::rendering::headless::HeadlessServer;
    use crate::rendering::server::{Rid, TransformFormat};
    use crate::scene::parse_children;
    use serde_json::json;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn stage_with_server() -> (Stage, Rc<RefCell<HeadlessServer>>) {
        init_logging();
        let server = Rc::new(RefCell::new(HeadlessServer::new()));
        let mut stage = Stage::default();
        stage.set_rendering_server(Box::new(server.clone()));
        (stage, server)
    }

    fn crate_prefab(stage: &mut Stage) {
        let definition: PrefabDefinition = serde_json::from_value(json!({
            "name": "Crate",
            "parents": [{ "name": names::prefabs::ENTITY_3D }],
            "components": { "Color": [1.0, 0.0, 0.0, 1.0] }
        }))
        .unwrap();
        stage.register_prefab(&definition).unwrap();
    }

    fn spawn_crates(stage: &mut Stage, n: usize) -> Vec<u64> {
        (0..n)
            .map(|i| {
                let overrides = json!({ "Position3D": [i as f32, 0.0, 0.0] });
                stage.instantiate_prefab("Crate", overrides.as_object()).unwrap()
            })
            .collect()
    }

    #[test]
    fn new_stage_has_builtins() {
        let stage = Stage::default();
        assert!(prefab::lookup(&stage.world, names::prefabs::ENTITY_2D).is_some());
        assert!(prefab::lookup(&stage.world, names::prefabs::ENTITY_3D).is_some());
        for name in [
            names::systems::ENTITY_RENDERING_MULTIMESH,
            names::systems::ENTITY_RENDERING_INSTANCED,
            names::systems::TRANSFORM_UPDATE_3D,
            names::systems::PREFAB_INSTANTIATION,
        ] {
            assert_eq!(stage.pipeline().is_enabled(name), Some(true), "{name}");
        }
        assert_eq!(stage.tick_count(), 0);
    }

    #[test]
    fn components_by_id() {
        let mut stage = Stage::default();
        crate_prefab(&mut stage);
        let id = spawn_crates(&mut stage, 1)[0];

        stage.set_component("Scale3D", id, &json!([2.0, 2.0, 2.0])).unwrap();
        assert_eq!(stage.get_component("Scale3D", id).unwrap(), json!([2.0, 2.0, 2.0]));
        assert_eq!(stage.get_component("Color", id).unwrap(), json!([1.0, 0.0, 0.0, 1.0]));

        let err = stage.get_component("WorldConfiguration", id).unwrap_err();
        assert!(matches!(err, StageError::SingletonOnly { .. }));
        let err = stage.get_component("Scale3D", 12345).unwrap_err();
        assert!(matches!(err, StageError::EntityNotAlive(12345)));
        let err = stage.get_component("Nope", id).unwrap_err();
        assert!(matches!(err, StageError::UnknownComponent(_)));
    }

    #[test]
    fn world_configuration_round_trips_through_the_singleton() {
        let config = StageConfig::from_json(r#"{ "world_configuration": { "seed": 7 } }"#).unwrap();
        let mut stage = Stage::new(config);
        stage.ready(&[]);

        assert_eq!(stage.get_component("WorldConfiguration", SINGLETON_ID).unwrap(), json!({ "seed": 7 }));

        stage
            .set_component("WorldConfiguration", SINGLETON_ID, &json!({ "seed": 8 }))
            .unwrap();
        assert_eq!(stage.world_configuration()["seed"], json!(8));

        let mut replacement = Map::new();
        replacement.insert("difficulty".into(), json!("hard"));
        stage.set_world_configuration(replacement);
        assert_eq!(
            stage.get_component("WorldConfiguration", SINGLETON_ID).unwrap(),
            json!({ "difficulty": "hard" })
        );
    }

    #[test]
    fn ready_without_renderers_disables_sync_systems() {
        let mut stage = Stage::default();
        let children = parse_children(r#"[{ "name": "Camera", "class": "Camera3D" }]"#).unwrap();

        assert_eq!(stage.ready(&children), 0);
        assert_eq!(stage.pipeline().is_enabled(names::systems::ENTITY_RENDERING_MULTIMESH), Some(false));
        assert_eq!(stage.pipeline().is_enabled(names::systems::ENTITY_RENDERING_INSTANCED), Some(false));
        assert_eq!(stage.get_component("SceneChildren", SINGLETON_ID).unwrap(), json!(["Camera"]));

        stage.progress(0.016);
        assert_eq!(stage.tick_count(), 1);
    }

    #[test]
    fn frame_updates_transforms_then_syncs_multimesh() {
        let (mut stage, server) = stage_with_server();
        crate_prefab(&mut stage);
        spawn_crates(&mut stage, 5);
        let rid = server
            .borrow_mut()
            .create_multimesh(TransformFormat::Transform3D, true, false);

        let children = vec![SceneChild {
            name: "Crates".into(),
            node: serde_json::from_value(json!({
                "class": "MultiMeshRenderer3D",
                "prefabs_rendered": ["Crate"],
                "draw_order": "x",
                "multimesh": { "rid": rid, "transform_format": "3d", "use_colors": true }
            }))
            .unwrap(),
        }];
        assert_eq!(stage.ready(&children), 1);
        assert_eq!(stage.pipeline().is_enabled(names::systems::ENTITY_RENDERING_INSTANCED), Some(false));

        stage.process(0.016);

        let server = server.borrow();
        let state = server.multimesh(rid).unwrap();
        assert_eq!(state.instance_count, 16);
        assert_eq!(state.visible_instances, 5);
        for i in 0..5 {
            let record = &state.buffer[i * 16..(i + 1) * 16];
            assert_eq!(record[3], i as f32, "origin.x of record {i}");
            assert_eq!(&record[12..16], &[1.0, 0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn instanced_handles_are_freed_on_exit_and_drop() {
        let (mut stage, server) = stage_with_server();
        crate_prefab(&mut stage);
        spawn_crates(&mut stage, 3);
        let (scenario, mesh) = {
            let mut s = server.borrow_mut();
            (s.create_scenario(), s.create_mesh())
        };
        let children = parse_children(
            &json!([{
                "name": "Crates",
                "class": "InstancedRenderer3D",
                "prefabs_rendered": ["Crate"],
                "scenario": scenario,
                "lod_levels": [{ "mesh": mesh, "fade_max": 40.0 }]
            }])
            .to_string(),
        )
        .unwrap();
        stage.ready(&children);

        stage.process(0.016);
        assert_eq!(server.borrow().live_instances(), 3);

        assert_eq!(stage.exit_tree(), 3);
        assert_eq!(server.borrow().live_instances(), 0);
        assert_eq!(stage.exit_tree(), 0);

        stage.ready(&children);
        stage.process(0.016);
        assert_eq!(server.borrow().live_instances(), 3);
        drop(stage);
        assert_eq!(server.borrow().live_instances(), 0);
        assert_eq!(server.borrow().rejected_calls(), 0);
    }

    #[test]
    fn missing_server_skips_sync() {
        init_logging();
        let mut stage = Stage::default();
        crate_prefab(&mut stage);
        spawn_crates(&mut stage, 2);
        let children = parse_children(
            r#"[{ "name": "Crates", "class": "MultiMeshRenderer3D", "prefabs_rendered": ["Crate"],
                  "multimesh": { "rid": 4, "transform_format": "3d" } }]"#,
        )
        .unwrap();
        stage.ready(&children);

        stage.progress(0.016);

        let buffers = stage.world.get::<&MultiMeshBuffers>(stage.singleton()).unwrap();
        assert!(buffers.0[&Rid(4)].is_empty());
    }

    #[test]
    fn progress_tick_selects_the_callback() {
        let mut stage = Stage::default();
        stage.process(0.016);
        stage.physics_process(0.016);
        assert_eq!(stage.tick_count(), 1);

        stage.set_progress_tick(ProgressTick::Physics);
        stage.process(0.016);
        stage.physics_process(0.016);
        assert_eq!(stage.tick_count(), 2);

        stage.set_progress_tick(ProgressTick::Manual);
        stage.process(0.016);
        stage.physics_process(0.016);
        stage.progress(0.016);
        assert_eq!(stage.tick_count(), 3);
    }

    #[test]
    fn systems_by_name() {
        let mut stage = Stage::default();
        crate_prefab(&mut stage);

        let params = json!({ "prefab": "Crate", "components": { "Position3D": [0.0, 4.0, 0.0] } });
        stage.run_system(names::systems::PREFAB_INSTANTIATION, Some(&params)).unwrap();
        stage.run_system(names::systems::PREFAB_INSTANTIATION, Some(&json!({}))).unwrap();

        let crate_prefab = prefab::lookup(&stage.world, "Crate").unwrap();
        let instances = stage
            .world
            .query::<hecs::Entity>()
            .iter()
            .filter(|e| prefab::is_a(&stage.world, *e, crate_prefab))
            .count();
        assert_eq!(instances, 1);

        stage.enable_system(names::systems::TRANSFORM_UPDATE_3D, false).unwrap();
        assert!(matches!(
            stage.enable_system("stagehand::Nope", true),
            Err(StageError::SystemNotFound(_))
        ));
        assert!(stage.run_system("stagehand::Nope", None).is_err());
    }

    fn announce(ctx: &mut SystemContext) {
        let entities: Vec<hecs::Entity> = ctx.world.query::<(hecs::Entity, &Transform3D)>().without::<&Prefab>().iter().map(|(e, _)| e).collect();
        for entity in entities {
            signal::emit_signal(ctx.world, entity, "moved", Map::new());
        }
    }

    #[test]
    fn signals_raised_during_progress_reach_the_host() {
        let mut stage = Stage::default();
        crate_prefab(&mut stage);
        let ids = spawn_crates(&mut stage, 2);
        stage.pipeline.add("test::Announce", SystemKind::Phase(Phase::PostRender), announce);

        stage.progress(0.016);
        let signals = stage.drain_signals();
        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|s| s.name == "moved" && ids.contains(&s.entity)));
        assert!(stage.drain_signals().is_empty());
    }

    #[cfg(feature = "dev-tools")]
    #[test]
    fn debug_counts_include_prefabs_and_singleton() {
        let mut stage = Stage::default();
        assert_eq!(stage.debug_entity_count(), 3);
        crate_prefab(&mut stage);
        spawn_crates(&mut stage, 2);
        assert_eq!(stage.debug_entity_count(), 6);
        assert_eq!(stage.debug_renderer_summary(), Value::Null);
    }
}
