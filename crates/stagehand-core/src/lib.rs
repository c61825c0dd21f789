use std::ptr::addr_of_mut;

use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;

pub mod components;
pub mod config;
pub mod error;
pub mod host;
pub mod names;
pub mod pipeline;
pub mod prefab;
pub mod registry;
pub mod rendering;
pub mod scene;
pub mod signal;
pub mod stage;
pub mod systems;

use config::{ProgressTick, StageConfig};
use error::StageResult;
use host::JsRenderingServer;
use prefab::PrefabDefinition;
use stage::Stage;

static mut STAGE: Option<Stage> = None;

/// Run `f` against the stage, or return `fallback` if it was never created.
///
/// Rendering server callbacks must not re-enter these exports.
fn with_stage<R>(fallback: R, f: impl FnOnce(&mut Stage) -> R) -> R {
    // SAFETY: wasm32 is single-threaded and the host never re-enters while
    // `f` runs, so this is the only live reference to the stage.
    unsafe {
        match &mut *addr_of_mut!(STAGE) {
            Some(stage) => f(stage),
            None => {
                log::warn!("Stage used before stage_init");
                fallback
            }
        }
    }
}

/// Log a failed call and collapse it to `None`.
fn report<T>(call: &str, result: StageResult<T>) -> Option<T> {
    result.map_err(|err| log::warn!("{call}: {err}")).ok()
}

/// Parse an optional JSON object. Blank input and `null` are `None`.
fn parse_object(json: &str) -> StageResult<Option<Map<String, Value>>> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str(json)?)
}

/// Create the stage. Called once by the host node. `config_json` may be empty.
#[wasm_bindgen]
pub fn stage_init(config_json: &str) {
    #[cfg(target_arch = "wasm32")]
    let _ = console_log::init_with_level(log::Level::Info);

    let config = report("stage_init", StageConfig::from_json(config_json)).unwrap_or_default();
    install_stage(Stage::new(config));
}

/// Make `stage` the current stage. A previous stage is dropped, which frees
/// the draw instances it still owns.
fn install_stage(stage: Stage) {
    // SAFETY: wasm32 is single-threaded; no concurrent access.
    let previous = unsafe { (*addr_of_mut!(STAGE)).replace(stage) };
    if previous.is_some() {
        log::debug!("Replacing the existing stage");
    }
}

/// Hand the stage the host rendering server.
#[wasm_bindgen]
pub fn stage_set_rendering_server(server: JsRenderingServer) {
    with_stage((), |stage| stage.set_rendering_server(Box::new(server)));
}

/// The node entered the tree. `children_json` lists its direct children.
/// Returns the number of renderers registered.
#[wasm_bindgen]
pub fn stage_ready(children_json: &str) -> u32 {
    with_stage(0, |stage| {
        let Some(children) = report("stage_ready", scene::parse_children(children_json).map_err(Into::into)) else {
            return 0;
        };
        u32::try_from(stage.ready(&children)).unwrap_or(u32::MAX)
    })
}

/// Rendering-frame callback.
#[wasm_bindgen]
pub fn stage_process(delta: f32) {
    with_stage((), |stage| stage.process(delta));
}

/// Physics-step callback.
#[wasm_bindgen]
pub fn stage_physics_process(delta: f32) {
    with_stage((), |stage| stage.physics_process(delta));
}

/// Progress the world once regardless of the configured tick.
#[wasm_bindgen]
pub fn stage_progress(delta: f32) {
    with_stage((), |stage| stage.progress(delta));
}

/// `tick` is one of `"rendering"`, `"physics"` or `"manual"`.
#[wasm_bindgen]
pub fn stage_set_progress_tick(tick: &str) -> bool {
    with_stage(false, |stage| {
        let parsed = serde_json::from_value::<ProgressTick>(Value::String(tick.to_owned()));
        match report("stage_set_progress_tick", parsed.map_err(Into::into)) {
            Some(tick) => {
                stage.set_progress_tick(tick);
                true
            }
            None => false,
        }
    })
}

/// Set a component from JSON. Entity id 0 addresses the singleton.
#[wasm_bindgen]
pub fn stage_set_component(component: &str, entity: u64, value_json: &str) -> bool {
    with_stage(false, |stage| {
        let result = serde_json::from_str::<Value>(value_json)
            .map_err(Into::into)
            .and_then(|value| stage.set_component(component, entity, &value));
        report("stage_set_component", result).is_some()
    })
}

/// Read a component as JSON. Entity id 0 addresses the singleton.
#[wasm_bindgen]
pub fn stage_get_component(component: &str, entity: u64) -> Option<String> {
    with_stage(None, |stage| {
        report("stage_get_component", stage.get_component(component, entity)).map(|v| v.to_string())
    })
}

/// Register a prefab from its JSON definition. Returns its entity id, or 0.
#[wasm_bindgen]
pub fn stage_register_prefab(definition_json: &str) -> u64 {
    with_stage(0, |stage| {
        let result = serde_json::from_str::<PrefabDefinition>(definition_json)
            .map_err(Into::into)
            .and_then(|definition| stage.register_prefab(&definition));
        report("stage_register_prefab", result).unwrap_or(0)
    })
}

/// Instantiate a prefab with optional component overrides. Returns the
/// instance's entity id, or 0.
#[wasm_bindgen]
pub fn stage_instantiate_prefab(prefab: &str, overrides_json: &str) -> u64 {
    with_stage(0, |stage| {
        let result = parse_object(overrides_json)
            .and_then(|overrides| stage.instantiate_prefab(prefab, overrides.as_ref()));
        report("stage_instantiate_prefab", result).unwrap_or(0)
    })
}

#[wasm_bindgen]
pub fn stage_enable_system(system: &str, enabled: bool) -> bool {
    with_stage(false, |stage| {
        report("stage_enable_system", stage.enable_system(system, enabled)).is_some()
    })
}

/// Run a system once with optional JSON parameters.
#[wasm_bindgen]
pub fn stage_run_system(system: &str, params_json: &str) -> bool {
    with_stage(false, |stage| {
        let result = parse_object(params_json).and_then(|params| {
            let params = params.map(Value::Object);
            stage.run_system(system, params.as_ref())
        });
        report("stage_run_system", result).is_some()
    })
}

#[wasm_bindgen]
pub fn stage_set_world_configuration(configuration_json: &str) -> bool {
    with_stage(false, |stage| {
        let result = parse_object(configuration_json);
        match report("stage_set_world_configuration", result) {
            Some(configuration) => {
                stage.set_world_configuration(configuration.unwrap_or_default());
                true
            }
            None => false,
        }
    })
}

#[wasm_bindgen]
pub fn stage_get_world_configuration() -> String {
    with_stage(String::from("{}"), |stage| {
        Value::Object(stage.world_configuration()).to_string()
    })
}

/// Signals raised since the last call, as a JSON array of
/// `{ "name", "entity", "data" }` objects.
#[wasm_bindgen]
pub fn stage_drain_signals() -> String {
    with_stage(String::from("[]"), |stage| {
        let signals = stage.drain_signals();
        report("stage_drain_signals", serde_json::to_string(&signals).map_err(Into::into))
            .unwrap_or_else(|| String::from("[]"))
    })
}

/// The node left the tree. Returns the number of draw instances freed.
#[wasm_bindgen]
pub fn stage_exit_tree() -> u32 {
    with_stage(0, |stage| u32::try_from(stage.exit_tree()).unwrap_or(u32::MAX))
}

/// Returns the number of times the world has progressed.
#[wasm_bindgen]
pub fn stage_tick_count() -> u64 {
    // SAFETY: wasm32 is single-threaded; read-only access.
    unsafe {
        match &*addr_of_mut!(STAGE) {
            Some(s) => s.tick_count(),
            None => 0,
        }
    }
}

#[cfg(feature = "dev-tools")]
#[wasm_bindgen]
pub fn stage_debug_renderer_summary() -> String {
    with_stage(String::from("null"), |stage| stage.debug_renderer_summary().to_string())
}

#[cfg(feature = "dev-tools")]
#[wasm_bindgen]
pub fn stage_debug_entity_count() -> u32 {
    with_stage(0, |stage| stage.debug_entity_count())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::rendering::headless::HeadlessServer;
    use serde_json::json;

    #[test]
    fn reinitialising_frees_the_previous_stage_instances() {
        let server = Rc::new(RefCell::new(HeadlessServer::new()));
        let (scenario, mesh) = {
            let mut s = server.borrow_mut();
            (s.create_scenario(), s.create_mesh())
        };
        let children = json!([{
            "name": "Crates",
            "class": "InstancedRenderer3D",
            "prefabs_rendered": [names::prefabs::ENTITY_3D],
            "scenario": scenario,
            "lod_levels": [{ "mesh": mesh, "fade_max": 50.0 }]
        }])
        .to_string();

        let mut stage = Stage::default();
        stage.set_rendering_server(Box::new(server.clone()));
        install_stage(stage);
        assert_eq!(stage_ready(&children), 1);
        for _ in 0..3 {
            assert_ne!(stage_instantiate_prefab(names::prefabs::ENTITY_3D, ""), 0);
        }
        stage_process(0.016);
        assert_eq!(server.borrow().live_instances(), 3);
        assert_eq!(stage_drain_signals(), "[]");

        stage_init("");
        assert_eq!(server.borrow().live_instances(), 0);
        assert_eq!(server.borrow().freed_instances(), 3);
        assert_eq!(stage_tick_count(), 0);
    }
}
