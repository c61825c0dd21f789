//! Named systems run in phase order every tick.
//!
//! Systems are plain function pointers registered explicitly at stage
//! construction. Within a phase they run in registration order. Systems can
//! be disabled by name, and any system can be run manually with parameters.

use hecs::{Entity, World};
use serde_json::Value;

use crate::error::{StageError, StageResult};
use crate::registry::ComponentRegistry;
use crate::rendering::server::RenderingServer;

/// Execution phases, in tick order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    OnEarlyUpdate,
    OnUpdate,
    OnLateUpdate,
    PreRender,
    OnRender,
    PostRender,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::OnEarlyUpdate,
        Phase::OnUpdate,
        Phase::OnLateUpdate,
        Phase::PreRender,
        Phase::OnRender,
        Phase::PostRender,
    ];
}

/// When a system runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    /// Every tick, in the given phase.
    Phase(Phase),
    /// Only through [`Pipeline::run`].
    OnDemand,
}

/// Everything a system can touch while it runs.
pub struct SystemContext<'a> {
    pub world: &'a mut World,
    /// Entity holding the singleton components.
    pub singleton: Entity,
    pub components: &'a ComponentRegistry,
    pub server: Option<&'a mut dyn RenderingServer>,
    /// Parameters of a manual run; `None` during ticks.
    pub params: Option<&'a Value>,
    pub delta_time: f32,
}

pub type SystemFn = fn(&mut SystemContext);

struct StoredSystem {
    name: &'static str,
    kind: SystemKind,
    run: SystemFn,
    enabled: bool,
}

#[derive(Default)]
pub struct Pipeline {
    /// Registration order.
    systems: Vec<StoredSystem>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system. A second system with the same name is ignored.
    pub fn add(&mut self, name: &'static str, kind: SystemKind, run: SystemFn) {
        if self.systems.iter().any(|s| s.name == name) {
            log::warn!("System '{name}' is already registered; ignoring duplicate");
            return;
        }
        self.systems.push(StoredSystem {
            name,
            kind,
            run,
            enabled: true,
        });
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.systems.iter().map(|s| s.name)
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.find(name).ok().map(|s| s.enabled)
    }

    pub fn kind(&self, name: &str) -> Option<SystemKind> {
        self.find(name).ok().map(|s| s.kind)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> StageResult<()> {
        let system = self
            .systems
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| StageError::SystemNotFound(name.to_owned()))?;
        if system.enabled != enabled {
            log::debug!("System '{name}' {}", if enabled { "enabled" } else { "disabled" });
        }
        system.enabled = enabled;
        Ok(())
    }

    /// Run every enabled phase system once, phase by phase.
    pub fn progress(&self, ctx: &mut SystemContext) {
        for phase in Phase::ALL {
            for system in self
                .systems
                .iter()
                .filter(|s| s.enabled && s.kind == SystemKind::Phase(phase))
            {
                (system.run)(ctx);
            }
        }
    }

    /// Run one system now, whether or not it is enabled.
    pub fn run(&self, name: &str, ctx: &mut SystemContext) -> StageResult<()> {
        let system = self.find(name)?;
        (system.run)(ctx);
        Ok(())
    }

    fn find(&self, name: &str) -> StageResult<&StoredSystem> {
        self.systems
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StageError::SystemNotFound(name.to_owned()))
    }
}
