//! Events raised inside systems for the host script.
//!
//! Systems queue signals on the singleton entity while the world progresses;
//! the host drains the queue after the tick, so delivery never happens in the
//! middle of a system.

use hecs::{Entity, World};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::components::Singleton;

/// One queued signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub name: String,
    /// Id of the entity that raised it, as used by the scripting API.
    pub entity: u64,
    pub data: Map<String, Value>,
}

/// Signals raised since the host last drained them. Lives on the singleton.
#[derive(Debug, Default)]
pub struct PendingSignals(pub Vec<Signal>);

/// Queue a signal from `source`.
///
/// Only borrows the queue itself, so it can be called while other queries are
/// live. Returns `false` if the world has no queue.
pub fn emit_signal(world: &World, source: Entity, name: &str, data: Map<String, Value>) -> bool {
    let mut query = world.query::<&mut PendingSignals>().with::<&Singleton>();
    let Some(queue) = query.iter().next() else {
        log::warn!("Signal '{name}' dropped: no signal queue in this world");
        return false;
    };
    queue.0.push(Signal {
        name: name.to_owned(),
        entity: source.to_bits().get(),
        data,
    });
    true
}

/// Take every queued signal, oldest first.
pub fn drain_signals(world: &World) -> Vec<Signal> {
    let mut query = world.query::<&mut PendingSignals>().with::<&Singleton>();
    match query.iter().next() {
        Some(queue) => std::mem::take(&mut queue.0),
        None => Vec::new(),
    }
}
