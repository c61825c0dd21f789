//! Stage configuration, supplied by the host as JSON at init.
//!
//! ```json
//! { "progress_tick": "physics", "world_configuration": { "gravity": 9.8 } }
//! ```
//!
//! Every field is optional.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StageResult;

/// Which host callback advances the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTick {
    /// Every rendered frame (`process`).
    #[default]
    Rendering,
    /// Every fixed-rate physics step (`physics_process`).
    Physics,
    /// Only explicit `progress` calls.
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub progress_tick: ProgressTick,
    /// Mirrored into the `WorldConfiguration` singleton at ready time.
    pub world_configuration: Map<String, Value>,
}

impl StageConfig {
    /// Parse host JSON. Blank input yields the defaults.
    pub fn from_json(json: &str) -> StageResult<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }
}
