//! Error type for the scripting-facing stage API.
//!
//! Render synchronization never returns errors; it logs and skips. These
//! variants cover the calls a host script makes by name.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("no component named '{0}' is registered")]
    UnknownComponent(String),
    #[error("entity {0} is not alive")]
    EntityNotAlive(u64),
    #[error("entity {entity} has no '{component}' component")]
    MissingComponent { component: String, entity: u64 },
    #[error("'{component}' is a singleton and can only be accessed with entity id 0, got {entity}")]
    SingletonOnly { component: String, entity: u64 },
    #[error("cannot convert value for component '{component}': {source}")]
    Conversion {
        component: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("prefab '{0}' not found")]
    PrefabNotFound(String),
    #[error("prefab definition has an empty name")]
    UnnamedPrefab,
    #[error("system '{0}' not found")]
    SystemNotFound(String),
    #[error("invalid parameters for '{system}': {reason}")]
    InvalidParameters { system: String, reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StageResult<T> = Result<T, StageError>;
