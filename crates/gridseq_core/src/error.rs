//! Error type shared by the module registry and the generated module wrappers.
//!
//! Nothing in the DSP itself is fatal: voltages clamp, missing neighbors read
//! as neutral state, and malformed persisted state falls back to defaults.
//! Errors only surface at the host seams — unknown ports, unknown module
//! types, and params JSON that does not match a module's params struct.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("{module_type} with id {id} does not have port {port}")]
    UnknownPort {
        module_type: String,
        id: String,
        port: String,
    },

    #[error("unknown module type '{0}'")]
    UnknownModuleType(String),

    #[error("no module with id '{0}'")]
    UnknownModule(String),

    #[error("invalid params: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModuleError>;
