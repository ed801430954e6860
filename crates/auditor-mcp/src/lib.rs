//! MCP worker integration for the auditor agent.
//!
//! This crate provides:
//! - worker roster config loading (`config`)
//! - the JSON-RPC / MCP wire types (`protocol`)
//! - the per-worker process bridge (`bridge`)
//! - schema compilation and argument validation (`schema`)
//! - the flat tool namespace across workers (`registry`)
//! - an in-memory scripted worker for tests (`testing`)

pub mod bridge;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod testing;

pub use bridge::WorkerBridge;
pub use config::{interpolate_env_vars, load_worker_config, WorkerConfig};
pub use error::{RegistryError, WorkerError};
pub use registry::{connect_workers, ToolRegistry};
pub use schema::{
    compile_input_schema, validate_arguments, ParamKind, ParameterSpec, ToolDescriptor,
    ValidationError,
};
