//! Configuration for the pricing service.
//!
//! - **core**: TOML sections (`[server]`, `[space]`, `[optimizer]`, ...)
//! - **contexts**: JSON context range map and space descriptions

mod contexts;
mod core;

pub use self::core::{
    ContextsConfig, LedgerConfig, OptimizerConfig, RecalibrationConfig, ServerConfig,
    ServiceConfig, SpaceConfig,
};
pub use contexts::{
    load_context_ranges, load_contexts, load_space_descriptions, resolve_contexts,
    ContextRangeEntry, ContextSpec, SpaceDescription,
};
