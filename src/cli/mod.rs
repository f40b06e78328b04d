//! CLI module
//!
//! Provides:
//! - Argument parsing (`serve`, `check-drift`, `retrain`, `generate-data`, `simulate`)
//! - Tracing setup (console plus optional rolling files)
//! - Component wiring from a [`ServiceConfig`](fraudguard_core::ServiceConfig)
//! - Command dispatch

pub mod args;
pub mod components;
pub mod dispatch;
pub mod logging;

// Re-exports
pub use args::{Cli, Commands, LogFormat, SyntheticArgs};
pub use components::Components;
pub use dispatch::{exit_code, generator_settings, run};
pub use logging::init_tracing;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Artifact store error: {0}")]
    Store(#[from] fraudguard_core::StoreError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] fraudguard_core::LifecycleError),

    #[error("Retraining failed: {0}")]
    Retrain(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;
