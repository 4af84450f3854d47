//! Structured error types for the module core.
//!
//! # The Error Boundary Rule
//!
//! Recoverable failures (a source that is down, a key that is missing) are
//! absorbed at the lowest level that understands them and never reach here as
//! errors at all. What remains are:
//!
//! - **Contract violations** ([`EmitError::UndeclaredEventType`], panics):
//!   programming defects, propagated as aborting errors
//! - **Module failures** ([`ModuleError::Source`], [`ModuleError::Other`]):
//!   logged by the runner, the scan moves on
//! - **Setup errors** ([`RegistryError`], [`ConfigError`]): reported before
//!   any event is dispatched

use thiserror::Error;

use crate::event::EventType;

/// Errors raised while emitting an event.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Module emitted a type it did not declare in `produced_events`
    #[error("module '{module}' emitted undeclared event type {event_type}")]
    UndeclaredEventType {
        module: String,
        event_type: EventType,
    },

    /// The orchestrator stopped receiving events
    #[error("event queue closed")]
    QueueClosed,
}

/// Errors returned from module callbacks.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Emission failed
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// Module configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// External source failed outside the query pipeline (e.g. ping)
    #[error("source error: {0}")]
    Source(String),

    /// Module callback panicked
    #[error("module panicked: {0}")]
    Panicked(String),

    /// Any other module-specific failure
    #[error("module error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ModuleError {
    /// Wrap any error as a module failure.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }

    /// Whether this error is a programming defect in the module.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Emit(EmitError::UndeclaredEventType { .. }) | Self::Panicked(_)
        )
    }
}

/// Errors raised when registering modules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Module metadata has an empty name
    #[error("module name must not be empty")]
    EmptyName,

    /// Another module with this name is already registered
    #[error("module already registered: {name}")]
    DuplicateModule { name: String },

    /// Scan module declares no watched event types
    #[error("module '{name}' watches no event types")]
    NoWatchedEvents { name: String },

    /// Produced types must be concrete
    #[error("module '{name}' declares wildcard produced event type")]
    WildcardProduced { name: String },
}

/// Errors raised when loading or scoping configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config document is not valid JSON
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A module's section does not match its typed config
    #[error("invalid config for {namespace}.{name}: {source}")]
    Invalid {
        namespace: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for module callbacks.
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;
