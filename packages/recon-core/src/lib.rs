//! # recon-core
//!
//! The module-execution core of a recon scan: events, the module contract,
//! emission with provenance, and the filter that decides what output modules
//! get to see.
//!
//! ## Flow
//!
//! ```text
//! seed Event ──► ModuleRegistry::dispatch ──► ModuleRunner::deliver ──► Module::handle_event
//!                                                                          │
//!                                                                 Emitter::emit_event
//!                                                                          │
//!                       OutputDispatcher::dispatch ◄── EventReceiver ◄── EventQueue
//!                                │
//!                        output_filter (pre-check, dispatch)
//!                                │
//!                     OutputModule::handle_event
//! ```
//!
//! ## Contracts
//!
//! - A module only emits the event types it declared; anything else is an
//!   [`EmitError::UndeclaredEventType`] and aborts the scan
//! - An emission that repeats its source (same value, same type) is a no-op
//! - Ordinary module failures are logged and never stop the scan
//! - Output modules accept duplicates and read config from
//!   `output_modules.<name>`
//!
//! The scan loop itself (what to do with received events, when to stop) is
//! left to the caller.

// Core modules
mod emit;
mod error;
mod event;
mod filter;
mod module;
mod output;
mod queue;
mod registry;
mod runner;

// Scan configuration
pub mod config;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// End-to-end dispatch tests (test-only)
#[cfg(test)]
mod dispatch_tests;

// Re-export event types
pub use event::{Event, EventFlags, EventId, EventType, SourceRef, TARGET_MODULE, TARGET_TAG};

// Re-export error types
pub use error::{ConfigError, EmitError, ModuleError, ModuleResult, RegistryError};

// Re-export module contract
pub use emit::Emitter;
pub use module::{Module, ModuleFlag, ModuleMeta, SetupOutcome};

// Re-export filter and output types
pub use filter::{
    output_filter, ControlSignal, Dispatched, FilterDecision, FilterPhase, RejectReason,
};
pub use output::{OutputDispatcher, OutputModule};

// Re-export runtime types
pub use queue::{EventQueue, EventReceiver};
pub use registry::ModuleRegistry;
pub use runner::{Delivery, ModuleRunner};

// Re-export config types
pub use config::{empty_string_as_none, ConfigNamespace, ScanConfig, ScanSettings};

// Re-export commonly used external types
pub use async_trait::async_trait;
