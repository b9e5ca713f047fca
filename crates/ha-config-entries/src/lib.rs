//! Config Entries
//!
//! Config entries represent individual integration instances. This crate
//! manages their lifecycle (setup, unload, reload), persists them in
//! `.storage/core.config_entries`, and runs the config and options flows
//! that create and edit them.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`IntegrationHandler`] - Per-domain setup/unload
//! - [`FlowManager`] - Config and options flows in progress

pub mod entry;
pub mod flow;
pub mod manager;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};

pub use flow::{
    FlowContext, FlowError, FlowHandler, FlowManager, FlowOutcome, FlowResult, FlowResultType,
    FormField,
};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult,
    IntegrationHandler, UpdateListenerId, STORAGE_KEY,
};
