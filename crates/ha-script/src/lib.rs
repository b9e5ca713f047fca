//! Service call actions
//!
//! An action is the stored form of a service call:
//!
//! ```yaml
//! action: number.set_value
//! target:
//!   entity_id: number.tv_media_seek
//! data:
//!   value: "{{ seek_position }}"
//! metadata: {}
//! ```
//!
//! [`call_from_config`] renders its templates against a set of variables and
//! issues the call through the service registry.

pub mod action;
mod service;

pub use action::{ServiceActionConfig, Target};
pub use service::{call_from_config, ScriptError};
