//! Template rendering
//!
//! A minijinja environment extended with entity-state access:
//!
//! - `states('sensor.title')`, `states.sensor.title.state`
//! - `is_state('switch.mute', 'on')`, `state_attr('number.volume', 'max')`
//! - `has_value('sensor.title')`
//!
//! and the filters `float`, `int`, `round`, `slugify`, `to_json`,
//! `from_json` and `regex_replace`.
//!
//! [`TemplateEngine::render_value`] walks a JSON value and renders every
//! templated string leaf, turning results that look like JSON literals back
//! into typed values. Action payloads such as `{"value": "{{ seek_position }}"}`
//! therefore reach the service as numbers.

mod engine;
mod error;
mod filters;
mod states;

pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use states::StatesObject;
