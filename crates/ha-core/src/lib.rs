//! Core types shared by every crate in the workspace
//!
//! Entity identifiers, state objects, events and service calls. Nothing in
//! here performs I/O; the bus, state machine and service registry build on
//! these types.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventOrigin, EventType};
pub use service_call::{ServiceCall, SupportsResponse};
pub use state::State;

/// State written when an entity has no meaningful value yet
pub const STATE_UNKNOWN: &str = "unknown";

/// State written when the backing device cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

/// Event types fired by the runtime itself
pub mod events {
    use super::*;

    pub const STATE_CHANGED: &str = "state_changed";
    pub const CALL_SERVICE: &str = "call_service";
    pub const HOMEASSISTANT_STOP: &str = "homeassistant_stop";

    /// Payload of `state_changed`. `old_state` is `None` for a new entity,
    /// `new_state` is `None` when the entity was removed.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Payload of `call_service`
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct CallServiceData {
        pub domain: String,
        pub service: String,
        pub service_data: serde_json::Value,
    }

    impl EventData for CallServiceData {
        fn event_type() -> &'static str {
            CALL_SERVICE
        }
    }
}
