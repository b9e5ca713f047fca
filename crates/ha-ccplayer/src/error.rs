use ha_core::EntityIdError;
use ha_mqtt::MqttError;
use ha_service_registry::ServiceError;
use thiserror::Error;

use crate::browse::BrowseError;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Mqtt(#[from] MqttError),

    #[error(transparent)]
    Browse(#[from] BrowseError),

    #[error("invalid player entity id: {0}")]
    EntityId(#[from] EntityIdError),
}

pub type PlayerResult<T> = Result<T, PlayerError>;
