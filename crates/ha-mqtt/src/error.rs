use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("invalid topic filter: {0}")]
    InvalidFilter(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

pub type MqttResult<T> = Result<T, MqttError>;
