//! MQTT
//!
//! [`MqttClient`] is what integrations talk to. Two implementations exist:
//!
//! - [`RumqttcClient`] - a broker connection driven by `rumqttc`
//! - [`LoopbackMqtt`] - an in-process broker, used when no broker is
//!   configured and in tests
//!
//! Subscriptions are plain receivers; dropping one unsubscribes.

mod client;
mod config;
mod error;
mod loopback;
mod message;
mod rumqttc_client;
mod topic;

pub use client::{MqttClient, SharedMqtt, Subscription};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use loopback::LoopbackMqtt;
pub use message::{MqttMessage, QoS};
pub use rumqttc_client::RumqttcClient;
pub use topic::{topic_matches, validate_filter, validate_topic};
