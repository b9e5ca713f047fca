//! In-process broker

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::client::{MqttClient, Router, Subscription};
use crate::error::MqttResult;
use crate::message::{MqttMessage, QoS};
use crate::topic::{topic_matches, validate_filter, validate_topic};

/// Delivers publishes straight to local subscribers and keeps retained
/// messages. A [`LoopbackMqtt::recording`] broker also keeps everything
/// published for inspection.
pub struct LoopbackMqtt {
    router: Arc<Router>,
    retained: DashMap<String, MqttMessage>,
    published: Option<Mutex<Vec<MqttMessage>>>,
}

impl Default for LoopbackMqtt {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackMqtt {
    pub fn new() -> Self {
        Self {
            router: Router::new(None),
            retained: DashMap::new(),
            published: None,
        }
    }

    /// A broker that records every publish; see [`LoopbackMqtt::published`]
    pub fn recording() -> Self {
        Self {
            published: Some(Mutex::new(Vec::new())),
            ..Self::new()
        }
    }

    /// Messages published so far, oldest first. Always empty unless
    /// created with [`LoopbackMqtt::recording`].
    pub fn published(&self) -> Vec<MqttMessage> {
        self.published
            .as_ref()
            .map(|log| log.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    /// Published messages on `topic`
    pub fn published_to(&self, topic: &str) -> Vec<MqttMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    pub fn clear_published(&self) {
        if let Some(log) = &self.published {
            log.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    /// Deliver a message as if it came from another client. Not recorded.
    pub fn inject(&self, topic: &str, payload: &str) -> usize {
        self.router.dispatch(&MqttMessage::new(topic, payload))
    }

    pub fn subscription_count(&self, filter: &str) -> usize {
        self.router
            .filters()
            .iter()
            .filter(|(f, _)| f == filter)
            .count()
    }
}

#[async_trait]
impl MqttClient for LoopbackMqtt {
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<Subscription> {
        validate_filter(filter)?;
        let subscription = self.router.add(filter, qos);
        for retained in self.retained.iter() {
            if topic_matches(filter, retained.key()) {
                self.router.deliver_to(subscription.id(), retained.value());
            }
        }
        debug!(%filter, "loopback subscribe");
        Ok(subscription)
    }

    async fn publish(&self, topic: &str, payload: &str, qos: QoS, retain: bool) -> MqttResult<()> {
        validate_topic(topic)?;
        let message = MqttMessage::new(topic, payload)
            .with_qos(qos)
            .retained(retain);
        if retain {
            if payload.is_empty() {
                self.retained.remove(topic);
            } else {
                self.retained.insert(topic.to_string(), message.clone());
            }
        }
        if let Some(log) = &self.published {
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());
        }
        self.router.dispatch(&message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber_and_is_recorded() {
        let mqtt = LoopbackMqtt::recording();
        let mut sub = mqtt
            .subscribe("yan/tv/command/#", QoS::AtLeastOnce)
            .await
            .unwrap();

        mqtt.publish(
            "yan/tv/command/media_load_url",
            r#"{"url":"http://x/a.mp4"}"#,
            QoS::AtLeastOnce,
            false,
        )
        .await
        .unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.topic, "yan/tv/command/media_load_url");
        let payload: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(payload["url"], "http://x/a.mp4");
        assert_eq!(mqtt.published_to("yan/tv/command/media_load_url").len(), 1);
    }

    #[tokio::test]
    async fn test_retained_message_delivered_on_subscribe() {
        let mqtt = LoopbackMqtt::new();
        mqtt.publish("yan/tv/status/media_queue", r#"{"playlist":[]}"#, QoS::AtLeastOnce, true)
            .await
            .unwrap();

        let mut sub = mqtt
            .subscribe("yan/tv/status/media_queue", QoS::AtLeastOnce)
            .await
            .unwrap();
        assert_eq!(sub.try_recv().unwrap().payload, r#"{"playlist":[]}"#);

        mqtt.publish("yan/tv/status/media_queue", "", QoS::AtLeastOnce, true)
            .await
            .unwrap();
        drop(sub);
        let mut sub = mqtt
            .subscribe("yan/tv/status/media_queue", QoS::AtLeastOnce)
            .await
            .unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let mqtt = LoopbackMqtt::new();
        let sub = mqtt.subscribe("a/b", QoS::AtMostOnce).await.unwrap();
        assert_eq!(mqtt.inject("a/b", "1"), 1);
        drop(sub);
        assert_eq!(mqtt.inject("a/b", "2"), 0);
        assert_eq!(mqtt.subscription_count("a/b"), 0);
    }

    #[tokio::test]
    async fn test_invalid_topics_rejected() {
        let mqtt = LoopbackMqtt::recording();
        assert!(mqtt.subscribe("a/#/b", QoS::AtMostOnce).await.is_err());
        assert!(mqtt.publish("a/+", "x", QoS::AtMostOnce, false).await.is_err());
        assert!(mqtt.published().is_empty());
    }

    #[tokio::test]
    async fn test_retained_replay_reaches_only_new_subscription() {
        let mqtt = LoopbackMqtt::new();
        mqtt.publish("yan/tv/status/playlists/available", "{}", QoS::AtLeastOnce, true)
            .await
            .unwrap();

        let mut wide = mqtt.subscribe("yan/tv/#", QoS::AtLeastOnce).await.unwrap();
        let mut exact = mqtt
            .subscribe("yan/tv/status/playlists/available", QoS::AtLeastOnce)
            .await
            .unwrap();

        assert!(wide.try_recv().is_some());
        assert!(wide.try_recv().is_none());
        assert!(exact.try_recv().is_some());
        assert!(exact.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_plain_broker_keeps_no_log() {
        let mqtt = LoopbackMqtt::new();
        mqtt.publish("yan/tv/command/media_get_playlists", "", QoS::AtLeastOnce, false)
            .await
            .unwrap();
        assert!(mqtt.published().is_empty());
    }
}
