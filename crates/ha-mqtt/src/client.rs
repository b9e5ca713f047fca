use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::MqttResult;
use crate::message::{MqttMessage, QoS};
use crate::topic::topic_matches;

pub type SharedMqtt = Arc<dyn MqttClient>;

#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Subscribe to `filter`; messages arrive on the returned subscription
    /// until it is dropped.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<Subscription>;

    async fn publish(&self, topic: &str, payload: &str, qos: QoS, retain: bool) -> MqttResult<()>;

    fn is_connected(&self) -> bool;
}

/// Called with a filter once its last subscription is gone
pub(crate) type OnEmpty = Box<dyn Fn(&str) + Send + Sync>;

struct Route {
    filter: String,
    qos: QoS,
    tx: mpsc::UnboundedSender<MqttMessage>,
}

/// Fan-out of incoming messages to subscriptions
pub(crate) struct Router {
    routes: DashMap<u64, Route>,
    next_id: AtomicU64,
    on_empty: Option<OnEmpty>,
}

impl Router {
    pub(crate) fn new(on_empty: Option<OnEmpty>) -> Arc<Self> {
        Arc::new(Self {
            routes: DashMap::new(),
            next_id: AtomicU64::new(1),
            on_empty,
        })
    }

    pub(crate) fn add(self: &Arc<Self>, filter: &str, qos: QoS) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(
            id,
            Route {
                filter: filter.to_string(),
                qos,
                tx,
            },
        );
        Subscription {
            id,
            filter: filter.to_string(),
            rx,
            router: Arc::downgrade(self),
        }
    }

    /// Deliver `message` to each subscription whose filter matches.
    pub(crate) fn dispatch(&self, message: &MqttMessage) -> usize {
        let mut delivered = 0;
        for route in self.routes.iter() {
            if topic_matches(&route.filter, &message.topic) && route.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(topic = %message.topic, delivered, "dispatched MQTT message");
        delivered
    }

    /// Deliver `message` to the one subscription `id`
    pub(crate) fn deliver_to(&self, id: u64, message: &MqttMessage) -> bool {
        self.routes
            .get(&id)
            .is_some_and(|route| route.tx.send(message.clone()).is_ok())
    }

    /// Distinct filters with the highest QoS requested for each
    pub(crate) fn filters(&self) -> Vec<(String, QoS)> {
        let mut filters: Vec<(String, QoS)> = Vec::new();
        for route in self.routes.iter() {
            match filters.iter_mut().find(|(f, _)| *f == route.filter) {
                Some((_, qos)) => *qos = (*qos).max_by_level(route.qos),
                None => filters.push((route.filter.clone(), route.qos)),
            }
        }
        filters
    }

    pub(crate) fn has_filter(&self, filter: &str) -> bool {
        self.routes.iter().any(|r| r.filter == filter)
    }

    fn remove(&self, id: u64) {
        if let Some((_, route)) = self.routes.remove(&id) {
            if !self.has_filter(&route.filter) {
                if let Some(on_empty) = &self.on_empty {
                    on_empty(&route.filter);
                }
            }
        }
    }
}

impl QoS {
    fn max_by_level(self, other: QoS) -> QoS {
        if u8::from(other) > u8::from(self) {
            other
        } else {
            self
        }
    }
}

/// Live subscription to a topic filter
pub struct Subscription {
    id: u64,
    filter: String,
    rx: mpsc::UnboundedReceiver<MqttMessage>,
    router: Weak<Router>,
}

impl Subscription {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Next message, or `None` once the client is gone
    pub async fn recv(&mut self) -> Option<MqttMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MqttMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}
