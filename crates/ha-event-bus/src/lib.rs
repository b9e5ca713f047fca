//! Event bus
//!
//! Every event type gets its own `tokio::sync::broadcast` channel, created on
//! first subscription. A separate channel receives every event regardless of
//! type. On top of the raw receivers, [`EventBus::listen`] runs an async
//! callback per event on a spawned task and hands back a [`ListenerHandle`]
//! that stops the task when removed or dropped.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::{Context, Event, EventData, EventType};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct EventBus {
    channels: DashMap<EventType, broadcast::Sender<Event<Value>>>,
    all: broadcast::Sender<Event<Value>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        Self {
            channels: DashMap::new(),
            all,
            capacity,
        }
    }

    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event<Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "subscribe");
        self.channels
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(&self) -> TypedEventReceiver<T> {
        TypedEventReceiver {
            rx: self.subscribe(T::event_type()),
            _marker: PhantomData,
        }
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<Value>> {
        self.all.subscribe()
    }

    pub fn fire(&self, event: Event<Value>) {
        debug!(event_type = %event.event_type, "firing event");
        if let Some(tx) = self.channels.get(&event.event_type) {
            // A send error only means nobody is listening right now.
            let _ = tx.send(event.clone());
        }
        let _ = self.all.send(event);
    }

    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        match serde_json::to_value(&data) {
            Ok(value) => self.fire(Event::new(T::event_type(), value, context)),
            Err(err) => warn!(event_type = T::event_type(), %err, "dropping unserializable event"),
        }
    }

    /// Run `handler` for every event of `event_type` until the returned
    /// handle is removed or dropped.
    ///
    /// The subscription exists before this returns, so events fired right
    /// after the call are delivered. Handlers for one listener run
    /// sequentially in firing order.
    pub fn listen<F, Fut>(&self, event_type: impl Into<EventType>, handler: F) -> ListenerHandle
    where
        F: Fn(Event<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event_type = event_type.into();
        let mut rx = self.subscribe(event_type.clone());
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(event_type = %event_type, skipped, "listener lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        ListenerHandle { task: Some(task) }
    }

    /// Number of event types that have had at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a [`EventBus::listen`] task alive. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn remove(mut self) {
        self.stop();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receiver that skips events whose payload does not deserialize as `T`.
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event<Value>>,
    _marker: PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = T::deserialize(&event.data) {
                return Ok(Event {
                    event_type: event.event_type,
                    data,
                    origin: event.origin,
                    time_fired: event.time_fired,
                    context: event.context,
                });
            }
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;
