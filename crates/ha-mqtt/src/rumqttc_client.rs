//! Broker connection over `rumqttc`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{MqttClient, Router, Subscription};
use crate::config::MqttConfig;
use crate::error::MqttResult;
use crate::message::{MqttMessage, QoS};
use crate::topic::{validate_filter, validate_topic};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 100;

pub struct RumqttcClient {
    client: AsyncClient,
    router: Arc<Router>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RumqttcClient {
    /// Connect to the broker named in `config`. The connection is driven by
    /// a background task that reconnects on error and stops when
    /// `shutdown` is cancelled.
    pub fn connect(config: &MqttConfig, shutdown: CancellationToken) -> Arc<Self> {
        let host = config.host.clone().unwrap_or_else(|| "localhost".to_string());
        let mut options = MqttOptions::new(&config.client_id, &host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let unsubscriber = client.clone();
        let router = Router::new(Some(Box::new(move |filter: &str| {
            if let Err(e) = unsubscriber.try_unsubscribe(filter) {
                tracing::warn!(%filter, "MQTT unsubscribe failed: {}", e);
            }
        })));
        let connected = Arc::new(AtomicBool::new(false));

        tracing::info!("MQTT connecting to {}:{}...", host, config.port);
        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            router.clone(),
            connected.clone(),
            shutdown.clone(),
        ));

        Arc::new(Self {
            client,
            router,
            connected,
            shutdown,
            task,
        })
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("MQTT disconnect: {}", e);
        }
        self.shutdown.cancel();
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    router: Arc<Router>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("MQTT event loop shutting down");
                break;
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let message = MqttMessage {
                            topic: publish.topic.clone(),
                            payload: String::from_utf8_lossy(&publish.payload).to_string(),
                            qos: publish.qos.into(),
                            retain: publish.retain,
                        };
                        router.dispatch(&message);
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        tracing::info!("MQTT connected (code: {:?})", ack.code);
                        connected.store(true, Ordering::SeqCst);
                        // clean sessions forget subscriptions across reconnects
                        for (filter, qos) in router.filters() {
                            if let Err(e) = client.subscribe(&filter, qos.into()).await {
                                tracing::error!(%filter, "MQTT resubscribe failed: {}", e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        tracing::warn!("MQTT disconnected");
                        connected.store(false, Ordering::SeqCst);
                    }
                    Err(e) => {
                        tracing::error!("MQTT error: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<Subscription> {
        validate_filter(filter)?;
        let first = !self.router.has_filter(filter);
        let subscription = self.router.add(filter, qos);
        if first && self.is_connected() {
            self.client.subscribe(filter, qos.into()).await?;
        }
        Ok(subscription)
    }

    async fn publish(&self, topic: &str, payload: &str, qos: QoS, retain: bool) -> MqttResult<()> {
        validate_topic(topic)?;
        self.client
            .publish(topic, qos.into(), retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
