//! Reacting to state changes of specific entities

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use ha_core::events::{StateChangedData, STATE_CHANGED};
use ha_event_bus::{EventBus, ListenerHandle};
use tracing::trace;

/// Call `handler` whenever one of `entity_ids` changes state.
///
/// Returns `None` when `entity_ids` is empty; there is nothing to track.
pub fn track_state_change_event<I, S, F, Fut>(
    bus: &EventBus,
    entity_ids: I,
    handler: F,
) -> Option<ListenerHandle>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: Fn(StateChangedData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let tracked: HashSet<String> = entity_ids.into_iter().map(Into::into).collect();
    if tracked.is_empty() {
        return None;
    }
    let tracked = Arc::new(tracked);
    let handler = Arc::new(handler);

    Some(bus.listen(STATE_CHANGED, move |event| {
        let tracked = tracked.clone();
        let handler = handler.clone();
        async move {
            let Some(entity_id) = event.data.get("entity_id").and_then(|v| v.as_str()) else {
                return;
            };
            if !tracked.contains(entity_id) {
                return;
            }
            match serde_json::from_value::<StateChangedData>(event.data) {
                Ok(data) => {
                    trace!(entity_id = %data.entity_id, "tracked entity changed");
                    handler(data).await
                }
                Err(err) => trace!(%err, "malformed state_changed payload"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateMachine;
    use ha_core::Context;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_only_tracked_entities_reach_handler() {
        let bus = Arc::new(EventBus::new());
        let sm = StateMachine::new(bus.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = track_state_change_event(
            &bus,
            ["sensor.title", "number.volume"],
            move |data: StateChangedData| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(data.entity_id.to_string());
                }
            },
        )
        .unwrap();

        sm.set("sensor.other".parse().unwrap(), "x", HashMap::new(), Context::new());
        sm.set("sensor.title".parse().unwrap(), "Movie", HashMap::new(), Context::new());
        sm.set("number.volume".parse().unwrap(), "10", HashMap::new(), Context::new());

        assert_eq!(rx.recv().await.unwrap(), "sensor.title");
        assert_eq!(rx.recv().await.unwrap(), "number.volume");
        assert!(
            tokio::time::timeout(Duration::from_millis(20), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_empty_set_tracks_nothing() {
        let bus = EventBus::new();
        let handle = track_state_change_event(&bus, Vec::<String>::new(), |_| async {});
        assert!(handle.is_none());
    }
}
