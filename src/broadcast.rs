//! ==============================================================================
//! broadcast.rs - publish/subscribe fan-out to dashboard clients
//! ==============================================================================
//!
//! purpose:
//!     every subscriber gets its own bounded queue. publishing never waits:
//!     a full queue drops the event for that subscriber only, and queues whose
//!     receiver is gone are pruned. new subscribers only see events published
//!     after they registered.
//!
//! ==============================================================================

use crate::domain::{ForecastBatch, RawReading};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

/// wire format: `{"event": "status", "data": {"msg": "..."}}`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Status { msg: String },
    Reading(RawReading),
    Forecast { points: ForecastBatch },
}

impl Event {
    pub fn status(msg: impl Into<String>) -> Self {
        Event::Status { msg: msg.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Status { .. } => "status",
            Event::Reading(_) => "reading",
            Event::Forecast { .. } => "forecast",
        }
    }
}

type SubscriberMap = HashMap<u64, mpsc::Sender<Event>>;

struct Inner {
    next_id: AtomicU64,
    buffer: usize,
    subscribers: Mutex<SubscriberMap>,
}

#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    /// `buffer` is the per-subscriber queue depth
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, SubscriberMap> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        self.subscribers().insert(id, tx);
        tracing::debug!("[BROADCAST] subscriber {} registered", id);
        Subscription {
            id,
            receiver: rx,
            broadcaster: self.clone(),
        }
    }

    /// explicit removal; also happens when the `Subscription` is dropped
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            tracing::debug!("[BROADCAST] subscriber {} unregistered", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// best-effort delivery to everyone currently registered.
    /// returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("[BROADCAST] subscriber {} lagging, dropped {}", id, event.kind());
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            subscribers.remove(&id);
        }
        delivered
    }
}

pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Event>,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_format() {
        let json = serde_json::to_value(Event::status("Gathering data... 3/24")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "status", "data": {"msg": "Gathering data... 3/24"}})
        );
    }

    #[test]
    fn reading_event_forwards_unknown_sensor_fields() {
        let line = br#"{"temp": 21.5, "humidity": 55.0, "pressure": 1012.3, "rain_analog": 1023, "light_intensity": 600, "aqi": 42, "uv_index": 7}"#;
        let reading = crate::decoder::decode(line).unwrap();
        let json = serde_json::to_value(Event::Reading(reading)).unwrap();
        assert_eq!(json["event"], "reading");
        assert_eq!(json["data"]["uv_index"], 7);
        assert_eq!(json["data"]["temp"], 21.5);
    }

    #[test]
    fn forecast_wire_format_omits_instant() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        let event = Event::Forecast {
            points: vec![crate::domain::ForecastPoint {
                at,
                time: "14:00".into(),
                temp: 21.3,
                precipitation: 12.5,
                aqi: 40,
            }],
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "forecast", "data": {"points": [
                {"time": "14:00", "temp": 21.3, "precipitation": 12.5, "aqi": 40}
            ]}})
        );
    }

    #[tokio::test]
    async fn fans_out_in_publish_order() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_ne!(a.id(), b.id());

        assert_eq!(hub.publish(Event::status("one")), 2);
        assert_eq!(hub.publish(Event::status("two")), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await, Some(Event::status("one")));
            assert_eq!(sub.recv().await, Some(Event::status("two")));
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_history() {
        let hub = Broadcaster::new(8);
        hub.publish(Event::status("before"));
        let mut late = hub.subscribe();
        hub.publish(Event::status("after"));
        assert_eq!(late.recv().await, Some(Event::status("after")));
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_stream() {
        let hub = Broadcaster::new(8);
        let mut sub = hub.subscribe();
        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.publish(Event::status("gone")), 0);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let hub = Broadcaster::new(8);
        let sub = hub.subscribe();
        let _other = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn full_queue_drops_only_for_that_subscriber() {
        let hub = Broadcaster::new(1);
        let mut slow = hub.subscribe();
        assert_eq!(hub.publish(Event::status("a")), 1);
        assert_eq!(hub.publish(Event::status("b")), 0);
        assert_eq!(slow.try_recv(), Some(Event::status("a")));
        assert!(slow.try_recv().is_none());
        assert_eq!(hub.subscriber_count(), 1);
    }
}
