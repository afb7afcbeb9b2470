//! Device telemetry: events, subscriptions and replay records.
//!
//! Everything here is single-threaded. Subscribers are invoked synchronously
//! by whoever publishes, and each callback runs to completion before the
//! next one starts.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::TelemetryError;

/// A telemetry payload: `{ fragment: { series: { value: number, .. } } }`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent(Value);

impl TelemetryEvent {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    pub fn from_json(json: &str) -> Result<Self, TelemetryError> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|e| TelemetryError::Record(e.to_string()))
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// Resolve a `fragment.series` path to its numeric `value`.
    pub fn value_at(&self, path: &str) -> Option<f32> {
        let (fragment, series) = path.split_once('.')?;
        let value = self.0.get(fragment)?.get(series)?.get("value")?.as_f64()? as f32;
        value.is_finite().then_some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

pub type TelemetryCallback = Box<dyn FnMut(&TelemetryEvent)>;

/// Pub/sub capability delivering telemetry for a device.
pub trait TelemetrySubscription {
    fn subscribe(
        &self,
        device_id: &str,
        on_event: TelemetryCallback,
    ) -> Result<SubscriptionHandle, TelemetryError>;

    /// Returns false when the handle was not (or no longer) subscribed.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

struct Subscriber {
    handle: SubscriptionHandle,
    device_id: String,
    callback: Rc<RefCell<TelemetryCallback>>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// In-process telemetry hub. Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct TelemetryHub {
    state: Rc<RefCell<HubState>>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every subscriber of `device_id`, in subscription
    /// order. Returns how many callbacks ran.
    pub fn publish(&self, device_id: &str, event: &TelemetryEvent) -> usize {
        let targets: Vec<(SubscriptionHandle, Rc<RefCell<TelemetryCallback>>)> = self
            .state
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.device_id == device_id)
            .map(|s| (s.handle, Rc::clone(&s.callback)))
            .collect();

        let mut delivered = 0;
        for (handle, callback) in targets {
            // A previous callback may have unsubscribed this one.
            if !self.is_subscribed(handle) {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut callback) => {
                    (*callback)(event);
                    delivered += 1;
                }
                Err(_) => log::warn!(
                    "Dropping re-entrant telemetry delivery for subscription {}",
                    handle.0
                ),
            }
        }
        delivered
    }

    pub fn is_subscribed(&self, handle: SubscriptionHandle) -> bool {
        self.state
            .borrow()
            .subscribers
            .iter()
            .any(|s| s.handle == handle)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }
}

impl TelemetrySubscription for TelemetryHub {
    fn subscribe(
        &self,
        device_id: &str,
        on_event: TelemetryCallback,
    ) -> Result<SubscriptionHandle, TelemetryError> {
        if device_id.trim().is_empty() {
            return Err(TelemetryError::Subscribe {
                device_id: device_id.to_string(),
                reason: "device id is blank".to_string(),
            });
        }

        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let handle = SubscriptionHandle(state.next_id);
        state.subscribers.push(Subscriber {
            handle,
            device_id: device_id.to_string(),
            callback: Rc::new(RefCell::new(on_event)),
        });
        log::info!("Subscribed to telemetry of device {}", device_id);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.handle != handle);
        before != state.subscribers.len()
    }
}

// ============================================================================
// Replay records
// ============================================================================

/// One line of a telemetry replay file.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryRecord {
    pub at: DateTime<Utc>,
    pub device: String,
    pub data: Value,
}

impl TelemetryRecord {
    pub fn event(&self) -> TelemetryEvent {
        TelemetryEvent::new(self.data.clone())
    }

    /// Seconds elapsed since `start`.
    pub fn offset_from(&self, start: DateTime<Utc>) -> f32 {
        (self.at - start).num_milliseconds() as f32 / 1000.0
    }
}

/// Parse JSON-lines replay data, sorted by timestamp. Blank lines are ignored.
pub fn parse_records(jsonl: &str) -> Result<Vec<TelemetryRecord>, TelemetryError> {
    let mut records = jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str::<TelemetryRecord>(line)
                .map_err(|e| TelemetryError::Record(format!("line {}: {}", line_no + 1, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by_key(|r| r.at);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_value_at_resolves_two_level_path() {
        let event = TelemetryEvent::new(json!({
            "c8y_Speed": { "value": { "value": 3, "unit": "m/s" } },
            "c8y_Temp": { "T": { "value": "hot" } }
        }));

        assert_eq!(event.value_at("c8y_Speed.value"), Some(3.0));
        assert_eq!(event.value_at("c8y_Speed.other"), None);
        assert_eq!(event.value_at("c8y_Missing.value"), None);
        assert_eq!(event.value_at("c8y_Temp.T"), None);
        assert_eq!(event.value_at("nodot"), None);
    }

    #[test]
    fn test_publish_reaches_matching_device_only() {
        let hub = TelemetryHub::new();
        let hits = Rc::new(Cell::new(0));

        let counter = Rc::clone(&hits);
        hub.subscribe("dev-1", Box::new(move |_| counter.set(counter.get() + 1)))
            .unwrap();

        let event = TelemetryEvent::new(json!({}));
        assert_eq!(hub.publish("dev-1", &event), 1);
        assert_eq!(hub.publish("dev-2", &event), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = TelemetryHub::new();
        let handle = hub.subscribe("dev", Box::new(|_| {})).unwrap();

        assert!(hub.unsubscribe(handle));
        assert!(!hub.unsubscribe(handle));
        assert!(!hub.unsubscribe(SubscriptionHandle(999)));
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish("dev", &TelemetryEvent::new(json!({}))), 0);
    }

    #[test]
    fn test_unsubscribe_during_delivery() {
        let hub = TelemetryHub::new();
        let second_hits = Rc::new(Cell::new(0));
        let second_handle: Rc<Cell<Option<SubscriptionHandle>>> = Rc::new(Cell::new(None));

        let hub_in_callback = hub.clone();
        let to_remove = Rc::clone(&second_handle);
        hub.subscribe(
            "dev",
            Box::new(move |_| {
                if let Some(handle) = to_remove.get() {
                    hub_in_callback.unsubscribe(handle);
                }
            }),
        )
        .unwrap();

        let counter = Rc::clone(&second_hits);
        let handle = hub
            .subscribe("dev", Box::new(move |_| counter.set(counter.get() + 1)))
            .unwrap();
        second_handle.set(Some(handle));

        assert_eq!(hub.publish("dev", &TelemetryEvent::new(json!({}))), 1);
        assert_eq!(second_hits.get(), 0);
    }

    #[test]
    fn test_blank_device_rejected() {
        let hub = TelemetryHub::new();
        assert!(hub.subscribe(" ", Box::new(|_| {})).is_err());
    }

    #[test]
    fn test_parse_records_sorted() {
        let jsonl = r#"
{"at": "2024-01-01T00:00:02Z", "device": "d", "data": {"c8y_Speed": {"value": {"value": 2}}}}

{"at": "2024-01-01T00:00:00.500Z", "device": "d", "data": {"c8y_Speed": {"value": {"value": 1}}}}
"#;
        let records = parse_records(jsonl).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event().value_at("c8y_Speed.value"), Some(1.0));
        assert_eq!(records[1].offset_from(records[0].at), 1.5);
    }

    #[test]
    fn test_parse_records_reports_line() {
        let err = parse_records("{\"at\": \"nope\"}").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
