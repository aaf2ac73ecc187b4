//! Progress channel
//!
//! The pipeline emits step events through a [`ProgressEmitter`], which never
//! blocks. A [`ProgressHub`] maps session ids to bounded queues drained by
//! whatever transport the observer is attached to.

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Named pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validating,
    Classifying,
    Invalid,
    Similarity,
    CacheHit,
    Searching,
    Scraping,
    Extracting,
    Summarizing,
    Caching,
    Done,
    /// Transport-level: observer attached
    Connected,
    /// Transport-level: idle keep-alive
    Ping,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Classifying => "classifying",
            Self::Invalid => "invalid",
            Self::Similarity => "similarity",
            Self::CacheHit => "cache_hit",
            Self::Searching => "searching",
            Self::Scraping => "scraping",
            Self::Extracting => "extracting",
            Self::Summarizing => "summarizing",
            Self::Caching => "caching",
            Self::Done => "done",
            Self::Connected => "connected",
            Self::Ping => "ping",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: Step,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ProgressEvent {
    /// Event with a payload; non-object values are wrapped under `"value"`
    pub fn new(step: Step, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            step,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn bare(step: Step) -> Self {
        Self::new(step, Value::Null)
    }
}

/// Send-only handle the pipeline reports through
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressEmitter {
    /// Emitter that discards everything
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn is_noop(&self) -> bool {
        self.tx.is_none()
    }

    pub fn emit(&self, step: Step, payload: Value) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(ProgressEvent::new(step, payload)).is_err() {
            tracing::debug!(kind = %FailureKind::ChannelDelivery, "Progress observer gone, dropped '{}'", step);
        }
    }
}

/// Receiving end of one attached observer
#[derive(Debug)]
pub struct ProgressSubscription {
    session_id: String,
    generation: u64,
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressSubscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the hub dropped this subscription
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

struct Session {
    tx: mpsc::Sender<ProgressEvent>,
    generation: u64,
}

/// Registry of open progress sessions
pub struct ProgressHub {
    sessions: Mutex<HashMap<String, Session>>,
    next_generation: AtomicU64,
    capacity: usize,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a session, replacing any previous one under the same id
    pub fn connect(&self, session_id: &str) -> ProgressSubscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if self
            .sessions()
            .insert(session_id.to_string(), Session { tx, generation })
            .is_some()
        {
            tracing::debug!("Replaced progress session {}", session_id);
        }
        tracing::info!("Progress session {} connected", session_id);
        ProgressSubscription {
            session_id: session_id.to_string(),
            generation,
            rx,
        }
    }

    /// Deliver an event without waiting. Returns whether it was queued.
    pub fn send(&self, session_id: &str, event: ProgressEvent) -> bool {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get(session_id) else {
            tracing::debug!("No progress session {}, dropped '{}'", session_id, event.step);
            return false;
        };

        match session.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    kind = %FailureKind::ChannelDelivery,
                    "Progress session {} is backed up, dropped '{}'",
                    session_id,
                    event.step
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(
                    kind = %FailureKind::ChannelDelivery,
                    "Progress session {} closed, deregistering",
                    session_id
                );
                sessions.remove(session_id);
                false
            }
        }
    }

    /// Deregister `subscription` unless a newer observer has taken its id
    pub fn disconnect(&self, subscription: &ProgressSubscription) -> bool {
        let mut sessions = self.sessions();
        match sessions.get(&subscription.session_id) {
            Some(current) if current.generation == subscription.generation => {
                sessions.remove(&subscription.session_id);
                tracing::info!("Progress session {} disconnected", subscription.session_id);
                true
            }
            Some(_) => {
                tracing::debug!(
                    "Progress session {} owned by a newer observer, left registered",
                    subscription.session_id
                );
                false
            }
            None => false,
        }
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.sessions().contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Emitter whose events are relayed into `session_id` by a background
    /// task. The task ends once every clone of the emitter is dropped.
    pub fn emitter_for(self: &Arc<Self>, session_id: &str) -> ProgressEmitter {
        let (emitter, mut rx) = ProgressEmitter::channel();
        let hub = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                hub.send(&session_id, event);
            }
        });
        emitter
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::new(Step::CacheHit, json!({"similarity": 0.93}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["step"], "cache_hit");
        assert_eq!(value["payload"]["similarity"], 0.93);
        assert!(value["timestamp"].is_string());

        let wrapped = ProgressEvent::new(Step::Searching, json!(5));
        assert_eq!(wrapped.payload["value"], 5);
    }

    #[tokio::test]
    async fn test_send_to_connected_session() {
        let hub = ProgressHub::new(8);
        let mut rx = hub.connect("abc");
        assert!(hub.send("abc", ProgressEvent::bare(Step::Validating)));
        assert_eq!(rx.recv().await.unwrap().step, Step::Validating);
    }

    #[test]
    fn test_unknown_session_is_noop() {
        let hub = ProgressHub::new(8);
        assert!(!hub.send("missing", ProgressEvent::bare(Step::Done)));
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_closed_session_is_deregistered() {
        let hub = ProgressHub::new(8);
        let rx = hub.connect("gone");
        drop(rx);
        assert!(!hub.send("gone", ProgressEvent::bare(Step::Done)));
        assert!(!hub.is_connected("gone"));
    }

    #[test]
    fn test_full_queue_drops_without_deregistering() {
        let hub = ProgressHub::new(1);
        let _rx = hub.connect("slow");
        assert!(hub.send("slow", ProgressEvent::bare(Step::Searching)));
        assert!(!hub.send("slow", ProgressEvent::bare(Step::Scraping)));
        assert!(hub.is_connected("slow"));
    }

    #[tokio::test]
    async fn test_emitter_relays_in_order() {
        let hub = Arc::new(ProgressHub::new(16));
        let mut rx = hub.connect("run");
        let emitter = hub.emitter_for("run");

        emitter.emit(Step::Validating, Value::Null);
        emitter.emit(Step::Classifying, Value::Null);
        emitter.emit(Step::Done, json!({"from_cache": false}));
        drop(emitter);

        let steps: Vec<Step> = vec![
            rx.recv().await.unwrap().step,
            rx.recv().await.unwrap().step,
            rx.recv().await.unwrap().step,
        ];
        assert_eq!(steps, vec![Step::Validating, Step::Classifying, Step::Done]);

        assert!(hub.disconnect(&rx));
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_observer_cannot_disconnect_replacement() {
        let hub = ProgressHub::new(8);
        let mut first = hub.connect("tab");
        let mut second = hub.connect("tab");

        // The replaced observer sees its channel end
        assert!(first.recv().await.is_none());

        assert!(!hub.disconnect(&first));
        assert!(hub.is_connected("tab"));
        assert!(hub.send("tab", ProgressEvent::bare(Step::Scraping)));
        assert_eq!(second.recv().await.unwrap().step, Step::Scraping);

        assert!(hub.disconnect(&second));
        assert!(!hub.is_connected("tab"));
    }

    #[test]
    fn test_noop_emitter_never_fails() {
        let emitter = ProgressEmitter::noop();
        assert!(emitter.is_noop());
        emitter.emit(Step::Done, Value::Null);
    }
}
