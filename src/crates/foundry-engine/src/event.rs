//! Lifecycle event bus
//!
//! Every execution has one broadcast channel and one monotonically increasing
//! sequence counter. Events for a given execution are totally ordered by
//! `seq`; events across executions are not ordered with each other. The
//! counter is seeded from the persisted `event_seq` on start/attach so that
//! sequence numbers survive process restarts, and the interpreter copies the
//! counter back into the state before every checkpoint.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// One lifecycle or activity event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventKind {
    StepStart {
        node_id: String,
        node_kind: String,
    },
    StepComplete {
        node_id: String,
        node_kind: String,
        duration_ms: i64,
    },
    StepError {
        node_id: String,
        node_kind: String,
        error: String,
        error_kind: String,
    },
    WorkflowPause,
    WorkflowResume,
    WorkflowComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_status: Option<String>,
    },
    WorkflowError {
        error: String,
        error_kind: String,
    },
    /// Streaming executor activity: tool starts, deltas, errors.
    Activity {
        node_id: String,
        name: String,
        data: Value,
    },
}

impl EventKind {
    /// The wire `type` string of the `{seq, type, payload}` envelope.
    pub fn event_type(&self) -> String {
        match self {
            EventKind::StepStart { .. } => "step:start".to_string(),
            EventKind::StepComplete { .. } => "step:complete".to_string(),
            EventKind::StepError { .. } => "step:error".to_string(),
            EventKind::WorkflowPause => "workflow:pause".to_string(),
            EventKind::WorkflowResume => "workflow:resume".to_string(),
            EventKind::WorkflowComplete { .. } => "workflow:complete".to_string(),
            EventKind::WorkflowError { .. } => "workflow:error".to_string(),
            EventKind::Activity { name, .. } => format!("activity:{name}"),
        }
    }

    fn payload(&self) -> Value {
        match self {
            EventKind::StepStart { node_id, node_kind } => {
                json!({"nodeId": node_id, "nodeKind": node_kind})
            }
            EventKind::StepComplete {
                node_id,
                node_kind,
                duration_ms,
            } => json!({"nodeId": node_id, "nodeKind": node_kind, "durationMs": duration_ms}),
            EventKind::StepError {
                node_id,
                node_kind,
                error,
                error_kind,
            } => json!({
                "nodeId": node_id,
                "nodeKind": node_kind,
                "error": error,
                "errorKind": error_kind
            }),
            EventKind::WorkflowPause | EventKind::WorkflowResume => json!({}),
            EventKind::WorkflowComplete { target_status } => {
                json!({"targetStatus": target_status})
            }
            EventKind::WorkflowError { error, error_kind } => {
                json!({"error": error, "errorKind": error_kind})
            }
            EventKind::Activity { node_id, data, .. } => {
                json!({"nodeId": node_id, "data": data})
            }
        }
    }
}

/// A sequenced event bound to one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub seq: u64,
    #[serde(flatten)]
    pub event: EventKind,
}

impl ExecutionEvent {
    /// The `{seq, type, payload}` envelope streamed to SSE clients.
    pub fn to_wire(&self) -> Value {
        json!({
            "seq": self.seq,
            "type": self.event.event_type(),
            "payload": self.event.payload(),
        })
    }
}

struct ExecutionChannel {
    tx: broadcast::Sender<ExecutionEvent>,
    seq: Arc<AtomicU64>,
}

/// In-process, per-execution broadcast bus.
#[derive(Default)]
pub struct EventBus {
    channels: RwLock<HashMap<String, ExecutionChannel>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a channel exists, seeding the sequence counter. The counter
    /// only ever moves forward: re-registration with a lower value (a resume,
    /// or a subscriber that raced ahead of attach) is a no-op.
    pub fn register(&self, execution_id: &str, start_seq: u64) {
        let mut channels = self.channels.write();
        let channel = channels.entry(execution_id.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            ExecutionChannel {
                tx,
                seq: Arc::new(AtomicU64::new(0)),
            }
        });
        channel.seq.fetch_max(start_seq, Ordering::SeqCst);
    }

    /// Emit an event, assigning the next sequence number. Events emitted for
    /// an unregistered execution register it starting at seq 0.
    pub fn emit(&self, execution_id: &str, event: EventKind) -> u64 {
        self.register(execution_id, 0);
        let channels = self.channels.read();
        let channel = channels.get(execution_id).expect("registered above");
        let seq = channel.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ExecutionEvent {
            execution_id: execution_id.to_string(),
            seq,
            event,
        };
        tracing::debug!(execution = execution_id, seq, kind = %event.event.event_type(), "event");
        // A send error only means no subscriber is currently listening.
        let _ = channel.tx.send(event);
        seq
    }

    /// Subscribe to live events for an execution.
    pub fn subscribe(&self, execution_id: &str) -> broadcast::Receiver<ExecutionEvent> {
        self.register(execution_id, 0);
        let channels = self.channels.read();
        channels
            .get(execution_id)
            .expect("registered above")
            .tx
            .subscribe()
    }

    /// The last assigned sequence number.
    pub fn current_seq(&self, execution_id: &str) -> u64 {
        self.channels
            .read()
            .get(execution_id)
            .map(|c| c.seq.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Drop the channel once an execution is terminal and drained.
    pub fn remove(&self, execution_id: &str) {
        self.channels.write().remove(execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seq_starts_at_one_and_is_contiguous() {
        let bus = EventBus::new();
        bus.register("exec", 0);
        let mut rx = bus.subscribe("exec");

        assert_eq!(bus.emit("exec", EventKind::WorkflowResume), 1);
        assert_eq!(bus.emit("exec", EventKind::WorkflowPause), 2);

        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_seq_resumes_from_persisted_value() {
        let bus = EventBus::new();
        bus.register("exec", 41);
        assert_eq!(bus.emit("exec", EventKind::WorkflowResume), 42);
        // re-registration does not reset the counter
        bus.register("exec", 0);
        assert_eq!(bus.emit("exec", EventKind::WorkflowPause), 43);
    }

    #[tokio::test]
    async fn test_early_subscriber_does_not_pin_counter() {
        // a subscriber can create the channel before the persisted sequence
        // is attached; registering afterwards still seeds the counter
        let bus = EventBus::new();
        let _rx = bus.subscribe("exec");
        bus.register("exec", 7);
        assert_eq!(bus.emit("exec", EventKind::WorkflowResume), 8);
    }

    #[tokio::test]
    async fn test_executions_are_independent() {
        let bus = EventBus::new();
        assert_eq!(bus.emit("a", EventKind::WorkflowResume), 1);
        assert_eq!(bus.emit("b", EventKind::WorkflowResume), 1);
        assert_eq!(bus.current_seq("a"), 1);
    }

    #[test]
    fn test_wire_envelope() {
        let event = ExecutionEvent {
            execution_id: "exec".into(),
            seq: 3,
            event: EventKind::StepStart {
                node_id: "llm".into(),
                node_kind: "llm".into(),
            },
        };
        let wire = event.to_wire();
        assert_eq!(wire["seq"], 3);
        assert_eq!(wire["type"], "step:start");
        assert_eq!(wire["payload"]["nodeId"], "llm");
    }

    #[test]
    fn test_activity_type_carries_name() {
        let kind = EventKind::Activity {
            node_id: "agent".into(),
            name: "tool-start".into(),
            data: json!({"tool": "bash"}),
        };
        assert_eq!(kind.event_type(), "activity:tool-start");
    }
}
