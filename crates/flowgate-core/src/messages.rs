//! Backend lifecycle messages.
//!
//! These are the payloads the workflow engine publishes on the event bus
//! when a process or task changes state. The gateway forwards them to
//! clients unmodified; it only reads individual fields (e.g.
//! `process_model_id`) to resolve parameterized wire paths.

use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, FlowNodeId, ProcessInstanceId, ProcessModelId};

/// Event-bus message paths the backend publishes on.
///
/// Identity-scoped variants append `/<user_id>` to the base path; the
/// catalog carries them as templates.
pub mod paths {
    /// A user task became ready for interaction.
    pub const USER_TASK_REACHED: &str = "user_task.reached";
    /// A user task was finished.
    pub const USER_TASK_FINISHED: &str = "user_task.finished";
    /// A manual task became ready for interaction.
    pub const MANUAL_TASK_REACHED: &str = "manual_task.reached";
    /// A manual task was finished.
    pub const MANUAL_TASK_FINISHED: &str = "manual_task.finished";
    /// A process instance started.
    pub const PROCESS_STARTED: &str = "process.started";
    /// A process instance ran to its end event.
    pub const PROCESS_ENDED: &str = "process.ended";
    /// A process instance was terminated.
    pub const PROCESS_TERMINATED: &str = "process.terminated";
}

/// A task (user or manual) reached or finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLifecycleMessage {
    /// Correlation the owning instance belongs to.
    pub correlation_id: CorrelationId,
    /// Model the owning instance was started from.
    pub process_model_id: ProcessModelId,
    /// The owning process instance.
    pub process_instance_id: ProcessInstanceId,
    /// The task's flow node.
    pub flow_node_id: FlowNodeId,
    /// The token payload at the task, verbatim from the engine.
    pub current_token: serde_json::Value,
}

/// A process instance started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStartedMessage {
    /// Correlation the new instance belongs to.
    pub correlation_id: CorrelationId,
    /// Model the instance was started from.
    pub process_model_id: ProcessModelId,
    /// The new process instance.
    pub process_instance_id: ProcessInstanceId,
    /// The start event that fired.
    pub start_event_id: FlowNodeId,
}

/// A process instance ended, either regularly or by termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEndedMessage {
    /// Correlation the instance belonged to.
    pub correlation_id: CorrelationId,
    /// Model the instance was started from.
    pub process_model_id: ProcessModelId,
    /// The finished process instance.
    pub process_instance_id: ProcessInstanceId,
    /// The end (or terminate end) event that was reached.
    pub end_event_id: FlowNodeId,
}

/// Serialize a lifecycle message into the bus payload form.
///
/// The derived serializers cannot fail for these types; a `Null` payload
/// would only indicate a programming error in the message definitions.
#[must_use]
pub fn payload_of<T: Serialize>(message: &T) -> serde_json::Value {
    serde_json::to_value(message).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_message() -> TaskLifecycleMessage {
        TaskLifecycleMessage {
            correlation_id: CorrelationId::from("corr-1"),
            process_model_id: ProcessModelId::from("order_fulfilment"),
            process_instance_id: ProcessInstanceId::from("pi-1"),
            flow_node_id: FlowNodeId::from("approve_order"),
            current_token: serde_json::json!({"amount": 250}),
        }
    }

    #[test]
    fn task_message_roundtrip() {
        let msg = task_message();
        let value = payload_of(&msg);
        assert_eq!(value["process_model_id"], "order_fulfilment");
        assert_eq!(value["current_token"]["amount"], 250);
        let back: TaskLifecycleMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn process_started_payload_carries_model_id() {
        let msg = ProcessStartedMessage {
            correlation_id: CorrelationId::from("corr-1"),
            process_model_id: ProcessModelId::from("order_fulfilment"),
            process_instance_id: ProcessInstanceId::from("pi-1"),
            start_event_id: FlowNodeId::from("start"),
        };
        let value = payload_of(&msg);
        // The dispatcher reads this key to resolve parameterized wire paths.
        assert_eq!(value["process_model_id"], "order_fulfilment");
    }

    #[test]
    fn message_paths_are_distinct() {
        let all = [
            paths::USER_TASK_REACHED,
            paths::USER_TASK_FINISHED,
            paths::MANUAL_TASK_REACHED,
            paths::MANUAL_TASK_FINISHED,
            paths::PROCESS_STARTED,
            paths::PROCESS_ENDED,
            paths::PROCESS_TERMINATED,
        ];
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }
}
