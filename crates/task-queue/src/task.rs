//! Task envelope and wire payload.

use common::OrderId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Label routing a task to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Run a forward saga step.
    Step,
    /// Run a compensating action.
    Compensation,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Step => "step",
            TaskType::Compensation => "compensation",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload carried by both step and compensation tasks.
///
/// `step` stays a plain string on the wire; the handler resolves it and
/// rejects identifiers it does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPayload {
    pub order_id: OrderId,
    pub step: String,
}

impl StepPayload {
    pub fn new(order_id: OrderId, step: impl Into<String>) -> Self {
        Self {
            order_id,
            step: step.into(),
        }
    }
}

/// A unit of work on the queue: a type label and a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_type: TaskType,
    pub payload: Vec<u8>,
}

impl Task {
    /// Builds a task, encoding `payload` as JSON.
    pub fn new<T: Serialize>(task_type: TaskType, payload: &T) -> Result<Self> {
        Ok(Self {
            task_type,
            payload: serde_json::to_vec(payload)?,
        })
    }

    /// Builds a forward step task.
    pub fn step(payload: &StepPayload) -> Result<Self> {
        Self::new(TaskType::Step, payload)
    }

    /// Builds a compensation task.
    pub fn compensation(payload: &StepPayload) -> Result<Self> {
        Self::new(TaskType::Compensation, payload)
    }

    /// Decodes the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_shape() {
        let payload = StepPayload::new(OrderId::new("A"), "assign_agent");
        let task = Task::step(&payload).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&task.payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"order_id": "A", "step": "assign_agent"})
        );
        assert_eq!(task.task_type, TaskType::Step);
        assert_eq!(task.decode::<StepPayload>().unwrap(), payload);
    }

    #[test]
    fn test_same_payload_for_compensation() {
        let payload = StepPayload::new(OrderId::new("A"), "release_pickup_slot");
        let step = Task::step(&payload).unwrap();
        let comp = Task::compensation(&payload).unwrap();

        assert_eq!(step.payload, comp.payload);
        assert_eq!(comp.task_type.as_str(), "compensation");
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let task = Task {
            task_type: TaskType::Step,
            payload: b"{\"order_id\": 7}".to_vec(),
        };
        assert!(task.decode::<StepPayload>().is_err());
    }
}
