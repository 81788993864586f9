//! Order record and its status lifecycle.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Fulfilled
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The saga is still running.
    #[default]
    Pending,

    /// Every saga step succeeded (terminal state).
    Fulfilled,

    /// A saga step failed (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled | OrderStatus::Failed)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Failed => "failed",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "fulfilled" => Ok(OrderStatus::Fulfilled),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An order driven by a fulfillment saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order.
    pub fn new(id: OrderId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the order fulfilled. Returns `Ok(false)` if it already was.
    pub fn fulfill(&mut self) -> Result<bool, DomainError> {
        self.transition(OrderStatus::Fulfilled, "fulfill")
    }

    /// Marks the order failed. Returns `Ok(false)` if it already was.
    pub fn fail(&mut self) -> Result<bool, DomainError> {
        self.transition(OrderStatus::Failed, "fail")
    }

    fn transition(&mut self, to: OrderStatus, action: &'static str) -> Result<bool, DomainError> {
        if self.status == to {
            return Ok(false);
        }
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                current: self.status.as_str(),
                action,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(true)
    }
}
