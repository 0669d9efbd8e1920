//! Automatic kitchen/delivery progression of a freshly placed order.
//!
//! The chain is a pure function of the status just reached: every step names the
//! next target status and how many time units to wait before applying it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::OrderStatus;

pub const PREPARING_DELAY_UNITS: u32 = 15;
pub const READY_DELAY_UNITS: u32 = 15;
pub const DELIVERED_DELAY_UNITS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionStep {
    pub target: OrderStatus,
    pub delay_units: u32,
}

impl ProgressionStep {
    pub fn delay(&self, unit: Duration) -> Duration {
        unit.saturating_mul(self.delay_units)
    }
}

/// First step, scheduled right after the order is created.
pub fn initial_step() -> ProgressionStep {
    ProgressionStep {
        target: OrderStatus::Preparing,
        delay_units: PREPARING_DELAY_UNITS,
    }
}

/// Step to schedule once `reached` has been persisted; `None` ends the chain.
pub fn next_step(reached: OrderStatus) -> Option<ProgressionStep> {
    match reached {
        OrderStatus::Preparing => Some(ProgressionStep {
            target: OrderStatus::Ready,
            delay_units: READY_DELAY_UNITS,
        }),
        OrderStatus::Ready => Some(ProgressionStep {
            target: OrderStatus::Delivered,
            delay_units: DELIVERED_DELAY_UNITS,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    DeadLettered,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::DeadLettered => "dead_lettered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "dead_lettered" => Some(JobState::DeadLettered),
            _ => None,
        }
    }
}

/// Persisted pending step of one order's chain. At most one job exists per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusJob {
    pub order_id: Uuid,
    pub target_status: OrderStatus,
    pub run_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub state: JobState,
}

impl StatusJob {
    pub fn new(order_id: Uuid, step: ProgressionStep, run_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            target_status: step.target,
            run_at,
            attempts: 0,
            last_error: None,
            state: JobState::Pending,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.run_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table() {
        assert_eq!(
            initial_step(),
            ProgressionStep {
                target: OrderStatus::Preparing,
                delay_units: 15
            }
        );
        assert_eq!(
            next_step(OrderStatus::Preparing),
            Some(ProgressionStep {
                target: OrderStatus::Ready,
                delay_units: 15
            })
        );
        assert_eq!(
            next_step(OrderStatus::Ready),
            Some(ProgressionStep {
                target: OrderStatus::Delivered,
                delay_units: 60
            })
        );
        assert_eq!(next_step(OrderStatus::Delivered), None);
        assert_eq!(next_step(OrderStatus::PickedUp), None);
        assert_eq!(next_step(OrderStatus::Created), None);
    }

    #[test]
    fn delay_scales_with_unit() {
        let step = next_step(OrderStatus::Ready).unwrap();
        assert_eq!(step.delay(Duration::from_millis(10)), Duration::from_millis(600));
    }

    #[test]
    fn job_due_only_when_pending_and_elapsed() {
        let now = Utc::now();
        let mut job = StatusJob::new(Uuid::new_v4(), initial_step(), now);
        assert!(job.is_due(now));
        assert!(!job.is_due(now - chrono::Duration::seconds(1)));
        job.state = JobState::DeadLettered;
        assert!(!job.is_due(now));
    }
}
