//! # Reconciler module
//!
//! This module provide the cluster and instance reconcilers, the desired
//! state model and the bounded polling helper they share

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, Instant};

pub mod cluster;
pub mod instance;

// -----------------------------------------------------------------------------
// DesiredState enumeration

/// target lifecycle state of a resource, `running` additionally starts a
/// stopped cluster and is rejected for instances
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum DesiredState {
    #[default]
    #[serde(rename = "present")]
    Present,
    #[serde(rename = "absent")]
    Absent,
    #[serde(rename = "running")]
    Running,
}

impl Display for DesiredState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
            Self::Running => write!(f, "running"),
        }
    }
}

// -----------------------------------------------------------------------------
// Outcome structure

/// result of one reconciliation, `changed` is false when the observed state
/// already matched the desired one
#[derive(Serialize, PartialEq, Clone, Debug)]
pub struct Outcome<T> {
    #[serde(rename = "changed")]
    pub changed: bool,
    #[serde(rename = "resource")]
    pub resource: Option<T>,
}

impl<T> Outcome<T> {
    pub fn changed(resource: Option<T>) -> Self {
        Self {
            changed: true,
            resource,
        }
    }

    pub fn unchanged(resource: Option<T>) -> Self {
        Self {
            changed: false,
            resource,
        }
    }
}

// -----------------------------------------------------------------------------
// Poller structure

/// timekeeper of a blocking wait-loop, polls at a fixed interval until a
/// hard deadline
pub struct Poller {
    interval: Duration,
    deadline: Instant,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            deadline: Instant::now() + timeout,
        }
    }

    /// sleeps one interval and returns true, or returns false once the
    /// deadline has elapsed
    pub async fn tick(&self) -> bool {
        if Instant::now() >= self.deadline {
            return false;
        }

        sleep_until(Instant::now() + self.interval).await;
        true
    }
}

// -----------------------------------------------------------------------------
// helpers

/// returns the effective wait timeout in seconds, a missing or zero value
/// from the task falls back to the given default
pub(crate) fn timeout(requested: Option<u64>, fallback: u64) -> u64 {
    requested.filter(|timeout| *timeout > 0).unwrap_or(fallback)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{timeout, DesiredState, Outcome, Poller};

    #[test]
    fn desired_state_should_deserialize_from_task_values() {
        assert_eq!(
            DesiredState::Present,
            serde_yaml::from_str("present").expect("state to be deserialized")
        );
        assert_eq!(
            DesiredState::Absent,
            serde_yaml::from_str("absent").expect("state to be deserialized")
        );
        assert_eq!(
            DesiredState::Running,
            serde_yaml::from_str("running").expect("state to be deserialized")
        );
        assert!(serde_yaml::from_str::<DesiredState>("gone").is_err());
    }

    #[test]
    fn desired_state_should_default_to_present() {
        assert_eq!(DesiredState::Present, DesiredState::default());
    }

    #[test]
    fn outcome_should_serialize_change_flag() {
        let outcome = Outcome::<()>::unchanged(None);
        let report = serde_json::to_string(&outcome).expect("outcome to be serialized");

        assert_eq!(r#"{"changed":false,"resource":null}"#, report);
    }

    #[test]
    fn timeout_should_fall_back_on_missing_or_zero() {
        assert_eq!(600, timeout(None, 600));
        assert_eq!(600, timeout(Some(0), 600));
        assert_eq!(42, timeout(Some(42), 600));
    }

    #[tokio::test]
    async fn poller_should_refuse_to_tick_past_the_deadline() {
        let poller = Poller::new(Duration::from_secs(0), Duration::from_secs(0));

        assert!(!poller.tick().await);
    }

    #[tokio::test]
    async fn poller_should_tick_before_the_deadline() {
        let poller = Poller::new(Duration::from_millis(1), Duration::from_secs(60));

        assert!(poller.tick().await);
    }
}
