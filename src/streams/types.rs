//! Request, result and error types for stream readiness.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::resilience::Deadline;

/// What the caller needs the stream for. Selects the overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Snapshot,
    Recording,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Snapshot => "snapshot",
            Purpose::Recording => "recording",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Purpose::Snapshot),
            "recording" => Ok(Purpose::Recording),
            other => Err(format!("unknown purpose '{other}' (expected snapshot or recording)")),
        }
    }
}

/// Escalation step of the readiness walk. Serialized as 1, 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Tier {
    /// Locally known to be usable.
    Direct = 1,
    /// Asking the media server whether the path is already up.
    ReadyCheck = 2,
    /// Triggering on-demand activation and waiting for it.
    Activation = 3,
}

impl Tier {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Direct => "1",
            Tier::ReadyCheck => "2",
            Tier::Activation => "3",
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.as_u8()
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Direct),
            2 => Ok(Tier::ReadyCheck),
            3 => Ok(Tier::Activation),
            other => Err(format!("invalid tier {other}")),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.as_u8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Immediate,
    Acceptable,
    Slow,
    TimedOut,
    Failed,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Immediate => "immediate",
            ReadinessStatus::Acceptable => "acceptable",
            ReadinessStatus::Slow => "slow",
            ReadinessStatus::TimedOut => "timed_out",
            ReadinessStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome handed to every caller waiting on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub status: ReadinessStatus,
    #[serde(with = "duration_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
    pub tier_reached: Tier,
    pub fallback_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ReadinessResult {
    pub fn ready(status: ReadinessStatus, elapsed: Duration, tier: Tier) -> Self {
        Self { status, elapsed, tier_reached: tier, fallback_applied: false, detail: None }
    }

    pub fn failed(elapsed: Duration, tier: Tier, detail: impl Into<String>) -> Self {
        Self {
            status: ReadinessStatus::Failed,
            elapsed,
            tier_reached: tier,
            fallback_applied: false,
            detail: Some(detail.into()),
        }
    }

    /// Degraded success returned when the budget ran out and fallback is on.
    pub fn fallback(elapsed: Duration, tier: Tier) -> Self {
        Self {
            status: ReadinessStatus::TimedOut,
            elapsed,
            tier_reached: tier,
            fallback_applied: true,
            detail: None,
        }
    }

    /// Whether the stream can be used right now.
    pub fn is_ready(&self) -> bool {
        matches!(
            self.status,
            ReadinessStatus::Immediate | ReadinessStatus::Acceptable | ReadinessStatus::Slow
        )
    }
}

/// One caller's request, with the deadline derived from its purpose.
#[derive(Debug, Clone)]
pub struct ReadinessRequest {
    pub device_id: String,
    pub purpose: Purpose,
    pub requested_at: Instant,
    pub deadline: Deadline,
}

impl ReadinessRequest {
    pub fn new(device_id: impl Into<String>, purpose: Purpose, budget: Duration) -> Self {
        let requested_at = Instant::now();
        Self {
            device_id: device_id.into(),
            purpose,
            requested_at,
            deadline: Deadline::starting_at(requested_at, budget),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadinessError {
    #[error("device {device_id}: deadline of {budget:?} exceeded at {tier}")]
    DeadlineExceeded { device_id: String, budget: Duration, tier: Tier },

    #[error("device {device_id}: caller cancelled the wait")]
    Cancelled { device_id: String },

    #[error("device {device_id}: activation aborted before producing a result")]
    Aborted { device_id: String },
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
