use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CallError;

/// Lifecycle status of a call, shared by the manager slot and each record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Idle,
    Starting,
    Active,
    Ending,
    Ended,
    Error,
}

impl CallStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 1,
            Self::Active => 2,
            Self::Ending => 3,
            Self::Ended => 4,
            Self::Error => 5,
        }
    }

    /// `Ended` and `Error` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }

    /// Whether a call in this status occupies the single call slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Starting | Self::Active | Self::Ending)
    }

    /// Status only moves forward; `Error` is reachable from any non-terminal status.
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Error || next.rank() > self.rank()
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Ended => "ended",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// How a call was placed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    #[default]
    Outbound,
    Inbound,
    ServerLink,
    ApiCall,
}

impl CallType {
    /// Only outbound calls dial a customer number.
    pub fn requires_phone_number(self) -> bool {
        matches!(self, Self::Outbound)
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
            Self::ServerLink => "server_link",
            Self::ApiCall => "api_call",
        };
        write!(f, "{}", s)
    }
}

/// One call attempt, from start to its terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    pub assistant_id: String,
    pub assistant_name: String,
    /// Formatted customer number; absent for non-outbound calls.
    pub phone_number: Option<String>,
    pub call_type: CallType,
    pub status: CallStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub cost: Option<f64>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    /// Operator who placed the call.
    pub user_id: Option<String>,
    pub vendor_call_id: Option<String>,
    pub end_reason: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CallRecord {
    pub fn new(
        assistant_id: impl Into<String>,
        assistant_name: impl Into<String>,
        call_type: CallType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assistant_id: assistant_id.into(),
            assistant_name: assistant_name.into(),
            phone_number: None,
            call_type,
            status: CallStatus::Idle,
            start_time: Utc::now(),
            end_time: None,
            duration_secs: None,
            cost: None,
            transcript: None,
            summary: None,
            user_id: None,
            vendor_call_id: None,
            end_reason: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_phone_number(mut self, phone_number: Option<String>) -> Self {
        self.phone_number = phone_number;
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Move to `next`, rejecting backwards or post-terminal transitions.
    pub fn transition(&mut self, next: CallStatus) -> Result<(), CallError> {
        if !self.status.can_transition_to(next) {
            return Err(CallError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Close the record with a terminal status, stamping `end_time` and `duration_secs`.
    pub fn finish(
        &mut self,
        terminal: CallStatus,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CallError> {
        if !terminal.is_terminal() {
            return Err(CallError::InvalidTransition {
                from: self.status,
                to: terminal,
            });
        }
        self.transition(terminal)?;
        self.end_time = Some(at);
        self.duration_secs = Some((at - self.start_time).num_seconds().max(0));
        self.end_reason = Some(reason.into());
        Ok(())
    }

    /// Seconds since the call started, computed at read time for open calls.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        match self.duration_secs {
            Some(d) => d,
            None => (now - self.start_time).num_seconds().max(0),
        }
    }
}
