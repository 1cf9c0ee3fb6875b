//! Scheduler domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use quarry_store::DataMap;
use serde::{Deserialize, Serialize};

use crate::job::JobType;

/// Group used when none is given.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Default trigger priority.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Misfire handling left to the trigger type's own policy.
pub const MISFIRE_INSTRUCTION_SMART_POLICY: i32 = 0;

/// Job or trigger data payload.
pub type JobDataMap = DataMap;

/// Identity of a job: `(group, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub group: String,
    pub name: String,
}

impl JobKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Key in the `DEFAULT` group.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_GROUP, name)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Identity of a trigger: `(group, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    pub group: String,
    pub name: String,
}

impl TriggerKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_GROUP, name)
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// A stored job definition.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetail {
    pub key: JobKey,
    pub description: Option<String>,
    /// Resolved executable type.
    pub job_type: JobType,
    pub job_data: JobDataMap,
    /// Keep the job after its last trigger is removed.
    pub durable: bool,
    /// Re-execute if the scheduler went down mid-execution.
    pub requests_recovery: bool,
}

impl JobDetail {
    pub fn new(key: JobKey, job_type: JobType) -> Self {
        Self {
            key,
            description: None,
            job_type,
            job_data: JobDataMap::new(),
            durable: false,
            requests_recovery: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.job_data.insert(key.into(), value);
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn requests_recovery(mut self, requests_recovery: bool) -> Self {
        self.requests_recovery = requests_recovery;
        self
    }

    pub fn persist_job_data_after_execution(&self) -> bool {
        self.job_type.capabilities().persist_job_data_after_execution
    }

    pub fn concurrent_execution_disallowed(&self) -> bool {
        self.job_type.capabilities().concurrent_execution_disallowed
    }
}

/// Firing schedule carried by a trigger. Transported, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSchedule {
    /// Fire `repeat_count + 1` times, `repeat_interval_ms` apart. A
    /// `repeat_count` of -1 repeats indefinitely.
    Simple {
        repeat_count: i32,
        repeat_interval_ms: i64,
        times_triggered: i32,
    },
    Cron {
        expression: String,
        time_zone: String,
    },
}

impl TriggerSchedule {
    pub fn once() -> Self {
        TriggerSchedule::Simple {
            repeat_count: 0,
            repeat_interval_ms: 0,
            times_triggered: 0,
        }
    }
}

/// A schedule descriptor bound to one job.
///
/// Timestamps are persisted at millisecond precision.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub description: Option<String>,
    pub calendar_name: Option<String>,
    pub job_data: JobDataMap,
    pub priority: i32,
    pub misfire_instruction: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub schedule: TriggerSchedule,
}

impl Trigger {
    /// Trigger that first fires at `start_time`.
    pub fn new(
        key: TriggerKey,
        job_key: JobKey,
        start_time: DateTime<Utc>,
        schedule: TriggerSchedule,
    ) -> Self {
        Self {
            key,
            job_key,
            description: None,
            calendar_name: None,
            job_data: JobDataMap::new(),
            priority: DEFAULT_PRIORITY,
            misfire_instruction: MISFIRE_INSTRUCTION_SMART_POLICY,
            start_time,
            end_time: None,
            next_fire_time: Some(start_time),
            previous_fire_time: None,
            schedule,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_calendar(mut self, calendar_name: impl Into<String>) -> Self {
        self.calendar_name = Some(calendar_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.job_data.insert(key.into(), value);
        self
    }
}

/// Persisted lifecycle state of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerState {
    Waiting,
    Acquired,
    Executing,
    Complete,
    Paused,
    Blocked,
    PausedBlocked,
    Error,
}

impl TriggerState {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerState::Waiting => "Waiting",
            TriggerState::Acquired => "Acquired",
            TriggerState::Executing => "Executing",
            TriggerState::Complete => "Complete",
            TriggerState::Paused => "Paused",
            TriggerState::Blocked => "Blocked",
            TriggerState::PausedBlocked => "PausedBlocked",
            TriggerState::Error => "Error",
        }
    }

    /// State after a pause request, or `None` if pausing does not apply.
    pub fn paused(self) -> Option<Self> {
        match self {
            TriggerState::Waiting | TriggerState::Acquired => Some(TriggerState::Paused),
            TriggerState::Blocked => Some(TriggerState::PausedBlocked),
            _ => None,
        }
    }

    /// State after a resume request, or `None` if the trigger is not paused.
    pub fn resumed(self) -> Option<Self> {
        match self {
            TriggerState::Paused => Some(TriggerState::Waiting),
            TriggerState::PausedBlocked => Some(TriggerState::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Waiting" => Ok(TriggerState::Waiting),
            "Acquired" => Ok(TriggerState::Acquired),
            "Executing" => Ok(TriggerState::Executing),
            "Complete" => Ok(TriggerState::Complete),
            "Paused" => Ok(TriggerState::Paused),
            "Blocked" => Ok(TriggerState::Blocked),
            "PausedBlocked" => Ok(TriggerState::PausedBlocked),
            "Error" => Ok(TriggerState::Error),
            other => Err(format!("unknown trigger state {:?}", other)),
        }
    }
}

/// Pause marker on a job or trigger group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    #[default]
    Active,
    Paused,
}

impl GroupState {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupState::Active => "Active",
            GroupState::Paused => "Paused",
        }
    }
}

impl FromStr for GroupState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(GroupState::Active),
            "Paused" => Ok(GroupState::Paused),
            other => Err(format!("unknown group state {:?}", other)),
        }
    }
}

/// Selects groups by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMatcher {
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Anything,
}

impl GroupMatcher {
    pub fn group_equals(group: impl Into<String>) -> Self {
        GroupMatcher::Equals(group.into())
    }

    pub fn is_match(&self, group: &str) -> bool {
        match self {
            GroupMatcher::Equals(g) => group == g,
            GroupMatcher::StartsWith(prefix) => group.starts_with(prefix.as_str()),
            GroupMatcher::EndsWith(suffix) => group.ends_with(suffix.as_str()),
            GroupMatcher::Contains(part) => group.contains(part.as_str()),
            GroupMatcher::Anything => true,
        }
    }

    /// The single group named, for exact matchers.
    pub fn exact(&self) -> Option<&str> {
        match self {
            GroupMatcher::Equals(g) => Some(g),
            _ => None,
        }
    }
}

/// A named exclusion calendar. The definition is stored opaquely.
#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub name: String,
    pub description: Option<String>,
    pub definition: serde_json::Value,
}

impl Calendar {
    pub fn new(name: impl Into<String>, definition: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            definition,
        }
    }
}

/// Liveness record of one cooperating scheduler process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerInstance {
    pub instance_id: String,
    pub last_checkin: DateTime<Utc>,
    pub checkin_interval_ms: i64,
}

impl SchedulerInstance {
    /// Whether the instance has missed its check-in window as of `now`.
    /// A window too large to represent never expires.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        chrono::TimeDelta::try_milliseconds(self.checkin_interval_ms)
            .and_then(|interval| self.last_checkin.checked_add_signed(interval))
            .is_some_and(|deadline| now > deadline)
    }
}
