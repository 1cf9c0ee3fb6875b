//! DynamoDB-backed job store for Quarry.
//!
//! This crate persists scheduler state in six tables:
//! - Jobs and triggers, keyed by `(group, name)`
//! - Job group and trigger group pause markers
//! - Calendars and scheduler instance check-ins
//!
//! The [`JobStore`] facade is stateless between calls. Trigger state changes
//! go through conditional writes, so several scheduler instances can share
//! the same tables without double-acquiring a trigger.

mod config;
pub mod entities;
mod error;
mod job;
mod store;
mod types;

pub use config::{DEFAULT_CHECKIN_INTERVAL, DEFAULT_MAX_UPDATE_ATTEMPTS, JobStoreConfig};
pub use error::JobStoreError;
pub use job::{
    Job, JobCapabilities, JobFactory, JobType, JobTypeRegistry, JobTypeResolver, NOOP_JOB_TYPE,
    NoOpJob,
};
pub use store::{JobStore, JobWithTriggers};
pub use types::{
    Calendar, DEFAULT_GROUP, DEFAULT_PRIORITY, GroupMatcher, GroupState, JobDataMap, JobDetail,
    JobKey, MISFIRE_INSTRUCTION_SMART_POLICY, SchedulerInstance, Trigger, TriggerKey,
    TriggerSchedule, TriggerState,
};
