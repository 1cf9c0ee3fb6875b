//! Record adapters for the six job store tables.
//!
//! Each adapter owns the attribute layout of its table. Key helpers here
//! are shared with the facade so lookups never drift from what `key()`
//! produces.

mod calendar;
mod group;
mod job;
mod scheduler;
mod trigger;

pub use group::{JobGroup, TriggerGroup};
pub use trigger::StoredTrigger;
pub(crate) use trigger::decode_state;

use quarry_store::{ATTR_GROUP, ATTR_INSTANCE_ID, ATTR_NAME, Item, codec};

use crate::{JobKey, TriggerKey};

/// Lifecycle state of a trigger, or pause state of a group.
pub const ATTR_STATE: &str = "State";

/// Instance currently holding an acquired trigger.
pub const ATTR_ACQUIRED_BY: &str = "InstanceId";

/// Owning job of a trigger.
pub const ATTR_JOB_GROUP: &str = "JobGroup";
pub const ATTR_JOB_NAME: &str = "JobName";

pub const ATTR_CALENDAR_NAME: &str = "CalendarName";
pub const ATTR_NEXT_FIRE_TIME: &str = "NextFireTime";

pub const ATTR_DURABLE: &str = "Durable";
pub const ATTR_CONCURRENT_EXECUTION_DISALLOWED: &str = "ConcurrentExecutionDisallowed";

fn group_name_key(group: &str, name: &str) -> Item {
    [
        (ATTR_GROUP.to_string(), codec::encode_string(group)),
        (ATTR_NAME.to_string(), codec::encode_string(name)),
    ]
    .into_iter()
    .collect()
}

pub fn job_key(key: &JobKey) -> Item {
    group_name_key(&key.group, &key.name)
}

pub fn trigger_key(key: &TriggerKey) -> Item {
    group_name_key(&key.group, &key.name)
}

/// Key of the group and calendar tables.
pub fn name_key(name: &str) -> Item {
    [(ATTR_NAME.to_string(), codec::encode_string(name))]
        .into_iter()
        .collect()
}

pub fn instance_key(instance_id: &str) -> Item {
    [(ATTR_INSTANCE_ID.to_string(), codec::encode_string(instance_id))]
        .into_iter()
        .collect()
}

/// `(group, name)` of a job or trigger item, without decoding the rest.
pub fn read_group_name(item: &Item) -> Result<(String, String), quarry_store::RecordError> {
    Ok((
        codec::required_string(item, ATTR_GROUP)?,
        codec::required_string(item, ATTR_NAME)?,
    ))
}
