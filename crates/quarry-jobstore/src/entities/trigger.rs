use std::collections::HashMap;

use quarry_store::{
    ATTR_GROUP, ATTR_NAME, AttributeValue, DynamoEntity, FromRecord, Item, RecordError, TableKind,
    codec,
};

use super::{
    ATTR_ACQUIRED_BY, ATTR_CALENDAR_NAME, ATTR_JOB_GROUP, ATTR_JOB_NAME, ATTR_NEXT_FIRE_TIME,
    ATTR_STATE,
};
use crate::{JobKey, Trigger, TriggerKey, TriggerSchedule, TriggerState};

const ATTR_DESCRIPTION: &str = "Description";
const ATTR_JOB_DATA: &str = "JobDataMap";
const ATTR_PRIORITY: &str = "Priority";
const ATTR_MISFIRE_INSTRUCTION: &str = "MisfireInstruction";
const ATTR_START_TIME: &str = "StartTime";
const ATTR_END_TIME: &str = "EndTime";
const ATTR_PREVIOUS_FIRE_TIME: &str = "PreviousFireTime";
const ATTR_SCHEDULE: &str = "Schedule";

const SCHEDULE_KIND: &str = "Kind";
const SCHEDULE_REPEAT_COUNT: &str = "RepeatCount";
const SCHEDULE_REPEAT_INTERVAL: &str = "RepeatInterval";
const SCHEDULE_TIMES_TRIGGERED: &str = "TimesTriggered";
const SCHEDULE_EXPRESSION: &str = "CronExpression";
const SCHEDULE_TIME_ZONE: &str = "TimeZone";

/// A trigger as persisted: the definition plus its lifecycle state and,
/// while acquired, the owning scheduler instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrigger {
    pub trigger: Trigger,
    pub state: TriggerState,
    pub acquired_by: Option<String>,
}

impl StoredTrigger {
    pub fn new(trigger: Trigger, state: TriggerState) -> Self {
        Self {
            trigger,
            state,
            acquired_by: None,
        }
    }

    /// Copy moved to `state`. Leaving `Acquired` clears the owner.
    pub fn with_state(&self, state: TriggerState) -> Self {
        let acquired_by = if state == TriggerState::Acquired {
            self.acquired_by.clone()
        } else {
            None
        };
        Self {
            trigger: self.trigger.clone(),
            state,
            acquired_by,
        }
    }

    pub fn acquired(&self, instance_id: &str) -> Self {
        Self {
            trigger: self.trigger.clone(),
            state: TriggerState::Acquired,
            acquired_by: Some(instance_id.to_string()),
        }
    }
}

fn encode_schedule(schedule: &TriggerSchedule) -> AttributeValue {
    let mut map: HashMap<String, AttributeValue> = HashMap::new();
    match schedule {
        TriggerSchedule::Simple {
            repeat_count,
            repeat_interval_ms,
            times_triggered,
        } => {
            map.insert(SCHEDULE_KIND.into(), codec::encode_string("Simple"));
            map.insert(
                SCHEDULE_REPEAT_COUNT.into(),
                codec::encode_i64(i64::from(*repeat_count)),
            );
            map.insert(
                SCHEDULE_REPEAT_INTERVAL.into(),
                codec::encode_i64(*repeat_interval_ms),
            );
            map.insert(
                SCHEDULE_TIMES_TRIGGERED.into(),
                codec::encode_i64(i64::from(*times_triggered)),
            );
        }
        TriggerSchedule::Cron {
            expression,
            time_zone,
        } => {
            map.insert(SCHEDULE_KIND.into(), codec::encode_string("Cron"));
            map.insert(SCHEDULE_EXPRESSION.into(), codec::encode_string(expression));
            map.insert(SCHEDULE_TIME_ZONE.into(), codec::encode_string(time_zone));
        }
    }
    AttributeValue::M(map)
}

fn decode_schedule(record: &Item) -> Result<TriggerSchedule, RecordError> {
    let map = codec::required_nested(record, ATTR_SCHEDULE)?;
    match codec::required_string(map, SCHEDULE_KIND)?.as_str() {
        "Simple" => Ok(TriggerSchedule::Simple {
            repeat_count: codec::required_i32(map, SCHEDULE_REPEAT_COUNT)?,
            repeat_interval_ms: codec::required_i64(map, SCHEDULE_REPEAT_INTERVAL)?,
            times_triggered: codec::required_i32(map, SCHEDULE_TIMES_TRIGGERED)?,
        }),
        "Cron" => Ok(TriggerSchedule::Cron {
            expression: codec::required_string(map, SCHEDULE_EXPRESSION)?,
            time_zone: codec::required_string(map, SCHEDULE_TIME_ZONE)?,
        }),
        other => Err(RecordError::Malformed {
            name: format!("{}.{}", ATTR_SCHEDULE, SCHEDULE_KIND),
            message: format!("unknown schedule kind {:?}", other),
        }),
    }
}

/// Read just the state attribute of a trigger item.
pub(crate) fn decode_state(record: &Item) -> Result<TriggerState, RecordError> {
    codec::required_string(record, ATTR_STATE)?
        .parse()
        .map_err(|message| RecordError::Malformed {
            name: ATTR_STATE.to_string(),
            message,
        })
}

impl DynamoEntity for StoredTrigger {
    const TABLE: TableKind = TableKind::Trigger;

    fn key(&self) -> Item {
        super::trigger_key(&self.trigger.key)
    }

    fn to_record(&self) -> Result<Item, RecordError> {
        let t = &self.trigger;
        let mut item = self.key();
        item.insert(ATTR_JOB_GROUP.into(), codec::encode_string(&t.job_key.group));
        item.insert(ATTR_JOB_NAME.into(), codec::encode_string(&t.job_key.name));
        item.insert(
            ATTR_DESCRIPTION.into(),
            codec::encode_optional_string(t.description.as_deref()),
        );
        item.insert(
            ATTR_CALENDAR_NAME.into(),
            codec::encode_optional_string(t.calendar_name.as_deref()),
        );
        item.insert(ATTR_JOB_DATA.into(), codec::encode_map(ATTR_JOB_DATA, &t.job_data)?);
        item.insert(ATTR_PRIORITY.into(), codec::encode_i64(i64::from(t.priority)));
        item.insert(
            ATTR_MISFIRE_INSTRUCTION.into(),
            codec::encode_i64(i64::from(t.misfire_instruction)),
        );
        item.insert(ATTR_START_TIME.into(), codec::encode_timestamp(t.start_time));
        item.insert(ATTR_END_TIME.into(), codec::encode_optional_timestamp(t.end_time));
        item.insert(
            ATTR_NEXT_FIRE_TIME.into(),
            codec::encode_optional_timestamp(t.next_fire_time),
        );
        item.insert(
            ATTR_PREVIOUS_FIRE_TIME.into(),
            codec::encode_optional_timestamp(t.previous_fire_time),
        );
        item.insert(ATTR_SCHEDULE.into(), encode_schedule(&t.schedule));
        item.insert(ATTR_STATE.into(), codec::encode_string(self.state.as_str()));
        // Absent rather than null so `attribute_not_exists` guards work
        if let Some(owner) = &self.acquired_by {
            item.insert(ATTR_ACQUIRED_BY.into(), codec::encode_string(owner));
        }
        Ok(item)
    }
}

impl FromRecord for StoredTrigger {
    fn from_record(record: &Item) -> Result<Self, RecordError> {
        let trigger = Trigger {
            key: TriggerKey::new(
                codec::required_string(record, ATTR_GROUP)?,
                codec::required_string(record, ATTR_NAME)?,
            ),
            job_key: JobKey::new(
                codec::required_string(record, ATTR_JOB_GROUP)?,
                codec::required_string(record, ATTR_JOB_NAME)?,
            ),
            description: codec::optional_string(record, ATTR_DESCRIPTION)?,
            calendar_name: codec::optional_string(record, ATTR_CALENDAR_NAME)?,
            job_data: codec::required_map(record, ATTR_JOB_DATA)?,
            priority: codec::required_i32(record, ATTR_PRIORITY)?,
            misfire_instruction: codec::required_i32(record, ATTR_MISFIRE_INSTRUCTION)?,
            start_time: codec::required_timestamp(record, ATTR_START_TIME)?,
            end_time: codec::optional_timestamp(record, ATTR_END_TIME)?,
            next_fire_time: codec::optional_timestamp(record, ATTR_NEXT_FIRE_TIME)?,
            previous_fire_time: codec::optional_timestamp(record, ATTR_PREVIOUS_FIRE_TIME)?,
            schedule: decode_schedule(record)?,
        };

        Ok(Self {
            trigger,
            state: decode_state(record)?,
            acquired_by: codec::optional_string(record, ATTR_ACQUIRED_BY)?,
        })
    }
}
