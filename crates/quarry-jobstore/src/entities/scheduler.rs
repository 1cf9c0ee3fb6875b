use quarry_store::{
    ATTR_INSTANCE_ID, DynamoEntity, FromRecord, Item, RecordError, TableKind, codec,
};

use crate::SchedulerInstance;

const ATTR_LAST_CHECKIN: &str = "LastCheckin";
const ATTR_CHECKIN_INTERVAL: &str = "CheckinInterval";

impl DynamoEntity for SchedulerInstance {
    const TABLE: TableKind = TableKind::Scheduler;

    fn key(&self) -> Item {
        super::instance_key(&self.instance_id)
    }

    fn to_record(&self) -> Result<Item, RecordError> {
        let mut item = self.key();
        item.insert(
            ATTR_LAST_CHECKIN.into(),
            codec::encode_timestamp(self.last_checkin),
        );
        item.insert(
            ATTR_CHECKIN_INTERVAL.into(),
            codec::encode_i64(self.checkin_interval_ms),
        );
        Ok(item)
    }
}

impl FromRecord for SchedulerInstance {
    fn from_record(record: &Item) -> Result<Self, RecordError> {
        Ok(Self {
            instance_id: codec::required_string(record, ATTR_INSTANCE_ID)?,
            last_checkin: codec::required_timestamp(record, ATTR_LAST_CHECKIN)?,
            checkin_interval_ms: codec::required_i64(record, ATTR_CHECKIN_INTERVAL)?,
        })
    }
}
