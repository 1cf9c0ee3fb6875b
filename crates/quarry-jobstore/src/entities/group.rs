use quarry_store::{ATTR_NAME, DynamoEntity, FromRecord, Item, RecordError, TableKind, codec};

use super::ATTR_STATE;
use crate::GroupState;

fn group_record(name: &str, state: GroupState) -> Item {
    let mut item = super::name_key(name);
    item.insert(ATTR_STATE.into(), codec::encode_string(state.as_str()));
    item
}

fn decode_group(record: &Item) -> Result<(String, GroupState), RecordError> {
    let name = codec::required_string(record, ATTR_NAME)?;
    // Records written before pause tracking carry no state and are active
    let state = match codec::optional_string(record, ATTR_STATE)? {
        Some(raw) => raw.parse().map_err(|message| RecordError::Malformed {
            name: ATTR_STATE.to_string(),
            message,
        })?,
        None => GroupState::Active,
    };
    Ok((name, state))
}

/// A known job group and its pause marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobGroup {
    pub name: String,
    pub state: GroupState,
}

impl JobGroup {
    pub fn new(name: impl Into<String>, state: GroupState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

impl DynamoEntity for JobGroup {
    const TABLE: TableKind = TableKind::JobGroup;

    fn key(&self) -> Item {
        super::name_key(&self.name)
    }

    fn to_record(&self) -> Result<Item, RecordError> {
        Ok(group_record(&self.name, self.state))
    }
}

impl FromRecord for JobGroup {
    fn from_record(record: &Item) -> Result<Self, RecordError> {
        let (name, state) = decode_group(record)?;
        Ok(Self { name, state })
    }
}

/// A known trigger group and its pause marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerGroup {
    pub name: String,
    pub state: GroupState,
}

impl TriggerGroup {
    pub fn new(name: impl Into<String>, state: GroupState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

impl DynamoEntity for TriggerGroup {
    const TABLE: TableKind = TableKind::TriggerGroup;

    fn key(&self) -> Item {
        super::name_key(&self.name)
    }

    fn to_record(&self) -> Result<Item, RecordError> {
        Ok(group_record(&self.name, self.state))
    }
}

impl FromRecord for TriggerGroup {
    fn from_record(record: &Item) -> Result<Self, RecordError> {
        let (name, state) = decode_group(record)?;
        Ok(Self { name, state })
    }
}
