use quarry_store::{ATTR_NAME, DynamoEntity, FromRecord, Item, RecordError, TableKind, codec};

use crate::Calendar;

const ATTR_DESCRIPTION: &str = "Description";
const ATTR_DEFINITION: &str = "Definition";

impl DynamoEntity for Calendar {
    const TABLE: TableKind = TableKind::Calendar;

    fn key(&self) -> Item {
        super::name_key(&self.name)
    }

    fn to_record(&self) -> Result<Item, RecordError> {
        let definition =
            serde_json::to_string(&self.definition).map_err(|e| RecordError::Malformed {
                name: ATTR_DEFINITION.to_string(),
                message: e.to_string(),
            })?;

        let mut item = self.key();
        item.insert(
            ATTR_DESCRIPTION.into(),
            codec::encode_optional_string(self.description.as_deref()),
        );
        item.insert(ATTR_DEFINITION.into(), codec::encode_string(definition));
        Ok(item)
    }
}

impl FromRecord for Calendar {
    fn from_record(record: &Item) -> Result<Self, RecordError> {
        let raw = codec::required_string(record, ATTR_DEFINITION)?;
        let definition = serde_json::from_str(&raw).map_err(|e| RecordError::Malformed {
            name: ATTR_DEFINITION.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            name: codec::required_string(record, ATTR_NAME)?,
            description: codec::optional_string(record, ATTR_DESCRIPTION)?,
            definition,
        })
    }
}
