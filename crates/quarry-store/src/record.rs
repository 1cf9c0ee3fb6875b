//! The contract every storable entity implements.

use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::{RecordError, TableKind, TableNames};

/// A flat attribute record: one stored item.
pub type Item = HashMap<String, AttributeValue>;

/// An entity that can be written to one of the job store tables.
///
/// This is the only coupling point between [`Repository`](crate::Repository)
/// and concrete domain types.
pub trait DynamoEntity: Send + Sync + Sized + 'static {
    /// The table this entity lives in.
    const TABLE: TableKind;

    /// Key attributes, derived from identity fields only.
    fn key(&self) -> Item;

    /// Full record, including the key attributes.
    fn to_record(&self) -> Result<Item, RecordError>;

    /// Resolved table name under the given layout.
    fn table_name(tables: &TableNames) -> &str {
        tables.name(Self::TABLE)
    }
}

/// Entities that can be rebuilt from a record without outside context.
pub trait FromRecord: Sized {
    fn from_record(record: &Item) -> Result<Self, RecordError>;
}

/// Rebuilds an entity from a record. Used in place of [`FromRecord`] when
/// decoding needs injected capabilities.
pub type RecordFactory<T> = Arc<dyn Fn(&Item) -> Result<T, RecordError> + Send + Sync>;
