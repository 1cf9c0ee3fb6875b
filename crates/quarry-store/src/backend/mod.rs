//! The backing-store seam.
//!
//! [`ItemStore`] is the item-level API the repository and bootstrapper are
//! written against. [`DynamoItemStore`] talks to DynamoDB;
//! [`MemoryItemStore`] keeps tables in process with the same per-item
//! atomicity and condition semantics.

mod dynamo;
mod memory;

pub use dynamo::{DynamoConfig, DynamoItemStore};
pub use memory::MemoryItemStore;

use async_trait::async_trait;

use crate::{Condition, Item, KeySchema, StoreError, Throughput};

/// Result of a put.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The item was written. `previous` is the replaced item, when the put
    /// was conditional and an item existed.
    Written { previous: Option<Item> },
    /// The condition did not hold; nothing was written. `current` is the
    /// item that defeated it, when the store returns it.
    ConditionFailed { current: Option<Item> },
}

/// One page of table names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePage {
    pub table_names: Vec<String>,
    /// Continuation token; `None` once the listing is exhausted.
    pub last_evaluated_table_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub key_schema: KeySchema,
    pub throughput: Throughput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Other(String),
}

impl TableStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATING" => TableStatus::Creating,
            "ACTIVE" => TableStatus::Active,
            "UPDATING" => TableStatus::Updating,
            "DELETING" => TableStatus::Deleting,
            other => TableStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub status: TableStatus,
    pub key_schema: KeySchema,
    pub item_count: Option<i64>,
}

/// Item-level operations against a table-oriented key-value store.
///
/// Each call is a single request. Implementations must be safe to share
/// across tasks and must not retry on their own beyond what the transport
/// is configured to do.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point lookup by full key. `Ok(None)` when no item matches.
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, StoreError>;

    /// Full-item replace, optionally guarded by a condition evaluated
    /// atomically against the current item.
    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<PutOutcome, StoreError>;

    /// Delete by key. Deleting an absent key succeeds.
    async fn delete_item(&self, table: &str, key: &Item) -> Result<(), StoreError>;

    /// Every item matching `filter`, across all pages.
    async fn scan(&self, table: &str, filter: Option<&Condition>)
    -> Result<Vec<Item>, StoreError>;

    async fn list_tables(
        &self,
        limit: i32,
        exclusive_start: Option<&str>,
    ) -> Result<TablePage, StoreError>;

    /// Issue a create request; does not wait for the table to become active.
    async fn create_table(&self, definition: &TableDefinition)
    -> Result<TableStatus, StoreError>;

    async fn delete_table(&self, table: &str) -> Result<(), StoreError>;

    async fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError>;
}
