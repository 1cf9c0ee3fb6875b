//! In-process [`ItemStore`] used by tests and local runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::{ItemStore, PutOutcome, TableDefinition, TableDescription, TablePage, TableStatus};
use crate::{Condition, Item, KeySchema, StoreError};

#[derive(Debug)]
struct MemoryTable {
    key_schema: KeySchema,
    items: BTreeMap<Vec<String>, Item>,
}

impl MemoryTable {
    /// Extract the key tuple, requiring every key attribute as a string.
    fn key_of(&self, table: &str, item: &Item) -> Result<Vec<String>, StoreError> {
        self.key_schema
            .attributes()
            .map(|attribute| match item.get(attribute) {
                Some(AttributeValue::S(value)) => Ok(value.clone()),
                Some(_) => Err(StoreError::InvalidArgument(format!(
                    "key attribute {} of {} must be a string",
                    attribute, table
                ))),
                None => Err(StoreError::InvalidArgument(format!(
                    "missing key attribute {} for {}",
                    attribute, table
                ))),
            })
            .collect()
    }
}

/// Tables held in a [`DashMap`]. A put holds the table's shard lock while it
/// evaluates its condition and writes, so conditional writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    tables: DashMap<String, MemoryTable>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently held in `table`, if it exists.
    pub fn item_count(&self, table: &str) -> Option<usize> {
        self.tables.get(table).map(|t| t.items.len())
    }
}

fn not_found(table: &str) -> StoreError {
    StoreError::TableNotFound(table.to_string())
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, StoreError> {
        let entry = self.tables.get(table).ok_or_else(|| not_found(table))?;
        let key = entry.key_of(table, key)?;
        Ok(entry.items.get(&key).cloned())
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<PutOutcome, StoreError> {
        let mut entry = self.tables.get_mut(table).ok_or_else(|| not_found(table))?;
        let key = entry.key_of(table, &item)?;
        let current = entry.items.get(&key);

        if let Some(condition) = condition.filter(|c| !c.is_empty()) {
            if !condition.evaluate(current) {
                debug!(table, "condition failed");
                return Ok(PutOutcome::ConditionFailed {
                    current: current.cloned(),
                });
            }
        }

        let previous = entry.items.insert(key, item);
        Ok(PutOutcome::Written {
            previous: previous.filter(|_| condition.is_some_and(|c| !c.is_empty())),
        })
    }

    async fn delete_item(&self, table: &str, key: &Item) -> Result<(), StoreError> {
        let mut entry = self.tables.get_mut(table).ok_or_else(|| not_found(table))?;
        let key = entry.key_of(table, key)?;
        entry.items.remove(&key);
        Ok(())
    }

    async fn scan(
        &self,
        table: &str,
        filter: Option<&Condition>,
    ) -> Result<Vec<Item>, StoreError> {
        let entry = self.tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(entry
            .items
            .values()
            .filter(|item| filter.is_none_or(|f| f.evaluate(Some(item))))
            .cloned()
            .collect())
    }

    async fn list_tables(
        &self,
        limit: i32,
        exclusive_start: Option<&str>,
    ) -> Result<TablePage, StoreError> {
        if limit < 1 {
            return Err(StoreError::InvalidArgument(format!(
                "list limit must be positive, got {}",
                limit
            )));
        }

        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();

        let remaining: Vec<String> = names
            .into_iter()
            .filter(|name| exclusive_start.is_none_or(|start| name.as_str() > start))
            .collect();

        let limit = limit as usize;
        let more = remaining.len() > limit;
        let table_names: Vec<String> = remaining.into_iter().take(limit).collect();
        let last_evaluated_table_name = if more { table_names.last().cloned() } else { None };

        Ok(TablePage {
            table_names,
            last_evaluated_table_name,
        })
    }

    async fn create_table(
        &self,
        definition: &TableDefinition,
    ) -> Result<TableStatus, StoreError> {
        match self.tables.entry(definition.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::service(
                "CreateTable",
                definition.name.clone(),
                Some("ResourceInUseException".to_string()),
                "table already exists",
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryTable {
                    key_schema: definition.key_schema.clone(),
                    items: BTreeMap::new(),
                });
                Ok(TableStatus::Active)
            }
        }
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| not_found(table))
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError> {
        let entry = self.tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(TableDescription {
            name: table.to_string(),
            status: TableStatus::Active,
            key_schema: entry.key_schema.clone(),
            item_count: Some(entry.items.len() as i64),
        })
    }
}
