//! Generic entity repository over an [`ItemStore`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, instrument};

use crate::backend::{ItemStore, PutOutcome, TableDescription};
use crate::{Condition, DynamoEntity, FromRecord, Item, RecordFactory, StoreError, TableNames};

/// Outcome of [`Repository::store_conditional`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWrite {
    /// The predicate held and the entity was written. `previous` is the item
    /// it replaced, if any.
    Stored { previous: Option<Item> },
    /// The predicate did not hold; nothing was written.
    Conflict { current: Option<Item> },
}

impl ConditionalWrite {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConditionalWrite::Conflict { .. })
    }
}

/// CRUD and scan for one entity type against its table.
///
/// Holds no state between calls beyond the shared store handle; every
/// operation is exactly one item-level request.
pub struct Repository<T> {
    store: Arc<dyn ItemStore>,
    table: String,
    factory: RecordFactory<T>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
            factory: Arc::clone(&self.factory),
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<T: DynamoEntity + FromRecord> Repository<T> {
    pub fn new(store: Arc<dyn ItemStore>, tables: &TableNames) -> Self {
        Self::with_factory(store, tables, Arc::new(T::from_record))
    }
}

impl<T: DynamoEntity> Repository<T> {
    /// Repository whose decoding needs injected context (e.g. a job type
    /// resolver).
    pub fn with_factory(
        store: Arc<dyn ItemStore>,
        tables: &TableNames,
        factory: RecordFactory<T>,
    ) -> Self {
        Self {
            store,
            table: T::table_name(tables).to_string(),
            factory,
            _entity: PhantomData,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Rebuild an entity from a raw item.
    pub fn decode(&self, item: &Item) -> Result<T, StoreError> {
        Ok((self.factory)(item)?)
    }

    /// Point lookup. `Ok(None)` when nothing is stored under `key`.
    #[instrument(skip(self, key), fields(table = %self.table))]
    pub async fn load(&self, key: &Item) -> Result<Option<T>, StoreError> {
        validate_key(key)?;
        match self.store.get_item(&self.table, key).await? {
            Some(item) => self.decode(&item).map(Some),
            None => {
                debug!("no item");
                Ok(None)
            }
        }
    }

    /// Unconditional full-item replace.
    #[instrument(skip(self, entity), fields(table = %self.table))]
    pub async fn store(&self, entity: &T) -> Result<(), StoreError> {
        let item = self.record_of(entity)?;
        self.store.put_item(&self.table, item, None).await?;
        Ok(())
    }

    /// Write only if `condition` holds against the current item.
    #[instrument(skip(self, entity, condition), fields(table = %self.table))]
    pub async fn store_conditional(
        &self,
        entity: &T,
        condition: &Condition,
    ) -> Result<ConditionalWrite, StoreError> {
        if condition.is_empty() {
            return Err(StoreError::InvalidArgument(
                "conditional store requires at least one clause".to_string(),
            ));
        }

        let item = self.record_of(entity)?;
        let outcome = match self.store.put_item(&self.table, item, Some(condition)).await? {
            PutOutcome::Written { previous } => ConditionalWrite::Stored { previous },
            PutOutcome::ConditionFailed { current } => {
                debug!("condition failed");
                ConditionalWrite::Conflict { current }
            }
        };
        Ok(outcome)
    }

    /// Delete by key. Absent keys are not an error.
    #[instrument(skip(self, key), fields(table = %self.table))]
    pub async fn delete(&self, key: &Item) -> Result<(), StoreError> {
        validate_key(key)?;
        self.store.delete_item(&self.table, key).await
    }

    /// Every entity matching `filter`, fully materialized.
    #[instrument(skip(self, filter), fields(table = %self.table))]
    pub async fn scan(&self, filter: Option<&Condition>) -> Result<Vec<T>, StoreError> {
        let items = self.store.scan(&self.table, filter).await?;
        debug!(count = items.len(), "scanned");
        items.iter().map(|item| self.decode(item)).collect()
    }

    /// Raw items matching `filter`, without decoding.
    pub async fn scan_items(&self, filter: Option<&Condition>) -> Result<Vec<Item>, StoreError> {
        self.store.scan(&self.table, filter).await
    }

    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn delete_table(&self) -> Result<(), StoreError> {
        self.store.delete_table(&self.table).await
    }

    pub async fn describe_table(&self) -> Result<TableDescription, StoreError> {
        self.store.describe_table(&self.table).await
    }

    fn record_of(&self, entity: &T) -> Result<Item, StoreError> {
        validate_key(&entity.key())?;
        Ok(entity.to_record()?)
    }
}

/// A key must be non-empty and made of non-empty strings.
pub fn validate_key(key: &Item) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("empty key".to_string()));
    }
    for (name, value) in key {
        match value {
            AttributeValue::S(s) if !s.is_empty() => {}
            AttributeValue::S(_) => {
                return Err(StoreError::InvalidArgument(format!(
                    "key attribute {} is empty",
                    name
                )));
            }
            _ => {
                return Err(StoreError::InvalidArgument(format!(
                    "key attribute {} must be a string",
                    name
                )));
            }
        }
    }
    Ok(())
}
