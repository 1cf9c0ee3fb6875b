//! Idempotent provisioning of the six job store tables.

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::{debug, info, instrument, warn};

use crate::backend::{ItemStore, TableDefinition, TableStatus};
use crate::{StoreError, TableKind, TableNames, Throughput};

/// Page size used when listing existing tables.
pub const LIST_TABLES_PAGE_SIZE: i32 = 10;

/// Which tables a bootstrap run created and which were already there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Ensures every table exists with its key schema before first use.
pub struct Bootstrapper {
    store: Arc<dyn ItemStore>,
    tables: TableNames,
    throughput: Throughput,
}

impl Bootstrapper {
    pub fn new(store: Arc<dyn ItemStore>, tables: TableNames) -> Self {
        Self::with_throughput(store, tables, Throughput::default())
    }

    pub fn with_throughput(
        store: Arc<dyn ItemStore>,
        tables: TableNames,
        throughput: Throughput,
    ) -> Self {
        Self {
            store,
            tables,
            throughput,
        }
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Create request for one table.
    pub fn definition(&self, kind: TableKind) -> TableDefinition {
        TableDefinition {
            name: self.tables.name(kind).to_string(),
            key_schema: kind.key_schema(),
            throughput: self.throughput,
        }
    }

    /// Create each missing table. Does not wait for created tables to become
    /// active; immediate reads may see `TableNotFound` until they are.
    #[instrument(skip(self), fields(prefix = %self.tables.prefix()))]
    pub async fn bootstrap(&self) -> Result<BootstrapReport, StoreError> {
        let mut report = BootstrapReport::default();

        for kind in TableKind::ALL {
            let name = self.tables.name(kind);
            if self.table_exists(name).await? {
                debug!(table = name, "table exists");
                report.existing.push(name.to_string());
                continue;
            }

            let status = self.store.create_table(&self.definition(kind)).await?;
            info!(table = name, ?status, "created table");
            report.created.push(name.to_string());
        }

        Ok(report)
    }

    /// Page through the table listing looking for `name`.
    pub async fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let mut start: Option<String> = None;
        loop {
            let page = self
                .store
                .list_tables(LIST_TABLES_PAGE_SIZE, start.as_deref())
                .await?;

            if page.table_names.iter().any(|t| t == name) {
                return Ok(true);
            }

            match page.last_evaluated_table_name {
                Some(next) => start = Some(next),
                None => return Ok(false),
            }
        }
    }

    /// Poll until every table reports `ACTIVE`, giving up after `max_elapsed`.
    #[instrument(skip(self))]
    pub async fn wait_until_active(&self, max_elapsed: Duration) -> Result<(), StoreError> {
        for (_, name) in self.tables.iter() {
            let store = &self.store;
            let policy = ExponentialBackoff {
                initial_interval: Duration::from_millis(200),
                max_interval: Duration::from_secs(5),
                max_elapsed_time: Some(max_elapsed),
                ..Default::default()
            };

            backoff::future::retry(policy, || async move {
                match store.describe_table(name).await {
                    Ok(description) if description.status == TableStatus::Active => Ok(()),
                    Ok(description) => {
                        debug!(table = name, status = ?description.status, "not active yet");
                        Err(backoff::Error::transient(StoreError::Timeout(name.to_string())))
                    }
                    Err(e) if e.is_transient() => {
                        debug!(table = name, error = %e, "describe failed, retrying");
                        Err(backoff::Error::transient(StoreError::Timeout(name.to_string())))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            })
            .await?;

            debug!(table = name, "active");
        }

        Ok(())
    }

    /// Delete whichever of the tables exist. Returns the deleted names.
    #[instrument(skip(self), fields(prefix = %self.tables.prefix()))]
    pub async fn teardown(&self) -> Result<Vec<String>, StoreError> {
        let mut deleted = Vec::new();
        for (_, name) in self.tables.iter() {
            match self.store.delete_table(name).await {
                Ok(()) => {
                    info!(table = name, "deleted table");
                    deleted.push(name.to_string());
                }
                Err(StoreError::TableNotFound(_)) => {
                    warn!(table = name, "table already absent");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}
