//! Table administration commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use miette::Result;
use quarry_jobstore::{JobStore, JobStoreConfig, JobTypeRegistry};
use quarry_store::{
    Bootstrapper, DynamoConfig, DynamoItemStore, ItemStore, StoreError, TableNames, Throughput,
};
use tracing::info;

async fn connect(dynamo: &DynamoConfig) -> Arc<dyn ItemStore> {
    Arc::new(DynamoItemStore::connect(dynamo).await)
}

/// Create missing tables, optionally waiting for them to become active.
pub async fn bootstrap(
    dynamo: &DynamoConfig,
    tables: TableNames,
    throughput: Throughput,
    wait: Option<Duration>,
) -> Result<()> {
    let bootstrapper = Bootstrapper::with_throughput(connect(dynamo).await, tables, throughput);

    let report = bootstrapper
        .bootstrap()
        .await
        .map_err(|e| miette::miette!("bootstrap failed: {}", e))?;

    for name in &report.created {
        println!("created  {}", name);
    }
    for name in &report.existing {
        println!("exists   {}", name);
    }

    if let Some(max_elapsed) = wait {
        info!(?max_elapsed, "waiting for tables to become active");
        bootstrapper
            .wait_until_active(max_elapsed)
            .await
            .map_err(|e| miette::miette!("tables did not become active: {}", e))?;
        println!("all tables active");
    }

    Ok(())
}

pub async fn describe(dynamo: &DynamoConfig, tables: TableNames) -> Result<()> {
    let store = connect(dynamo).await;

    for (_, name) in tables.iter() {
        match store.describe_table(name).await {
            Ok(description) => {
                let key: Vec<&str> = description.key_schema.attributes().collect();
                let items = description
                    .item_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{:<24} {:<10} key=({}) items={}",
                    name,
                    format!("{:?}", description.status),
                    key.join(", "),
                    items
                );
            }
            Err(StoreError::TableNotFound(_)) => println!("{:<24} missing", name),
            Err(e) => return Err(miette::miette!("describe {} failed: {}", name, e)),
        }
    }

    Ok(())
}

pub async fn instances(dynamo: &DynamoConfig, tables: TableNames) -> Result<()> {
    let job_store = JobStore::new(
        connect(dynamo).await,
        Arc::new(JobTypeRegistry::new()),
        JobStoreConfig::new(tables),
    );

    let now = Utc::now();
    let instances = job_store
        .scheduler_instances()
        .await
        .map_err(|e| miette::miette!("failed to list instances: {}", e))?;

    if instances.is_empty() {
        println!("no scheduler instances");
    }
    for instance in instances {
        let status = if instance.is_overdue(now) {
            "overdue"
        } else {
            "live"
        };
        println!(
            "{:<40} {:<8} last check-in {}",
            instance.instance_id,
            status,
            instance.last_checkin.to_rfc3339()
        );
    }

    Ok(())
}

pub async fn teardown(dynamo: &DynamoConfig, tables: TableNames) -> Result<()> {
    let deleted = Bootstrapper::new(connect(dynamo).await, tables)
        .teardown()
        .await
        .map_err(|e| miette::miette!("teardown failed: {}", e))?;

    for name in &deleted {
        println!("deleted  {}", name);
    }
    info!(count = deleted.len(), "teardown complete");
    Ok(())
}
