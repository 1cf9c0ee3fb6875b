//! Quarry: DynamoDB job store administration
//!
//! Subcommands:
//! - `bootstrap`: Create any missing job store tables
//! - `describe`: Show status and key schema of each table
//! - `instances`: List scheduler instances and their last check-in
//! - `teardown`: Delete every job store table

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use quarry_store::{DynamoConfig, TableNames, Throughput};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod tables;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "DynamoDB job store administration", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: Connection,

    #[command(subcommand)]
    command: Commands,
}

/// Where the tables live.
#[derive(Args)]
struct Connection {
    /// Prefix prepended to every table name
    #[arg(long, env = "QUARRY_TABLE_PREFIX", default_value = "", global = true)]
    table_prefix: String,

    /// Endpoint override, e.g. http://localhost:8000 for DynamoDB Local
    #[arg(long, env = "QUARRY_DYNAMO_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// AWS region (defaults to the SDK provider chain)
    #[arg(long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    timeout: u64,
}

impl Connection {
    fn dynamo(&self) -> DynamoConfig {
        DynamoConfig {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            operation_timeout: Some(Duration::from_secs(self.timeout)),
        }
    }

    fn tables(&self) -> TableNames {
        TableNames::with_prefix(self.table_prefix.as_str())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create any missing tables. Existing tables are left untouched.
    Bootstrap {
        /// Provisioned read capacity for new tables
        #[arg(long, default_value = "1")]
        read_capacity: i64,

        /// Provisioned write capacity for new tables
        #[arg(long, default_value = "1")]
        write_capacity: i64,

        /// Wait up to this many seconds for all tables to become active
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },

    /// Show status and key schema of each table
    Describe,

    /// List scheduler instances that have checked in
    Instances,

    /// Delete every table and all data in it
    Teardown {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "quarry=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let dynamo = cli.connection.dynamo();
    let tables = cli.connection.tables();

    match cli.command {
        Commands::Bootstrap {
            read_capacity,
            write_capacity,
            wait,
        } => {
            let throughput = Throughput {
                read_capacity_units: read_capacity,
                write_capacity_units: write_capacity,
            };
            tables::bootstrap(&dynamo, tables, throughput, wait.map(Duration::from_secs)).await
        }
        Commands::Describe => tables::describe(&dynamo, tables).await,
        Commands::Instances => tables::instances(&dynamo, tables).await,
        Commands::Teardown { yes } => {
            if !yes {
                return Err(miette::miette!(
                    "refusing to delete tables without --yes"
                ));
            }
            tables::teardown(&dynamo, tables).await
        }
    }
}
