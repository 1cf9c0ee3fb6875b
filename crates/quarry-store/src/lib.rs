//! DynamoDB persistence primitives for Quarry.
//!
//! This crate maps typed entities onto flat attribute records and stores
//! them in table-oriented key-value storage:
//!
//! - **Codec**: scalar and nested value conversion to `AttributeValue`
//! - **Record contract**: [`DynamoEntity`] / [`FromRecord`], implemented per entity
//! - **Repository**: generic load / store / conditional store / delete / scan
//! - **Conditions**: structured predicates compiled to aliased expressions
//! - **Backends**: DynamoDB via `aws-sdk-dynamodb`, and an in-memory store
//! - **Bootstrap**: idempotent creation of the six job store tables

pub mod backend;
mod bootstrap;
pub mod codec;
mod condition;
mod config;
mod error;
mod record;
mod repository;

pub use aws_sdk_dynamodb::types::AttributeValue;
pub use backend::{
    DynamoConfig, DynamoItemStore, ItemStore, MemoryItemStore, PutOutcome, TableDefinition,
    TableDescription, TablePage, TableStatus,
};
pub use bootstrap::{BootstrapReport, Bootstrapper, LIST_TABLES_PAGE_SIZE};
pub use codec::DataMap;
pub use condition::{Clause, CompiledCondition, Condition, Predicate};
pub use config::{ATTR_GROUP, ATTR_INSTANCE_ID, ATTR_NAME, KeySchema, TableKind, TableNames, Throughput};
pub use error::{RecordError, StoreError};
pub use record::{DynamoEntity, FromRecord, Item, RecordFactory};
pub use repository::{ConditionalWrite, Repository, validate_key};
