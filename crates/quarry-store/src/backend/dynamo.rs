//! DynamoDB implementation of [`ItemStore`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, KeySchemaElement, KeyType, ProvisionedThroughput, ReturnValue,
    ReturnValuesOnConditionCheckFailure, ScalarAttributeType,
};
use tracing::debug;

use super::{ItemStore, PutOutcome, TableDefinition, TableDescription, TablePage, TableStatus};
use crate::{Condition, Item, KeySchema, StoreError};

/// Connection settings for the DynamoDB backend.
#[derive(Debug, Clone, Default)]
pub struct DynamoConfig {
    /// AWS region (uses the SDK default chain if not specified).
    pub region: Option<String>,
    /// Endpoint override, e.g. DynamoDB Local or LocalStack.
    pub endpoint: Option<String>,
    /// Per-operation timeout.
    pub operation_timeout: Option<Duration>,
}

impl DynamoConfig {
    /// Build a client from the default credential chain plus these overrides.
    pub async fn load_client(&self) -> Client {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        // Inherit HTTP client, retry config and sleep impl from the SdkConfig
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout) = self.operation_timeout {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }

        Client::from_conf(builder.build())
    }
}

/// DynamoDB-backed item store. Cloning shares the underlying client.
#[derive(Clone)]
pub struct DynamoItemStore {
    client: Client,
}

impl fmt::Debug for DynamoItemStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoItemStore").finish_non_exhaustive()
    }
}

impl DynamoItemStore {
    pub async fn connect(config: &DynamoConfig) -> Self {
        Self::from_client(config.load_client().await)
    }

    /// Wrap a pre-built client (for testing).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Map an SDK failure to a store fault, recognising missing tables.
fn fault<E, R>(operation: &'static str, table: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);

    if code.as_deref() == Some("ResourceNotFoundException") {
        return StoreError::TableNotFound(table.to_string());
    }

    StoreError::service(operation, table, code, DisplayErrorContext(&err).to_string())
}

fn non_empty(item: Option<&Item>) -> Option<Item> {
    item.filter(|i| !i.is_empty()).cloned()
}

fn key_schema_from(elements: &[KeySchemaElement]) -> KeySchema {
    let mut hash = String::new();
    let mut range = None;
    for element in elements {
        match element.key_type() {
            KeyType::Hash => hash = element.attribute_name().to_string(),
            KeyType::Range => range = Some(element.attribute_name().to_string()),
            _ => {}
        }
    }
    KeySchema { hash, range }
}

#[async_trait]
impl ItemStore for DynamoItemStore {
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, StoreError> {
        debug!(table, "GetItem");
        let response = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key.clone()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| fault("GetItem", table, e))?;

        Ok(response.item().cloned())
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<PutOutcome, StoreError> {
        let mut request = self.client.put_item().table_name(table).set_item(Some(item));

        if let Some(condition) = condition.filter(|c| !c.is_empty()) {
            let compiled = condition.compile();
            debug!(table, condition = %compiled.expression, "conditional PutItem");
            request = request
                .condition_expression(compiled.expression)
                .set_expression_attribute_names(Some(compiled.names))
                .set_expression_attribute_values(
                    Some(compiled.values).filter(|values| !values.is_empty()),
                )
                .return_values(ReturnValue::AllOld)
                .return_values_on_condition_check_failure(
                    ReturnValuesOnConditionCheckFailure::AllOld,
                );
        } else {
            debug!(table, "PutItem");
        }

        match request.send().await {
            Ok(output) => Ok(PutOutcome::Written {
                previous: non_empty(output.attributes()),
            }),
            Err(err) => {
                if let Some(PutItemError::ConditionalCheckFailedException(rejected)) =
                    err.as_service_error()
                {
                    return Ok(PutOutcome::ConditionFailed {
                        current: non_empty(rejected.item()),
                    });
                }
                Err(fault("PutItem", table, err))
            }
        }
    }

    async fn delete_item(&self, table: &str, key: &Item) -> Result<(), StoreError> {
        debug!(table, "DeleteItem");
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key.clone()))
            .send()
            .await
            .map_err(|e| fault("DeleteItem", table, e))?;
        Ok(())
    }

    async fn scan(
        &self,
        table: &str,
        filter: Option<&Condition>,
    ) -> Result<Vec<Item>, StoreError> {
        let compiled = filter.filter(|c| !c.is_empty()).map(Condition::compile);
        let mut items = Vec::new();
        let mut last_evaluated_key = None;

        loop {
            let mut request = self.client.scan().table_name(table);

            if let Some(compiled) = &compiled {
                request = request
                    .filter_expression(compiled.expression.clone())
                    .set_expression_attribute_names(Some(compiled.names.clone()))
                    .set_expression_attribute_values(
                        Some(compiled.values.clone()).filter(|values| !values.is_empty()),
                    );
            }

            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let response = request
                .send()
                .await
                .map_err(|e| fault("Scan", table, e))?;

            items.extend(response.items().iter().cloned());

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => last_evaluated_key = Some(key.clone()),
                _ => break,
            }
        }

        debug!(table, count = items.len(), "Scan");
        Ok(items)
    }

    async fn list_tables(
        &self,
        limit: i32,
        exclusive_start: Option<&str>,
    ) -> Result<TablePage, StoreError> {
        let response = self
            .client
            .list_tables()
            .limit(limit)
            .set_exclusive_start_table_name(exclusive_start.map(str::to_string))
            .send()
            .await
            .map_err(|e| fault("ListTables", "*", e))?;

        Ok(TablePage {
            table_names: response.table_names().to_vec(),
            last_evaluated_table_name: response.last_evaluated_table_name().map(str::to_string),
        })
    }

    async fn create_table(
        &self,
        definition: &TableDefinition,
    ) -> Result<TableStatus, StoreError> {
        let table = definition.name.as_str();
        let invalid = |e: aws_sdk_dynamodb::error::BuildError| {
            StoreError::InvalidArgument(format!("table definition for {}: {}", table, e))
        };

        let mut attribute_definitions = Vec::new();
        let mut key_schema = Vec::new();
        let key_types = [KeyType::Hash, KeyType::Range];
        for (attribute, key_type) in definition.key_schema.attributes().zip(key_types) {
            attribute_definitions.push(
                AttributeDefinition::builder()
                    .attribute_name(attribute)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(invalid)?,
            );
            key_schema.push(
                KeySchemaElement::builder()
                    .attribute_name(attribute)
                    .key_type(key_type)
                    .build()
                    .map_err(invalid)?,
            );
        }

        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(definition.throughput.read_capacity_units)
            .write_capacity_units(definition.throughput.write_capacity_units)
            .build()
            .map_err(invalid)?;

        let response = self
            .client
            .create_table()
            .table_name(table)
            .set_attribute_definitions(Some(attribute_definitions))
            .set_key_schema(Some(key_schema))
            .provisioned_throughput(throughput)
            .send()
            .await
            .map_err(|e| fault("CreateTable", table, e))?;

        Ok(response
            .table_description()
            .and_then(|d| d.table_status())
            .map(|s| TableStatus::parse(s.as_str()))
            .unwrap_or(TableStatus::Creating))
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.client
            .delete_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| fault("DeleteTable", table, e))?;
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError> {
        let response = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| fault("DescribeTable", table, e))?;

        let description = response.table().ok_or_else(|| {
            StoreError::service("DescribeTable", table, None, "response had no table")
        })?;

        Ok(TableDescription {
            name: description.table_name().unwrap_or(table).to_string(),
            status: description
                .table_status()
                .map(|s| TableStatus::parse(s.as_str()))
                .unwrap_or(TableStatus::Creating),
            key_schema: key_schema_from(description.key_schema()),
            item_count: description.item_count(),
        })
    }
}
