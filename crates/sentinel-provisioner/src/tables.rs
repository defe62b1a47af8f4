use std::time::Duration;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType, TableStatus, TimeToLiveSpecification,
};

use crate::error::ProvisionerError;
use sentinel_store::{GSI_PRINCIPAL, GSI_PROFILE, GSI_STATUS};

/// Backoff for the ACTIVE wait: 1s doubling to 30s, capped at 5 minutes
/// overall.
const WAIT_INITIAL: Duration = Duration::from_secs(1);
const WAIT_MAX: Duration = Duration::from_secs(30);
const WAIT_TOTAL: Duration = Duration::from_secs(300);

/// One table to provision. `principal_attr` is the partition key of the
/// `by-principal` GSI: `requester`, `invoker`, or `user` depending on the
/// store.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub principal_attr: &'static str,
}

/// The three Sentinel tables with their default names.
pub fn sentinel_tables() -> Vec<TableSpec> {
    vec![
        TableSpec {
            name: sentinel_store::APPROVAL_TABLE.to_string(),
            principal_attr: "requester",
        },
        TableSpec {
            name: sentinel_store::BREAKGLASS_TABLE.to_string(),
            principal_attr: "invoker",
        },
        TableSpec {
            name: sentinel_store::SESSION_TABLE.to_string(),
            principal_attr: "user",
        },
    ]
}

/// What happened to each table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

/// Create every table in `specs` that does not exist yet, wait for
/// ACTIVE, and enable TTL on `expires_at`.
pub async fn provision_tables(
    config: &aws_config::SdkConfig,
    specs: &[TableSpec],
) -> Result<Vec<(String, ProvisionOutcome)>, ProvisionerError> {
    let client = Client::new(config);
    let mut outcomes = Vec::with_capacity(specs.len());
    for spec in specs {
        let outcome = provision_table(&client, spec).await?;
        outcomes.push((spec.name.clone(), outcome));
    }
    Ok(outcomes)
}

async fn provision_table(
    client: &Client,
    spec: &TableSpec,
) -> Result<ProvisionOutcome, ProvisionerError> {
    let created = create_table(client, spec).await?;
    if created {
        wait_for_active(client, &spec.name).await?;
        enable_ttl(client, &spec.name).await?;
        tracing::info!(table = %spec.name, "table created");
        Ok(ProvisionOutcome::Created)
    } else {
        tracing::debug!(table = %spec.name, "table already exists");
        Ok(ProvisionOutcome::AlreadyExists)
    }
}

/// Returns `false` when the table already exists.
async fn create_table(client: &Client, spec: &TableSpec) -> Result<bool, ProvisionerError> {
    let result = client
        .create_table()
        .table_name(&spec.name)
        .attribute_definitions(attr_def("id")?)
        .attribute_definitions(attr_def(spec.principal_attr)?)
        .attribute_definitions(attr_def("status")?)
        .attribute_definitions(attr_def("profile")?)
        .attribute_definitions(attr_def("created_at")?)
        .key_schema(key_elem("id", KeyType::Hash)?)
        .global_secondary_indexes(gsi(GSI_PRINCIPAL, spec.principal_attr)?)
        .global_secondary_indexes(gsi(GSI_STATUS, "status")?)
        .global_secondary_indexes(gsi(GSI_PROFILE, "profile")?)
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let err = e.into_service_error();
            if err.is_resource_in_use_exception() {
                Ok(false)
            } else {
                Err(ProvisionerError::Dynamo(err.to_string()))
            }
        }
    }
}

async fn wait_for_active(client: &Client, table: &str) -> Result<(), ProvisionerError> {
    let start = tokio::time::Instant::now();
    let mut backoff = WAIT_INITIAL;

    loop {
        let resp = client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| ProvisionerError::Dynamo(e.into_service_error().to_string()))?;

        if resp
            .table()
            .and_then(|t| t.table_status())
            .is_some_and(|s| *s == TableStatus::Active)
        {
            return Ok(());
        }

        if start.elapsed() + backoff > WAIT_TOTAL {
            return Err(ProvisionerError::WaitTimeout {
                table: table.to_string(),
                seconds: WAIT_TOTAL.as_secs(),
            });
        }
        tracing::debug!(table = table, backoff_ms = backoff.as_millis() as u64, "waiting for ACTIVE");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(WAIT_MAX);
    }
}

async fn enable_ttl(client: &Client, table: &str) -> Result<(), ProvisionerError> {
    let spec = TimeToLiveSpecification::builder()
        .attribute_name("expires_at")
        .enabled(true)
        .build()
        .map_err(|e| ProvisionerError::Build(e.to_string()))?;

    client
        .update_time_to_live()
        .table_name(table)
        .time_to_live_specification(spec)
        .send()
        .await
        .map_err(|e| ProvisionerError::Dynamo(e.into_service_error().to_string()))?;
    Ok(())
}

fn attr_def(name: &str) -> Result<AttributeDefinition, ProvisionerError> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| ProvisionerError::Build(e.to_string()))
}

fn key_elem(name: &str, key_type: KeyType) -> Result<KeySchemaElement, ProvisionerError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| ProvisionerError::Build(e.to_string()))
}

fn gsi(index: &str, hash_attr: &str) -> Result<GlobalSecondaryIndex, ProvisionerError> {
    GlobalSecondaryIndex::builder()
        .index_name(index)
        .key_schema(key_elem(hash_attr, KeyType::Hash)?)
        .key_schema(key_elem("created_at", KeyType::Range)?)
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .map_err(|e| ProvisionerError::Build(e.to_string()))
}
