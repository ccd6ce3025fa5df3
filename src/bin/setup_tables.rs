//! CLI tool to create the DynamoDB tables for the exchange-rate-service
//!
//! Usage:
//!   cargo run --bin setup_tables
//!
//! For local development with DynamoDB Local:
//!   DYNAMODB_ENDPOINT_URL=http://localhost:8001 cargo run --bin setup_tables

use anyhow::{Context, Result};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus,
    TimeToLiveSpecification,
};
use clap::Parser;
use exchange_rate_service::db::models::{PARTITION_KEY, SORT_KEY, TTL};
use std::time::Duration;

/// Create DynamoDB tables for the exchange-rate-service
#[derive(Parser, Debug)]
#[command(name = "setup_tables")]
#[command(about = "Create DynamoDB tables for the exchange-rate-service")]
struct Args {
    /// DynamoDB endpoint URL (for local development)
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Exchange rates table name
    #[arg(long, env = "DYNAMODB_RATES_TABLE", default_value = "exchange_rates")]
    rates_table: String,

    /// Lock table name, when kept apart from the rates table
    #[arg(long, env = "DYNAMODB_LOCK_TABLE")]
    lock_table: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config_builder = aws_config::from_env();

    let endpoint_url = args
        .endpoint_url
        .or_else(|| std::env::var("DYNAMODB_ENDPOINT_URL").ok());

    if let Some(ref url) = endpoint_url {
        config_builder = config_builder.endpoint_url(url);
        println!("Using DynamoDB endpoint: {}", url);
    }

    let aws_config = config_builder.load().await;
    let client = aws_sdk_dynamodb::Client::new(&aws_config);

    let mut tables = vec![args.rates_table.clone()];
    if let Some(lock_table) = args.lock_table.filter(|t| *t != args.rates_table) {
        tables.push(lock_table);
    }

    println!("\nSetting up DynamoDB tables...\n");

    for table_name in &tables {
        match create_table(&client, table_name).await {
            Ok(true) => println!("Created table: {}", table_name),
            Ok(false) => println!("Table already exists: {}", table_name),
            Err(e) => {
                println!("Failed to create table {}: {:#}", table_name, e);
                continue;
            }
        }

        match enable_ttl(&client, table_name).await {
            Ok(()) => println!("TTL enabled on {}.{}", table_name, TTL),
            Err(e) => println!("Failed to enable TTL on {}: {:#}", table_name, e),
        }
    }

    println!("\nTable setup complete!\n");

    Ok(())
}

/// Create a `pk` (hash) + `sk` (range) table. Returns false if it already exists.
async fn create_table(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<bool> {
    let tables = client.list_tables().send().await?;
    if tables.table_names().iter().any(|t| t == table_name) {
        return Ok(false);
    }

    client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(PARTITION_KEY)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(SORT_KEY)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(PARTITION_KEY)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(SORT_KEY)
                .key_type(KeyType::Range)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await?;

    wait_until_active(client, table_name).await?;

    Ok(true)
}

async fn wait_until_active(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<()> {
    for _ in 0..30 {
        let described = client.describe_table().table_name(table_name).send().await?;
        let status = described.table().and_then(|t| t.table_status());
        if status == Some(&TableStatus::Active) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    anyhow::bail!("table {} did not become active", table_name)
}

async fn enable_ttl(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<()> {
    let current = client
        .describe_time_to_live()
        .table_name(table_name)
        .send()
        .await
        .context("describe_time_to_live")?;

    let already_enabled = current
        .time_to_live_description()
        .and_then(|d| d.attribute_name())
        .map(|name| name == TTL)
        .unwrap_or(false);
    if already_enabled {
        return Ok(());
    }

    client
        .update_time_to_live()
        .table_name(table_name)
        .time_to_live_specification(
            TimeToLiveSpecification::builder()
                .attribute_name(TTL)
                .enabled(true)
                .build()?,
        )
        .send()
        .await
        .context("update_time_to_live")?;

    Ok(())
}
