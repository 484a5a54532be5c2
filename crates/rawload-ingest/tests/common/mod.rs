//! Shared fixtures for rawload integration tests
//!
//! - CSV payloads shaped like the olist dataset files
//! - Builders for a [`MemoryStore`] seeded with objects and a
//!   [`MemoryDestination`] with the raw tables created
//! - [`TestPostgres`]: a PostgreSQL container with `schema/raw_tables.sql`
//!   applied (requires Docker)

#![allow(dead_code)]

use anyhow::{Context, Result};
use rawload_ingest::config::{DatabaseConfig, PipelineSettings};
use rawload_ingest::loader::MemoryDestination;
use rawload_ingest::storage::MemoryStore;
use std::path::Path;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

pub const PREFIX: &str = "raw/";

pub const ORDERS_FILE: &str = "olist_orders_dataset.csv";
pub const SELLERS_FILE: &str = "olist_sellers_dataset.csv";
pub const PAYMENTS_FILE: &str = "olist_order_payments_dataset.csv";

pub const ORDERS_CSV: &str = "\
order_id,customer_id,order_status,order_purchase_timestamp,order_approved_at,order_delivered_carrier_date,order_delivered_customer_date,order_estimated_delivery_date
e481f51cbdc54678b7cc49136f2d6af7,9ef432eb6251297304e76186b10a928d,delivered,2017-10-02 10:56:33,2017-10-02 11:07:15,2017-10-04 19:55:00,2017-10-10 21:25:13,2017-10-18 00:00:00
53cdb2fc8bc7dce0b6741e2150273451,b0830fb4747a6c6d20dea0b8c802d7ef,delivered,2018-07-24 20:41:37,2018-07-26 03:24:27,2018-07-26 14:31:00,2018-08-07 15:27:45,2018-08-13 00:00:00
136cce7faa42fdb2cefd53fdc79a6098,ed0271e0b7da060a393796590e7b737a,invoiced,2017-04-11 12:22:08,2017-04-13 13:25:17,,,2017-05-09 00:00:00
";

pub const ORDERS_ROWS: usize = 3;

pub const SELLERS_CSV: &str = "\
seller_id,seller_zip_code_prefix,seller_city,seller_state
3442f8959a84dea7ee197c632cb2df15,13023,campinas,SP
d1b65fc7debc3361ea86b5f14c68d2e2,13844,mogi guacu,SP
";

pub const PAYMENTS_CSV: &str = "\
order_id,payment_sequential,payment_type,payment_installments,payment_value
b81ef226f3fe1789b1e8b2acac839d17,1,credit_card,8,99.33
";

pub const HEADER_ONLY_CSV: &str = "seller_id,seller_zip_code_prefix,seller_city,seller_state\n";

pub fn object(filename: &str) -> String {
    format!("{}{}", PREFIX, filename)
}

/// Store holding `files` under [`PREFIX`]
pub fn seeded_store(files: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new("de-27-team3");
    for (name, content) in files {
        store.insert(object(name), content.as_bytes().to_vec());
    }
    store
}

/// In-memory destination with the raw tables for the fixture files
pub fn raw_destination() -> MemoryDestination {
    let mut dest = MemoryDestination::new();
    dest.create_table("orders_raw", header_of(ORDERS_CSV));
    dest.create_table("sellers_raw", header_of(SELLERS_CSV));
    dest.create_table("order_payments_raw", header_of(PAYMENTS_CSV));
    dest
}

pub fn header_of(csv: &str) -> Vec<String> {
    csv.lines()
        .next()
        .unwrap_or_default()
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Default settings with the staging area under `root`
pub fn settings_in(root: &Path) -> PipelineSettings {
    PipelineSettings {
        staging_root: Some(root.to_path_buf()),
        ..PipelineSettings::default()
    }
}

/// Entries left under `dir`
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the raw tables created
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    config: DatabaseConfig,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let config = DatabaseConfig {
            host: host.to_string(),
            port,
            name: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
        };

        let pg = Self { container, config };
        pg.apply_schema().await?;
        Ok(pg)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub async fn connect(&self) -> Result<sqlx::PgConnection> {
        use sqlx::Connection;

        let url = format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.config.user,
            self.config.password,
            self.config.host,
            self.config.port,
            self.config.name
        );
        sqlx::PgConnection::connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")
    }

    async fn apply_schema(&self) -> Result<()> {
        let ddl = include_str!("../../../../schema/raw_tables.sql");
        let mut conn = self.connect().await?;
        sqlx::raw_sql(ddl)
            .execute(&mut conn)
            .await
            .context("Failed to create raw tables")?;
        Ok(())
    }
}
