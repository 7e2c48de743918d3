//! Schema sources
//!
//! Where snapshots come from. `PostgresSource` introspects one schema of a
//! live PostgreSQL database through information_schema; tests plug in their
//! own implementation of [`SchemaSource`].

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::snapshot::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot, TableDescriptor};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, info};

/// Anything that can produce a snapshot of a named schema
pub trait SchemaSource: Send + Sync {
    fn fetch_schema(&self, schema: &str) -> impl Future<Output = Result<SchemaSnapshot, AppError>> + Send;
}

/// Introspects a PostgreSQL database
#[derive(Clone)]
pub struct PostgresSource {
    pool: Pool,
}

impl PostgresSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from configuration and verify it with a trivial query
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_pool_size));

        let created = if config.require_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls)
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
        };
        let pool = created.map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;

        let client = pool.get().await?;
        client.query_one("SELECT 1 as ok", &[]).await?;

        info!(
            "Connected schema source to {}:{}/{} (TLS: {})",
            config.host, config.port, config.database, config.require_tls
        );
        Ok(Self::new(pool))
    }

    async fn columns(
        client: &deadpool_postgres::Client,
        schema: &str,
        tables: &mut BTreeMap<String, TableDescriptor>,
    ) -> Result<(), AppError> {
        let query = r#"
            SELECT
                c.table_name,
                c.column_name,
                c.data_type,
                c.is_nullable,
                c.column_default
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_schema = c.table_schema
                AND t.table_name = c.table_name
            WHERE c.table_schema = $1
              AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
        "#;

        for row in client.query(query, &[&schema]).await? {
            let table: String = row.get("table_name");
            let nullable: String = row.get("is_nullable");
            let mut column = ColumnDescriptor::new(
                row.get::<_, String>("column_name"),
                row.get::<_, String>("data_type"),
            );
            column.nullable = nullable == "YES";
            column.default_value = row.get("column_default");

            tables
                .entry(format!("{}.{}", schema, table))
                .or_default()
                .columns
                .push(column);
        }
        Ok(())
    }

    async fn primary_keys(
        client: &deadpool_postgres::Client,
        schema: &str,
        tables: &mut BTreeMap<String, TableDescriptor>,
    ) -> Result<(), AppError> {
        let query = r#"
            SELECT
                tc.table_name,
                kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY'
                AND tc.table_schema = $1
            ORDER BY tc.table_name, kcu.ordinal_position
        "#;

        for row in client.query(query, &[&schema]).await? {
            let table: String = row.get("table_name");
            if let Some(descriptor) = tables.get_mut(&format!("{}.{}", schema, table)) {
                descriptor.primary_keys.insert(row.get("column_name"));
            }
        }
        Ok(())
    }

    async fn foreign_keys(
        client: &deadpool_postgres::Client,
        schema: &str,
        tables: &mut BTreeMap<String, TableDescriptor>,
    ) -> Result<(), AppError> {
        let query = r#"
            SELECT
                tc.table_name as source_table,
                kcu.column_name as source_column,
                ccu.table_schema as referenced_schema,
                ccu.table_name as referenced_table,
                ccu.column_name as referenced_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND tc.table_schema = $1
            ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position
        "#;

        for row in client.query(query, &[&schema]).await? {
            let table: String = row.get("source_table");
            let ref_schema: String = row.get("referenced_schema");
            let ref_table: String = row.get("referenced_table");
            if let Some(descriptor) = tables.get_mut(&format!("{}.{}", schema, table)) {
                descriptor.foreign_keys.push(ForeignKeyDescriptor::new(
                    row.get::<_, String>("source_column"),
                    format!("{}.{}", ref_schema, ref_table),
                    row.get::<_, String>("referenced_column"),
                ));
            }
        }
        Ok(())
    }
}

impl SchemaSource for PostgresSource {
    async fn fetch_schema(&self, schema: &str) -> Result<SchemaSnapshot, AppError> {
        let client = self.pool.get().await?;

        let mut tables = BTreeMap::new();
        Self::columns(&client, schema, &mut tables).await?;
        Self::primary_keys(&client, schema, &mut tables).await?;
        Self::foreign_keys(&client, schema, &mut tables).await?;

        let snapshot = SchemaSnapshot::new(Some(schema.to_string()), tables);
        debug!(
            "Introspected schema {} with {} tables, {} FKs",
            schema,
            snapshot.table_count(),
            snapshot.fk_count()
        );

        Ok(snapshot)
    }
}
