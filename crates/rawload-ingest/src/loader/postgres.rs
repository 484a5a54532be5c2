use super::{column_name, RawTableSink, RecordBatch};
use crate::config::{DatabaseConfig, LoadMode};
use crate::error::{IngestError, Result};
use crate::mapping::quote_ident;
use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::{debug, info, instrument, warn};

/// SQLSTATE codes that mean the file does not fit the table
const SCHEMA_SQLSTATES: [&str; 4] = [
    "42P01", // undefined_table
    "42703", // undefined_column
    "22P04", // bad_copy_file_format
    "42701", // duplicate_column
];

/// PostgreSQL raw tables over a single connection
///
/// Each batch is streamed with `COPY ... FROM STDIN (FORMAT csv)`, so a file
/// is loaded by one statement and either lands completely or not at all.
pub struct PgDestination {
    conn: Option<PgConnection>,
    target: String,
}

impl PgDestination {
    #[instrument(skip(config), fields(host = %config.host, db = %config.name))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password);

        let conn = PgConnection::connect_with(&options).await?;
        let target = format!(
            "postgres://{}@{}:{}/{}",
            config.user, config.host, config.port, config.name
        );

        info!(destination = %target, "Connected to destination database");

        Ok(Self {
            conn: Some(conn),
            target,
        })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| IngestError::Config("destination connection already closed".to_string()))
    }
}

/// `COPY "table" ("a", "b") FROM STDIN WITH (FORMAT csv, FORCE_NULL ("a", "b"))`
///
/// `FORCE_NULL` makes every empty field NULL, quoted or not. Without it a
/// lone empty field (written as `""`) would load as an empty string while the
/// same field next to others would load as NULL.
pub fn copy_statement(table: &str, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|c| format!("\"{}\"", column_name(c).replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, FORCE_NULL ({}))",
        quote_ident(table),
        columns,
        columns
    )
}

async fn copy_rows(conn: &mut PgConnection, statement: &str, payload: Vec<u8>) -> sqlx::Result<u64> {
    let mut copy = conn.copy_in_raw(statement).await?;

    let sent = copy.send(payload).await.map(|_| ());
    if let Err(e) = sent {
        // the connection is unusable until the copy is finished or aborted
        if let Err(abort_err) = copy.abort(e.to_string()).await {
            warn!("Failed to abort COPY: {}", abort_err);
        }
        return Err(e);
    }

    copy.finish().await
}

fn classify(table: &str, error: sqlx::Error) -> IngestError {
    if let sqlx::Error::Database(ref db_err) = error {
        let is_schema = db_err
            .code()
            .is_some_and(|code| SCHEMA_SQLSTATES.contains(&code.as_ref()));
        if is_schema {
            return IngestError::Schema {
                table: table.to_string(),
                message: db_err.message().to_string(),
            };
        }
    }
    IngestError::Database(error)
}

#[async_trait]
impl RawTableSink for PgDestination {
    fn describe(&self) -> String {
        self.target.clone()
    }

    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    async fn insert_batch(
        &mut self,
        table: &str,
        batch: &RecordBatch,
        mode: LoadMode,
    ) -> Result<u64> {
        let statement = copy_statement(table, &batch.columns);
        let payload = batch.to_csv_bytes()?;
        let conn = self.conn()?;

        debug!("{}", statement);

        let copied = match mode {
            LoadMode::Append => copy_rows(conn, &statement, payload)
                .await
                .map_err(|e| classify(table, e))?,
            LoadMode::Truncate => {
                let mut tx = conn.begin().await?;

                sqlx::query(&format!("TRUNCATE TABLE {}", quote_ident(table)))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| classify(table, e))?;

                let copied = copy_rows(&mut tx, &statement, payload)
                    .await
                    .map_err(|e| classify(table, e))?;

                tx.commit().await?;
                copied
            },
        };

        Ok(copied)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            debug!(destination = %self.target, "Closed destination connection");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_statement_quotes_identifiers() {
        let columns = vec!["order_id".to_string(), "weird\"col".to_string()];
        assert_eq!(
            copy_statement("raw.orders_raw", &columns),
            "COPY \"raw\".\"orders_raw\" (\"order_id\", \"weird\"\"col\") FROM STDIN \
             WITH (FORMAT csv, FORCE_NULL (\"order_id\", \"weird\"\"col\"))"
        );
    }

    #[test]
    fn test_copy_statement_folds_plain_header_names() {
        let columns = vec!["Seller_ID".to_string(), "Seller City".to_string()];
        let statement = copy_statement("sellers_raw", &columns);
        assert!(statement.contains("(\"seller_id\", \"Seller City\")"));
    }

    #[test]
    fn test_non_database_errors_stay_database_errors() {
        let err = classify("orders_raw", sqlx::Error::RowNotFound);
        assert!(matches!(err, IngestError::Database(_)));
    }
}
