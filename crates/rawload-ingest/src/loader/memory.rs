use super::{column_name, RawTableSink, RecordBatch};
use crate::config::LoadMode;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

/// In-memory raw tables
///
/// Behaves like the PostgreSQL destination where it matters to the pipeline:
/// inserts are all-or-nothing per batch, unknown tables or columns are schema
/// errors, plain header names fold to lower case, every empty field is stored
/// as NULL (`None`), and truncate mode replaces the table's contents.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    tables: BTreeMap<String, Table>,
    failing: BTreeSet<String>,
    fail_close: bool,
    insert_calls: usize,
    close_calls: usize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table<I, C>(&mut self, name: &str, columns: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.tables.insert(
            name.to_string(),
            Table {
                columns: columns.into_iter().map(Into::into).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Make every insert into `table` fail as if the connection dropped
    pub fn fail_on(&mut self, table: &str) {
        self.failing.insert(table.to_string());
    }

    /// Make `close` fail after counting the call
    pub fn fail_close(&mut self) {
        self.fail_close = true;
    }

    /// Rows of `table` in the table's column order
    pub fn rows(&self, table: &str) -> Vec<Vec<Option<String>>> {
        self.tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Values of one column of `table`, in insertion order
    pub fn column(&self, table: &str, column: &str) -> Vec<Option<String>> {
        let Some(t) = self.tables.get(table) else {
            return Vec::new();
        };
        let Some(idx) = t.columns.iter().position(|c| c == column) else {
            return Vec::new();
        };
        t.rows.iter().map(|row| row[idx].clone()).collect()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls > 0
    }
}

#[async_trait]
impl RawTableSink for MemoryDestination {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        batch: &RecordBatch,
        mode: LoadMode,
    ) -> Result<u64> {
        self.insert_calls += 1;

        if self.is_closed() {
            return Err(IngestError::Config("destination already closed".to_string()));
        }
        if self.failing.contains(table) {
            return Err(IngestError::Schema {
                table: table.to_string(),
                message: "simulated insert failure".to_string(),
            });
        }

        let target = self.tables.get_mut(table).ok_or_else(|| IngestError::Schema {
            table: table.to_string(),
            message: "relation does not exist".to_string(),
        })?;

        let positions = batch
            .columns
            .iter()
            .map(|name| {
                target
                    .columns
                    .iter()
                    .position(|c| *c == column_name(name))
                    .ok_or_else(|| IngestError::Schema {
                        table: table.to_string(),
                        message: format!("column \"{}\" does not exist", name),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if mode == LoadMode::Truncate {
            target.rows.clear();
        }

        let width = target.columns.len();
        for row in &batch.rows {
            let mut stored = vec![None; width];
            for (value, &idx) in row.iter().zip(&positions) {
                if !value.is_empty() {
                    stored[idx] = Some(value.clone());
                }
            }
            target.rows.push(stored);
        }

        Ok(batch.rows.len() as u64)
    }

    async fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        if self.fail_close {
            return Err(IngestError::Io(std::io::Error::other("simulated close failure")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(csv: &str) -> RecordBatch {
        RecordBatch::from_reader(csv.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_columns_map_by_name() {
        let mut dest = MemoryDestination::new();
        dest.create_table("sellers_raw", ["seller_id", "seller_city", "seller_state"]);

        let rows = dest
            .insert_batch(
                "sellers_raw",
                &batch("seller_state,seller_id\nSP,s1\n,s2\n"),
                LoadMode::Append,
            )
            .await
            .unwrap();

        assert_eq!(rows, 2);
        assert_eq!(
            dest.rows("sellers_raw"),
            vec![
                vec![Some("s1".to_string()), None, Some("SP".to_string())],
                vec![Some("s2".to_string()), None, None],
            ]
        );
    }

    #[tokio::test]
    async fn test_mixed_case_headers_and_lone_empty_fields() {
        let mut dest = MemoryDestination::new();
        dest.create_table("geolocation_raw", ["geolocation_city"]);

        dest.insert_batch(
            "geolocation_raw",
            &batch("Geolocation_City\nsao paulo\n\"\"\n"),
            LoadMode::Append,
        )
        .await
        .unwrap();

        assert_eq!(
            dest.column("geolocation_raw", "geolocation_city"),
            vec![Some("sao paulo".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_unknown_column_is_schema_error_and_inserts_nothing() {
        let mut dest = MemoryDestination::new();
        dest.create_table("orders_raw", ["order_id"]);

        let err = dest
            .insert_batch("orders_raw", &batch("order_id,extra\n1,x\n"), LoadMode::Append)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Schema { .. }));
        assert!(dest.rows("orders_raw").is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_is_schema_error() {
        let mut dest = MemoryDestination::new();
        let err = dest
            .insert_batch("nowhere_raw", &batch("id\n1\n"), LoadMode::Append)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nowhere_raw"));
    }

    #[tokio::test]
    async fn test_truncate_replaces_rows() {
        let mut dest = MemoryDestination::new();
        dest.create_table("t", ["id"]);
        let data = batch("id\n1\n2\n");

        dest.insert_batch("t", &data, LoadMode::Append).await.unwrap();
        dest.insert_batch("t", &data, LoadMode::Append).await.unwrap();
        assert_eq!(dest.rows("t").len(), 4);

        dest.insert_batch("t", &data, LoadMode::Truncate).await.unwrap();
        assert_eq!(dest.column("t", "id"), vec![Some("1".to_string()), Some("2".to_string())]);
    }
}
