//! Filename to raw-table mapping
//!
//! Which table a file lands in is a pure data lookup. The mapping is built
//! once, validated, and never changes during a run; files that are not in
//! it are skipped rather than treated as errors.

use crate::error::{IngestError, Result};
use std::collections::BTreeMap;

/// Mapping for the Brazilian e-commerce public dataset (olistbr/brazilian-ecommerce)
pub const OLIST_TABLES: [(&str, &str); 9] = [
    ("olist_customers_dataset.csv", "customers_raw"),
    ("olist_geolocation_dataset.csv", "geolocation_raw"),
    ("olist_order_items_dataset.csv", "order_items_raw"),
    ("olist_order_payments_dataset.csv", "order_payments_raw"),
    ("olist_order_reviews_dataset.csv", "order_reviews_raw"),
    ("olist_orders_dataset.csv", "orders_raw"),
    ("olist_products_dataset.csv", "products_raw"),
    ("olist_sellers_dataset.csv", "sellers_raw"),
    (
        "product_category_name_translation.csv",
        "product_category_name_translation_raw",
    ),
];

/// Immutable filename -> destination table lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    entries: BTreeMap<String, String>,
}

impl TableMapping {
    /// Build a mapping, rejecting duplicate filenames and unsafe table names
    pub fn from_pairs<I, F, T>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (F, T)>,
        F: Into<String>,
        T: Into<String>,
    {
        let mut entries = BTreeMap::new();

        for (file, table) in pairs {
            let file = file.into();
            let table = table.into();

            if file.is_empty() || file.contains('/') {
                return Err(IngestError::Mapping(format!(
                    "'{}' is not a bare filename",
                    file
                )));
            }
            validate_table_name(&table)?;

            if entries.insert(file.clone(), table).is_some() {
                return Err(IngestError::Mapping(format!(
                    "filename '{}' is mapped more than once",
                    file
                )));
            }
        }

        Ok(Self { entries })
    }

    /// The nine-table mapping for the reference dataset
    pub fn olist() -> Self {
        Self {
            entries: OLIST_TABLES
                .iter()
                .map(|(file, table)| (file.to_string(), table.to_string()))
                .collect(),
        }
    }

    /// Destination table for `filename`, if mapped
    pub fn resolve(&self, filename: &str) -> Option<&str> {
        self.entries.get(filename).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, t)| (f.as_str(), t.as_str()))
    }
}

/// Table names are plain identifiers, optionally schema-qualified
fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.split('.').count() <= 2
        && table.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(IngestError::Mapping(format!(
            "'{}' is not a valid table name",
            table
        )))
    }
}

/// Quote a (possibly schema-qualified) identifier for PostgreSQL
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
