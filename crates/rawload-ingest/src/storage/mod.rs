//! Object store abstraction
//!
//! The pipeline only needs three object operations: list one page of keys,
//! get an object, put an object. [`S3Store`] talks to S3 (or MinIO);
//! [`MemoryStore`] keeps objects in memory for tests.

use crate::error::Result;
use async_trait::async_trait;

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token for the following page; `None` on the last page
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, e.g. `s3://bucket`
    fn location(&self) -> String;

    /// List keys under `prefix`, resuming from `continuation` when given
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;
}

/// Key for `filename` under `prefix` (`raw/` + `a.csv` -> `raw/a.csv`)
pub fn object_key(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", prefix, filename)
    }
}

/// Canonical form of a key prefix: `"<prefix>/"`, or `""` for the bucket root
///
/// Publishing and listing both go through this, so a prefix written as
/// `raw`, `raw/` or `/` means the same location in both stages.
pub fn list_prefix(prefix: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    }
}

/// Last path segment of an object key
pub fn filename_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("raw/", "a.csv"), "raw/a.csv");
        assert_eq!(object_key("raw", "a.csv"), "raw/a.csv");
        assert_eq!(object_key("", "a.csv"), "a.csv");
        assert_eq!(object_key("data/raw//", "a.csv"), "data/raw/a.csv");
    }

    #[test]
    fn test_list_prefix() {
        assert_eq!(list_prefix("raw"), "raw/");
        assert_eq!(list_prefix("raw/"), "raw/");
        assert_eq!(list_prefix("data/raw//"), "data/raw/");
        assert_eq!(list_prefix("/"), "");
        assert_eq!(list_prefix(""), "");
    }

    #[test]
    fn test_published_keys_fall_under_the_listed_prefix() {
        for prefix in ["raw", "raw/", "/", ""] {
            let key = object_key(prefix, "a.csv");
            assert!(key.starts_with(&list_prefix(prefix)), "{prefix:?} -> {key}");
        }
    }

    #[test]
    fn test_filename_of() {
        assert_eq!(filename_of("raw/olist_orders_dataset.csv"), "olist_orders_dataset.csv");
        assert_eq!(filename_of("top.csv"), "top.csv");
        assert_eq!(filename_of("raw/"), "");
    }
}
