use super::{ListPage, ObjectStore};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    failing: BTreeSet<String>,
    fail_listing: bool,
    list_calls: usize,
}

/// In-memory object store with S3-like paginated listing
///
/// Keys registered through [`MemoryStore::fail_on`] make `get`/`put` fail,
/// and [`MemoryStore::fail_listing`] makes listing fail, which is how the
/// pipeline's failure handling is exercised without a network.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    page_size: usize,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Limit listing pages to `page_size` keys
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock().objects.insert(key.into(), data.into());
    }

    pub fn fail_on(&self, key: impl Into<String>) {
        self.lock().failing.insert(key.into());
    }

    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Number of `list_page` calls served so far
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }

    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut inner = self.lock();
        inner.list_calls += 1;

        if inner.fail_listing {
            return Err(IngestError::enumeration(
                format!("memory://{}/{}", self.name, prefix),
                "access denied",
            ));
        }

        // keys are kept sorted, so the last key of a page doubles as the token
        let mut matching = inner
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation.map_or(true, |token| k.as_str() > token));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };

        Ok(ListPage { keys, next_token })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let inner = self.lock();
        if inner.failing.contains(key) {
            return Err(IngestError::transfer(key, "simulated transfer failure"));
        }
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| IngestError::transfer(key, "no such key"))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let mut inner = self.lock();
        if inner.failing.contains(key) {
            return Err(IngestError::transfer(key, "simulated transfer failure"));
        }
        inner.objects.insert(key.to_string(), data);
        Ok(())
    }
}
