//! Dataset download
//!
//! Fetches a dataset archive from a Kaggle-style HTTP API and extracts its
//! tabular entries into the local data directory.

use crate::config::DatasetConfig;
use crate::error::{IngestError, Result};
use crate::source::list_archive;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const PROGRESS_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Upper bound on what a Content-Length header can make us reserve up front
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Client for the dataset download API
#[derive(Clone)]
pub struct DatasetClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    key: Option<String>,
}

impl DatasetClient {
    pub fn new(config: &DatasetConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            key: config.key.clone(),
        }
    }

    /// Download URL for an `owner/name` slug
    pub fn download_url(&self, slug: &str) -> Result<String> {
        let (owner, name) = split_slug(slug)?;
        Ok(format!("{}/datasets/download/{}/{}", self.base_url, owner, name))
    }

    /// Fetch the zipped dataset into memory
    #[instrument(skip(self))]
    pub async fn download_archive(&self, slug: &str) -> Result<Vec<u8>> {
        let url = self.download_url(slug)?;
        info!("Downloading dataset {} from {}", slug, url);

        let mut request = self.client.get(&url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.key.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Dataset(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!(
                    "{} returned {}; check KAGGLE_USERNAME and KAGGLE_KEY",
                    url, status
                ),
                StatusCode::NOT_FOUND => format!("dataset '{}' not found ({})", slug, url),
                _ => format!("{} returned {}", url, status),
            }));
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("Downloading {}", slug));

        let mut data = Vec::with_capacity(initial_capacity(total_size));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            data.extend_from_slice(&chunk);
            pb.set_position(data.len() as u64);
        }

        pb.finish_with_message(format!("Downloaded {}", slug));
        debug!(bytes = data.len(), "Archive downloaded");

        Ok(data)
    }

    /// Download `slug` and extract its `suffix` entries into `dest`
    pub async fn download_to(&self, slug: &str, dest: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
        let archive = self.download_archive(slug).await?;
        extract_entries(&archive, dest, suffix)
    }
}

/// Buffer pre-allocation for a body of `content_length` bytes
///
/// The advertised length is only a hint; the buffer grows past the cap as
/// bytes actually arrive.
fn initial_capacity(content_length: u64) -> usize {
    content_length.min(MAX_PREALLOCATION) as usize
}

fn split_slug(slug: &str) -> Result<(&str, &str)> {
    match slug.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        },
        _ => Err(IngestError::Config(format!(
            "KAGGLE_DATASET must look like 'owner/name', got '{}'",
            slug
        ))),
    }
}

/// Extract the entries of `archive` ending in `suffix` into `dest`
///
/// Entries are flattened to their basename; an existing file of the same
/// name is overwritten. Returns the written paths in archive order.
pub fn extract_entries(archive: &[u8], dest: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;

    let entries = list_archive(archive, suffix)?;
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut written = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut file = zip.by_index(entry.index)?;
        let out_path = dest.join(&entry.filename);
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut file, &mut out)?;

        debug!(entry = %entry.path, path = %out_path.display(), "Extracted");
        written.push(out_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_initial_capacity_ignores_absurd_content_length() {
        assert_eq!(initial_capacity(0), 0);
        assert_eq!(initial_capacity(42_000), 42_000);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOCATION as usize);
    }

    fn config(api_url: &str) -> DatasetConfig {
        DatasetConfig {
            api_url: api_url.to_string(),
            dataset: "olistbr/brazilian-ecommerce".to_string(),
            username: None,
            key: None,
        }
    }

    #[test]
    fn test_download_url() {
        let client = DatasetClient::new(&config("https://www.kaggle.com/api/v1/"));
        assert_eq!(
            client.download_url("olistbr/brazilian-ecommerce").unwrap(),
            "https://www.kaggle.com/api/v1/datasets/download/olistbr/brazilian-ecommerce"
        );
    }

    #[test]
    fn test_bad_slugs() {
        let client = DatasetClient::new(&config("http://localhost"));
        for slug in ["", "olistbr", "/x", "olistbr/", "a/b/c"] {
            assert!(client.download_url(slug).is_err(), "accepted {slug:?}");
        }
    }

    #[test]
    fn test_extract_entries_flattens_and_filters() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("nested/olist_sellers_dataset.csv", options).unwrap();
            writer.write_all(b"seller_id\ns1\n").unwrap();
            writer.start_file("README.md", options).unwrap();
            writer.write_all(b"# data").unwrap();
            writer.finish().unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("DE_Project_Data");

        let written = extract_entries(buffer.get_ref(), &dest, ".csv").unwrap();

        assert_eq!(written, vec![dest.join("olist_sellers_dataset.csv")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"seller_id\ns1\n");
        assert!(!dest.join("README.md").exists());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_entries(b"not a zip", dir.path(), ".csv"),
            Err(IngestError::Archive(_))
        ));
    }
}
