//! Source enumeration
//!
//! Produces the keys or paths the later stages work through:
//!
//! - [`list_objects`]: lazy stream over an object store prefix, following
//!   continuation tokens internally
//! - [`list_local`]: tabular files in a local directory
//! - [`list_archive`]: tabular entries inside a zip archive
//!
//! All three filter on a filename suffix (normally `.csv`) and treat "nothing
//! matched" as an empty result, never an error.

use crate::error::{IngestError, Result};
use crate::storage::ObjectStore;
use futures::{future, stream, Stream, TryStreamExt};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;

enum ListState {
    Start,
    Next(String),
    Done,
}

/// Lazily list keys under `prefix` ending in `suffix`
///
/// Pages are fetched on demand as the stream is polled. A failed page
/// request ends the stream with an [`IngestError::Enumeration`].
pub fn list_objects<'a, S>(
    store: &'a S,
    prefix: &'a str,
    suffix: &'a str,
) -> impl Stream<Item = Result<String>> + 'a
where
    S: ObjectStore + ?Sized,
{
    let pages = stream::try_unfold(ListState::Start, move |cursor| async move {
        let token = match cursor {
            ListState::Done => return Ok(None),
            ListState::Start => None,
            ListState::Next(token) => Some(token),
        };

        let page = store.list_page(prefix, token.as_deref()).await?;
        debug!(
            location = %store.location(),
            prefix,
            keys = page.keys.len(),
            "Fetched listing page"
        );

        let next = match page.next_token {
            Some(token) => ListState::Next(token),
            None => ListState::Done,
        };
        Ok::<_, IngestError>(Some((page.keys, next)))
    });

    pages
        .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<_, IngestError>)))
        .try_flatten()
        .try_filter(move |key| future::ready(key.ends_with(suffix)))
}

/// Files in `dir` whose names end in `suffix`, sorted by name
///
/// A missing or unreadable directory is an enumeration failure.
pub fn list_local(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| IngestError::enumeration(dir.display().to_string(), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::enumeration(dir.display().to_string(), e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix));

        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// One tabular entry of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position inside the archive
    pub index: usize,
    /// Full path as stored in the archive
    pub path: String,
    /// Basename the entry is extracted to
    pub filename: String,
    pub size: u64,
}

/// Entries of a zip archive whose basename ends in `suffix`
pub fn list_archive(data: &[u8], suffix: &str) -> Result<Vec<ArchiveEntry>> {
    list_archive_from(Cursor::new(data), suffix)
}

fn list_archive_from<R: Read + Seek>(reader: R, suffix: &str) -> Result<Vec<ArchiveEntry>> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }

        let path = file.name().to_string();
        let filename = Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if filename.ends_with(suffix) {
            entries.push(ArchiveEntry {
                index,
                path,
                filename,
                size: file.size(),
            });
        }
    }

    Ok(entries)
}
