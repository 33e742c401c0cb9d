//! Local JSON timing tables.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<YYYY-MM-DD>/<category>/<reading_id>.json
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::provider::traits::{decode_table, ProviderError, TimingProvider};
use crate::timing::{ReadingKey, TimingTable};

/// Reads timing tables from a directory tree with `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the table for `key` lives (whether or not it exists).
    pub fn path_for(&self, key: &ReadingKey) -> PathBuf {
        self.root
            .join(key.date.to_string())
            .join(key.category.as_str())
            .join(format!("{}.json", key.reading_id))
    }
}

#[async_trait]
impl TimingProvider for FileProvider {
    async fn timing_data(&self, key: &ReadingKey) -> Result<TimingTable, ProviderError> {
        // Reading ids come from callers; refuse anything that could leave the root.
        if key.reading_id.is_empty()
            || key.reading_id.contains(['/', '\\'])
            || key.reading_id.starts_with('.')
        {
            return Err(ProviderError::NotFound(key.clone()));
        }

        let path = self.path_for(key);
        log::debug!("file provider: reading {}", path.display());

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(key.clone()));
            }
            Err(e) => {
                return Err(ProviderError::Io(format!("{}: {e}", path.display())));
            }
        };

        decode_table(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
