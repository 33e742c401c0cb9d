//! In-memory provider for embedding pre-loaded tables and for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::provider::traits::{ProviderError, TimingProvider};
use crate::timing::{ReadingKey, TimingTable};

/// Map-backed [`TimingProvider`].  Tables can be added after construction.
///
/// ```rust
/// # use highlight_sync::provider::MemoryProvider;
/// # use highlight_sync::timing::{ReadingCategory, ReadingKey, TimingTable};
/// let provider = MemoryProvider::new();
/// let key = ReadingKey::new("ps-23", ReadingCategory::Psalm, "2025-01-05".parse().unwrap());
/// provider.insert(key, TimingTable::new("ps-23", ReadingCategory::Psalm, "Ps 23", 0, vec![]).unwrap());
/// assert_eq!(provider.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryProvider {
    tables: RwLock<HashMap<ReadingKey, TimingTable>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the table for `key`.
    pub fn insert(&self, key: ReadingKey, table: TimingTable) {
        self.tables
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, table);
    }

    pub fn remove(&self, key: &ReadingKey) -> Option<TimingTable> {
        self.tables
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(ReadingKey, TimingTable)> for MemoryProvider {
    fn from_iter<I: IntoIterator<Item = (ReadingKey, TimingTable)>>(iter: I) -> Self {
        Self {
            tables: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[async_trait]
impl TimingProvider for MemoryProvider {
    async fn timing_data(&self, key: &ReadingKey) -> Result<TimingTable, ProviderError> {
        self.tables
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(key.clone()))
    }
}
