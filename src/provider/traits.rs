//! Core `TimingProvider` trait and `ProviderError`.

use async_trait::async_trait;
use thiserror::Error;

use crate::timing::{ReadingKey, TimingError, TimingTable, TimingTableData};

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Errors a [`TimingProvider`] can report.
///
/// [`NotFound`](ProviderError::NotFound) is an expected condition (the
/// reading simply has no timing data) and is handled separately from real
/// faults by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// No timing table exists for this reading.
    #[error("no timing data for {0}")]
    NotFound(ReadingKey),

    /// Local storage could not be read.
    #[error("storage error: {0}")]
    Io(String),

    /// HTTP transport or server error.
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("timing data request timed out")]
    Timeout,

    /// The payload was not valid timing JSON.
    #[error("failed to parse timing data: {0}")]
    Parse(String),

    /// The payload decoded but violates the timing-table contract.
    #[error("invalid timing data: {0}")]
    InvalidData(#[from] TimingError),
}

impl ProviderError {
    /// `true` for the expected "nothing here" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    /// `true` for faults a different source might not have (storage,
    /// transport, timeout).  Malformed data is not transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Io(_) | ProviderError::Request(_) | ProviderError::Timeout
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// TimingProvider trait
// ---------------------------------------------------------------------------

/// Async source of timing tables.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn TimingProvider>` by the engine.
#[async_trait]
pub trait TimingProvider: Send + Sync {
    /// Fetch the timing table for `key`.
    ///
    /// Returns `Err(ProviderError::NotFound)` when the reading has no timing
    /// data; any other error is a fault.
    async fn timing_data(&self, key: &ReadingKey) -> Result<TimingTable, ProviderError>;
}

/// Decode a JSON payload into a validated [`TimingTable`].
///
/// Syntax errors become [`ProviderError::Parse`]; contract violations become
/// [`ProviderError::InvalidData`].
pub fn decode_table(bytes: &[u8]) -> Result<TimingTable, ProviderError> {
    let data: TimingTableData =
        serde_json::from_slice(bytes).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(TimingTable::try_from(data)?)
}
