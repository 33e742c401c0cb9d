//! Fallback provider: wraps two [`TimingProvider`]s and consults the second
//! when the first has nothing or cannot be reached.
//!
//! Typical use: a remote server as primary with the local cache directory as
//! secondary, so highlighting keeps working offline for readings that were
//! fetched before.

use async_trait::async_trait;

use crate::provider::traits::{ProviderError, TimingProvider};
use crate::timing::{ReadingKey, TimingTable};

/// Primary-then-secondary [`TimingProvider`].
///
/// The secondary is consulted when the primary returns `NotFound` or a
/// transient fault (`Io`, `Request`, `Timeout`).  Data the primary returns
/// but that fails to parse or validate is passed through untouched, since
/// a stale local copy should not mask a broken upstream table.
///
/// When both fail, the primary's fault wins over the secondary's
/// `NotFound`, so a network outage is not reported as "no timing data".
pub struct FallbackProvider<P: TimingProvider, S: TimingProvider> {
    primary: P,
    secondary: S,
}

impl<P: TimingProvider, S: TimingProvider> FallbackProvider<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

#[async_trait]
impl<P: TimingProvider, S: TimingProvider> TimingProvider for FallbackProvider<P, S> {
    async fn timing_data(&self, key: &ReadingKey) -> Result<TimingTable, ProviderError> {
        let primary_err = match self.primary.timing_data(key).await {
            Ok(table) => return Ok(table),
            Err(e) if e.is_not_found() || e.is_transient() => e,
            Err(e) => return Err(e),
        };

        log::debug!("fallback provider: primary failed for {key} ({primary_err}); trying secondary");

        match self.secondary.timing_data(key).await {
            Ok(table) => Ok(table),
            Err(secondary_err) if secondary_err.is_not_found() => Err(primary_err),
            Err(secondary_err) => Err(secondary_err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
