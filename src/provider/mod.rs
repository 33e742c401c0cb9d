//! Timing-data providers.
//!
//! This module provides:
//! * [`TimingProvider`]: async trait the engine fetches tables through.
//! * [`FileProvider`]: JSON tables under a local directory.
//! * [`HttpProvider`]: JSON tables from a remote server.
//! * [`MemoryProvider`]: pre-loaded tables held in memory.
//! * [`FallbackProvider`]: primary with a secondary for misses and outages.
//! * [`ProviderError`]: error variants; `NotFound` is the expected miss.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use highlight_sync::config::{AppConfig, AppPaths};
//! use highlight_sync::provider::build_provider;
//! use highlight_sync::timing::{ReadingCategory, ReadingKey};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let provider = build_provider(&config.provider, &AppPaths::new());
//!
//!     let key = ReadingKey::new("jn-3-16", ReadingCategory::Gospel, "2025-03-09".parse().unwrap());
//!     match provider.timing_data(&key).await {
//!         Ok(table) => println!("{} words", table.len()),
//!         Err(e) if e.is_not_found() => println!("audio only"),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod fallback;
pub mod file;
pub mod http;
pub mod memory;
pub mod traits;

use std::sync::Arc;

use crate::config::{AppPaths, ProviderConfig, ProviderKind};

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use fallback::FallbackProvider;
pub use file::FileProvider;
pub use http::HttpProvider;
pub use memory::MemoryProvider;
pub use traits::{decode_table, ProviderError, TimingProvider};

/// Build the provider selected by `config.kind`.
pub fn build_provider(config: &ProviderConfig, paths: &AppPaths) -> Arc<dyn TimingProvider> {
    let timings_dir = config.resolve_timings_dir(paths);
    match config.kind {
        ProviderKind::File => Arc::new(FileProvider::new(timings_dir)),
        ProviderKind::Http => Arc::new(HttpProvider::from_config(config)),
        ProviderKind::Layered => Arc::new(FallbackProvider::new(
            HttpProvider::from_config(config),
            FileProvider::new(timings_dir),
        )),
    }
}
