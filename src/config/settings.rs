//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// HighlightConfig
// ---------------------------------------------------------------------------

/// Per-session highlighting behaviour.
///
/// The engine holds a default copy; [`HighlightEngine::start_session`] may
/// override it for a single session.
///
/// [`HighlightEngine::start_session`]: crate::engine::HighlightEngine::start_session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Cadence hint for the position feed, in milliseconds.  ~100 ms keeps
    /// highlighting visually tight at up to 10 lookups per second.
    pub update_interval_ms: u64,
    /// Notify subscribers on every position update, not only on word
    /// changes.  Needed by progress bars.
    pub emit_position_updates: bool,
    /// Latch the completion callback so it fires at most once per session.
    pub fire_completion_once: bool,
}

impl HighlightConfig {
    /// Feed cadence as a [`Duration`], never zero.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 100,
            emit_position_updates: true,
            fire_completion_once: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// Selects where timing tables are fetched from.
///
/// | Variant | Source                                                |
/// |---------|-------------------------------------------------------|
/// | File    | JSON files under `timings_dir`                        |
/// | Http    | `GET {base_url}/timings/{date}/{category}/{id}.json`  |
/// | Layered | Http first, File when the server has nothing / fails  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    File,
    Http,
    Layered,
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Settings for the timing-data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend to use.
    pub kind: ProviderKind,
    /// Base URL of the timing-data server (Http / Layered).
    pub base_url: String,
    /// Maximum seconds to wait for one HTTP fetch.
    pub timeout_secs: u64,
    /// Directory holding local timing JSON.  `None` uses
    /// [`AppPaths::timings_dir`].
    pub timings_dir: Option<PathBuf>,
}

impl ProviderConfig {
    /// Resolve the local timings directory against the platform default.
    pub fn resolve_timings_dir(&self, paths: &AppPaths) -> PathBuf {
        self.timings_dir
            .clone()
            .unwrap_or_else(|| paths.timings_dir.clone())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: "http://localhost:8080".into(),
            timeout_secs: 10,
            timings_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`:
///
/// ```toml
/// [highlight]
/// update_interval_ms = 100
/// emit_position_updates = true
/// fire_completion_once = true
///
/// [provider]
/// kind = "layered"
/// base_url = "https://timings.example.org"
/// timeout_secs = 10
/// ```
///
/// Every key is optional; missing keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Highlighting engine defaults.
    pub highlight: HighlightConfig,
    /// Timing-data provider settings.
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("serialising settings")?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
