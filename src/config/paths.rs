//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\highlight-sync\
//!   macOS:   ~/Library/Application Support/highlight-sync/
//!   Linux:   ~/.config/highlight-sync/
//!
//! Data dir (cached timing tables):
//!   Windows: %LOCALAPPDATA%\highlight-sync\timings\
//!   macOS:   ~/Library/Application Support/highlight-sync/timings/
//!   Linux:   ~/.local/share/highlight-sync/timings/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Root of the local timing-table tree read by `FileProvider`.
    pub timings_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "highlight-sync";

    /// Resolves all paths using the `dirs` crate, falling back to the
    /// current directory when the platform has no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            timings_dir: data_dir.join("timings"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
