//! Word-level read-along highlighting.
//!
//! Given a per-reading table of word timings and a stream of elapsed
//! playback positions, [`engine::HighlightEngine`] reports which word is
//! being spoken, fires word-change and completion callbacks, and broadcasts
//! state snapshots to subscribers.
//!
//! * [`timing`]: word timings, validated tables, reading keys.
//! * [`provider`]: where tables come from (files, HTTP, memory).
//! * [`engine`]: the session-scoped highlighting engine.
//! * [`feed`]: tokio task that feeds positions from a playback clock.
//! * [`config`]: TOML settings and platform paths.

pub mod config;
pub mod engine;
pub mod feed;
pub mod provider;
pub mod timing;
