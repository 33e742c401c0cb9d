//! Position feed: drives a [`HighlightEngine`] from a playback clock.
//!
//! The engine itself never reads the clock.  A [`PositionFeed`] task polls a
//! [`PositionSource`] at the session's update interval and forwards each
//! reading with [`HighlightEngine::update_position_for`], so it retires by
//! itself once its session is stopped or replaced.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use highlight_sync::engine::HighlightEngine;
//! use highlight_sync::feed::{PositionFeed, SimulatedPlayer};
//!
//! # async fn demo(engine: HighlightEngine) {
//! let session = engine.session_id().expect("session started");
//! let player = Arc::new(SimulatedPlayer::new(12_000));
//! let feed = PositionFeed::spawn(engine.clone(), session, player.clone(), engine.update_interval());
//!
//! // ... later
//! feed.stop();
//! # }
//! ```
//!
//! [`HighlightEngine`]: crate::engine::HighlightEngine
//! [`HighlightEngine::update_position_for`]: crate::engine::HighlightEngine::update_position_for

pub mod player;
pub mod ticker;

pub use player::SimulatedPlayer;
pub use ticker::{FeedHandle, PositionFeed};

// ---------------------------------------------------------------------------
// PositionSource
// ---------------------------------------------------------------------------

/// Anything that can report elapsed playback time: an audio player, a
/// media-session bridge, a test clock.
pub trait PositionSource: Send + Sync {
    /// Elapsed playback in milliseconds, or `None` while the player is not
    /// ready (the tick is skipped).
    fn position_ms(&self) -> Option<u64>;

    /// Whether the clock is advancing.  Ticks are skipped while this is
    /// `false` so a paused player does not mark the engine as playing.
    fn is_playing(&self) -> bool {
        true
    }
}
