//! Tokio task that polls a [`PositionSource`] on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{HighlightEngine, SessionId};
use crate::feed::PositionSource;

// ---------------------------------------------------------------------------
// PositionFeed
// ---------------------------------------------------------------------------

pub struct PositionFeed;

impl PositionFeed {
    /// Spawn a task feeding `source` into `engine` every `interval` for
    /// `session`.
    ///
    /// A zero interval is raised to 1 ms.  Late ticks are skipped rather than
    /// bursted, so a stalled runtime never floods subscribers with stale
    /// positions.  The task ends by itself when `session` is no longer the
    /// engine's current session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        engine: HighlightEngine,
        session: SessionId,
        source: Arc<dyn PositionSource>,
        interval: Duration,
    ) -> FeedHandle {
        let interval = interval.max(Duration::from_millis(1));
        log::debug!("feed: {session} polling every {interval:?}");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if engine.session_id() != Some(session) {
                    break;
                }
                if !source.is_playing() {
                    continue;
                }
                let Some(position_ms) = source.position_ms() else {
                    continue;
                };
                if engine.update_position_for(session, position_ms).is_none() {
                    break;
                }
            }

            log::debug!("feed: {session} no longer current; feed exiting");
        });

        FeedHandle { task }
    }
}

// ---------------------------------------------------------------------------
// FeedHandle
// ---------------------------------------------------------------------------

/// Handle to a running feed task.  Dropping it stops the feed.
#[derive(Debug)]
pub struct FeedHandle {
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Abort the feed task.  Safe to call more than once.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
