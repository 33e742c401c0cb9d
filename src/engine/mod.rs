//! Highlighting engine module.
//!
//! Turns a stream of elapsed-playback positions into word-boundary
//! transitions for the active reading, and broadcasts state snapshots to any
//! number of subscribers.
//!
//! # Architecture
//!
//! ```text
//! start_session(key) ── async ──▶ TimingProvider::timing_data(key)
//!        │                               │
//!        │          NotFound / empty ────┴──▶ SessionStart::NoTimingData
//!        ▼
//! Arc<TimingTable> held by the active session
//!        │
//! PositionFeed / caller
//!        │  update_position(ms)
//!        ▼
//! binary search ─▶ word changed? ─▶ on_word_change(WordChange)
//!        │
//!        ├─▶ subscribers (HighlightingState snapshot)
//!        └─▶ reached duration? ─▶ on_complete()
//! ```
//!
//! Every [`HighlightEngine`] clone shares one session.  Snapshots are
//! delivered outside the engine lock, in the order the updates happened.

pub mod callbacks;
pub mod highlighter;
pub mod state;
pub mod subscribers;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use callbacks::{SessionCallbacks, WordChange};
pub use highlighter::{HighlightEngine, HighlightError, SessionInfo, SessionStart};
pub use state::{HighlightingState, SessionId, SessionPhase};
pub use subscribers::Subscription;
