//! Highlighting state snapshots.
//!
//! [`HighlightingState`] is the single source of truth subscribers read.  The
//! engine owns the live copy behind its lock and hands out clones, so every
//! snapshot is internally consistent: a word index is never paired with a
//! position from a different update.

use std::fmt;
use std::time::Instant;

use crate::timing::WordTiming;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Token identifying one highlighting session.
///
/// Ids come from a per-engine generation counter that is bumped on every
/// `start_session` and `stop`, so a token held across a restart is always
/// recognisably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Lifecycle phase of the engine.
///
/// ```text
/// Idle ──start_session──▶ Loading ──table ok──▶ Active
///                                 ──not found / error──▶ Idle
/// any ──stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session; position calls are no-ops.
    #[default]
    Idle,
    /// A timing table is being fetched.
    Loading,
    /// A table is loaded and positions are being mapped to words.
    Active,
}

impl SessionPhase {
    /// Short label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Loading => "Loading",
            SessionPhase::Active => "Active",
        }
    }
}

// ---------------------------------------------------------------------------
// HighlightingState
// ---------------------------------------------------------------------------

/// Immutable snapshot of the engine's playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightingState {
    /// Session this snapshot belongs to; `None` when idle.
    pub session: Option<SessionId>,
    pub phase: SessionPhase,
    /// Elapsed playback time, clamped to `[0, duration_ms]`.
    pub position_ms: u64,
    /// Total passage length; `0` when no table is loaded.
    pub duration_ms: u64,
    /// Word being spoken, `None` before the first word (or when idle).
    pub word_index: Option<usize>,
    pub current_word: Option<WordTiming>,
    pub is_playing: bool,
    /// `true` while the position is at the end of the passage.
    pub is_complete: bool,
    pub updated_at: Instant,
}

impl HighlightingState {
    /// Snapshot of an engine with no session.
    pub fn inactive() -> Self {
        Self {
            session: None,
            phase: SessionPhase::Idle,
            position_ms: 0,
            duration_ms: 0,
            word_index: None,
            current_word: None,
            is_playing: false,
            is_complete: false,
            updated_at: Instant::now(),
        }
    }

    /// Fresh snapshot for a session that just loaded its table.
    pub(crate) fn started(session: SessionId, duration_ms: u64) -> Self {
        Self {
            session: Some(session),
            phase: SessionPhase::Active,
            duration_ms,
            is_playing: true,
            ..Self::inactive()
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Playback progress in `[0.0, 1.0]`; `0.0` without a duration.
    pub fn progress(&self) -> f32 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.position_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0) as f32
    }
}

impl Default for HighlightingState {
    fn default() -> Self {
        Self::inactive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
