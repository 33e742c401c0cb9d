//! Per-session callbacks and fault-isolated invocation.
//!
//! Every callback and listener call goes through [`invoke_guarded`], which
//! catches panics so a faulty UI handler can neither stop the remaining
//! handlers from running nor corrupt engine state.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::HighlightError;
use crate::timing::WordTiming;

/// Payload of the word-change callback.
#[derive(Debug, Clone, PartialEq)]
pub struct WordChange {
    /// Newly highlighted word; `None` after seeking before the first word.
    pub word: Option<WordTiming>,
    /// Word highlighted before this transition.
    pub previous: Option<WordTiming>,
    /// Position (ms) that triggered the transition.
    pub position_ms: u64,
    pub at: Instant,
}

impl WordChange {
    pub fn index(&self) -> Option<usize> {
        self.word.as_ref().map(|w| w.index)
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.previous.as_ref().map(|w| w.index)
    }
}

pub(crate) type WordChangeFn = Arc<dyn Fn(&WordChange) + Send + Sync>;
pub(crate) type CompleteFn = Arc<dyn Fn() + Send + Sync>;
pub(crate) type ErrorFn = Arc<dyn Fn(&HighlightError) + Send + Sync>;

/// Optional callbacks for one session, passed to
/// [`HighlightEngine::start_session`](crate::engine::HighlightEngine::start_session).
///
/// ```rust
/// use highlight_sync::engine::SessionCallbacks;
///
/// let callbacks = SessionCallbacks::new()
///     .on_word_change(|change| println!("now at {:?}", change.word))
///     .on_complete(|| println!("done"))
///     .on_error(|e| eprintln!("{e}"));
/// ```
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub(crate) word_change: Option<WordChangeFn>,
    pub(crate) complete: Option<CompleteFn>,
    pub(crate) error: Option<ErrorFn>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per word transition (never for the first word of a session).
    pub fn on_word_change(mut self, f: impl Fn(&WordChange) + Send + Sync + 'static) -> Self {
        self.word_change = Some(Arc::new(f));
        self
    }

    /// Called when the position reaches the end of the passage.
    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Some(Arc::new(f));
        self
    }

    /// Called when the session fails to start for a reason other than
    /// missing timing data.
    pub fn on_error(mut self, f: impl Fn(&HighlightError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("word_change", &self.word_change.is_some())
            .field("complete", &self.complete.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Run `f`, logging instead of unwinding if it panics.
///
/// Returns `false` when the call panicked.
pub(crate) fn invoke_guarded(what: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            log::error!("highlight: {what} panicked: {message}");
            false
        }
    }
}
