//! Highlighting engine: maps fed playback positions to the spoken word.
//!
//! [`HighlightEngine`] owns one session at a time.  A session starts with an
//! async fetch of the [`TimingTable`] through the injected
//! [`TimingProvider`]; after that every operation is synchronous and at most
//! O(log n).
//!
//! # Locking and delivery
//!
//! ```text
//! caller ──lock──▶ mutate state ─▶ push events onto outbox ──unlock──┐
//!                                                                    ▼
//!                         flush(): first caller to find the outbox idle
//!                         drains it, invoking listeners with no lock held
//! ```
//!
//! Events are queued in the same critical section as the mutation that
//! caused them, so delivery order always matches mutation order, even with
//! a timer thread and a UI thread racing.  Listeners may call back into the
//! engine; their events queue behind the one being delivered.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::HighlightConfig;
use crate::engine::callbacks::{invoke_guarded, CompleteFn, SessionCallbacks, WordChange, WordChangeFn};
use crate::engine::state::{HighlightingState, SessionId, SessionPhase};
use crate::engine::subscribers::{ListenerRegistry, Subscription};
use crate::provider::{ProviderError, TimingProvider};
use crate::timing::{ReadingKey, TimingError, TimingTable};

// ---------------------------------------------------------------------------
// HighlightError / SessionStart
// ---------------------------------------------------------------------------

/// Why a session could not start.
///
/// Missing timing data is not an error; see [`SessionStart::NoTimingData`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HighlightError {
    /// The provider failed (storage, network, timeout, unparsable payload).
    #[error("timing data provider failed: {0}")]
    Provider(ProviderError),

    /// The table violates the timing contract (unsorted, overlapping, …).
    #[error("invalid timing data: {0}")]
    InvalidTiming(TimingError),
}

impl From<ProviderError> for HighlightError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidData(inner) => HighlightError::InvalidTiming(inner),
            other => HighlightError::Provider(other),
        }
    }
}

/// Summary of a freshly started session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub key: ReadingKey,
    pub reference: String,
    pub word_count: usize,
    pub duration_ms: u64,
}

/// Non-error outcomes of [`HighlightEngine::start_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStart {
    /// Table loaded; positions now drive highlighting.
    Started(SessionInfo),
    /// The reading has no (or an empty) timing table.  Play audio without
    /// highlighting.
    NoTimingData,
    /// `stop` or a newer `start_session` ran while this one was fetching;
    /// its result was discarded.
    Superseded,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct ActiveSession {
    id: SessionId,
    key: ReadingKey,
    table: Arc<TimingTable>,
    config: HighlightConfig,
    callbacks: SessionCallbacks,
    /// Latched once any word has been highlighted; word-change callbacks are
    /// only fired after that.
    has_emitted_word: bool,
    completion_fired: bool,
}

enum Dispatch {
    State(HighlightingState),
    WordChange(WordChangeFn, WordChange),
    Complete(CompleteFn),
}

pub(crate) struct EngineInner {
    generation: u64,
    session: Option<ActiveSession>,
    state: HighlightingState,
    pub(crate) listeners: ListenerRegistry,
    outbox: VecDeque<Dispatch>,
    dispatching: bool,
}

/// Lock-protected engine core shared by every [`HighlightEngine`] clone.
pub(crate) struct Shared {
    inner: Mutex<EngineInner>,
}

impl Shared {
    /// Listeners never run under this lock, so a poisoned lock cannot hide a
    /// half-applied update; recover the guard instead of propagating.
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// HighlightEngine
// ---------------------------------------------------------------------------

/// Word-level highlighting engine.
///
/// Cheap to clone; clones share the same session.
///
/// ```rust
/// use std::sync::Arc;
/// use highlight_sync::config::HighlightConfig;
/// use highlight_sync::engine::{HighlightEngine, SessionCallbacks, SessionStart};
/// use highlight_sync::provider::MemoryProvider;
/// use highlight_sync::timing::{ReadingCategory, ReadingKey, TimingTable, WordTiming};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let key = ReadingKey::new("jn-3-16", ReadingCategory::Gospel, "2025-03-09".parse().unwrap());
/// let word = |text: &str, start, end, index| WordTiming {
///     text: text.into(), start_ms: start, end_ms: end, index, char_offset: 0, char_length: 0,
/// };
/// let table = TimingTable::new("jn-3-16", ReadingCategory::Gospel, "John 3:16", 900,
///     vec![word("For", 0, 340, 0), word("God", 340, 620, 1), word("so", 620, 900, 2)]).unwrap();
///
/// let provider = MemoryProvider::new();
/// provider.insert(key.clone(), table);
///
/// let engine = HighlightEngine::new(Arc::new(provider), HighlightConfig::default());
/// let started = engine.start_session(key, None, SessionCallbacks::new()).await.unwrap();
/// assert!(matches!(started, SessionStart::Started(_)));
///
/// assert_eq!(engine.update_position(400).word_index, Some(1));
/// # }
/// ```
#[derive(Clone)]
pub struct HighlightEngine {
    shared: Arc<Shared>,
    provider: Arc<dyn TimingProvider>,
    defaults: HighlightConfig,
}

impl HighlightEngine {
    /// Create an idle engine.
    ///
    /// * `provider`: source of timing tables.
    /// * `defaults`: session config used when `start_session` gets no override.
    pub fn new(provider: Arc<dyn TimingProvider>, defaults: HighlightConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(EngineInner {
                    generation: 0,
                    session: None,
                    state: HighlightingState::inactive(),
                    listeners: ListenerRegistry::default(),
                    outbox: VecDeque::new(),
                    dispatching: false,
                }),
            }),
            provider,
            defaults,
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Fetch the timing table for `key` and make it the active session.
    ///
    /// Any previous session is torn down before the fetch begins.  Returns
    /// [`SessionStart::NoTimingData`] when the reading has no (or an empty)
    /// table, and [`SessionStart::Superseded`] when `stop` or another
    /// `start_session` ran during the fetch.  Errors are also routed to
    /// `callbacks.on_error`; the engine stays idle afterwards.
    pub async fn start_session(
        &self,
        key: ReadingKey,
        config: Option<HighlightConfig>,
        callbacks: SessionCallbacks,
    ) -> Result<SessionStart, HighlightError> {
        let token = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            let token = SessionId(inner.generation);

            if let Some(old) = inner.session.take() {
                log::debug!("highlight: {} replaced by {token}", old.id);
            }
            discard_session_callbacks(&mut inner.outbox);
            inner.state = HighlightingState {
                session: Some(token),
                phase: SessionPhase::Loading,
                ..HighlightingState::inactive()
            };
            let snapshot = inner.state.clone();
            inner.outbox.push_back(Dispatch::State(snapshot));
            token
        };
        self.flush();

        log::debug!("highlight: {token} fetching timing data for {key}");
        let fetched = self.provider.timing_data(&key).await;

        let on_error = callbacks.error.clone();
        let outcome = {
            let mut inner = self.shared.lock();
            if inner.generation != token.0 {
                log::debug!("highlight: {token} superseded while fetching {key}");
                return Ok(SessionStart::Superseded);
            }

            let fetched = fetched.and_then(|table| check_key(&key, table));
            let outcome = match fetched {
                Ok(table) if !table.is_empty() => {
                    let info = SessionInfo {
                        id: token,
                        key: key.clone(),
                        reference: table.reference().to_string(),
                        word_count: table.len(),
                        duration_ms: table.duration_ms(),
                    };
                    inner.state = HighlightingState::started(token, table.duration_ms());
                    inner.session = Some(ActiveSession {
                        id: token,
                        key,
                        table: Arc::new(table),
                        config: config.unwrap_or_else(|| self.defaults.clone()),
                        callbacks,
                        has_emitted_word: false,
                        completion_fired: false,
                    });
                    log::info!(
                        "highlight: {token} started for {} ({} words, {} ms)",
                        info.key,
                        info.word_count,
                        info.duration_ms
                    );
                    Ok(SessionStart::Started(info))
                }
                Ok(_) => {
                    log::info!("highlight: timing table for {key} has no words; audio only");
                    inner.state = HighlightingState::inactive();
                    Ok(SessionStart::NoTimingData)
                }
                Err(e) if e.is_not_found() => {
                    log::info!("highlight: no timing data for {key}; audio only");
                    inner.state = HighlightingState::inactive();
                    Ok(SessionStart::NoTimingData)
                }
                Err(e) => {
                    let err = HighlightError::from(e);
                    match &err {
                        HighlightError::InvalidTiming(_) => {
                            log::warn!("highlight: rejecting timing data for {key}: {err}")
                        }
                        HighlightError::Provider(_) => {
                            log::error!("highlight: could not load timing data for {key}: {err}")
                        }
                    }
                    inner.state = HighlightingState::inactive();
                    Err(err)
                }
            };

            let snapshot = inner.state.clone();
            inner.outbox.push_back(Dispatch::State(snapshot));
            outcome
        };
        self.flush();

        if let (Err(err), Some(cb)) = (&outcome, on_error) {
            invoke_guarded("error callback", || cb(err));
        }
        outcome
    }

    /// End the session: cancel any in-flight fetch, drop the table, clear
    /// every listener and reset to the idle state.
    ///
    /// The engine can be started again afterwards; positions fed with the
    /// old [`SessionId`] are ignored.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if let Some(old) = inner.session.take() {
            log::info!("highlight: {} stopped", old.id);
        }
        discard_session_callbacks(&mut inner.outbox);
        inner.listeners.clear();
        inner.state = HighlightingState::inactive();
    }

    // -----------------------------------------------------------------------
    // Position feed and controls
    // -----------------------------------------------------------------------

    /// Feed the latest elapsed playback time.
    ///
    /// Marks the session as playing.  Without an active session this is a
    /// no-op returning the idle snapshot.
    pub fn update_position(&self, position_ms: u64) -> HighlightingState {
        let state = {
            let mut inner = self.shared.lock();
            apply_position(&mut inner, position_ms, true)
        };
        self.flush();
        state
    }

    /// Like [`update_position`](Self::update_position), but only applied when
    /// `session` is still current.  Returns `None` for a stale token.
    pub fn update_position_for(
        &self,
        session: SessionId,
        position_ms: u64,
    ) -> Option<HighlightingState> {
        let state = {
            let mut inner = self.shared.lock();
            if inner.session.as_ref().map(|s| s.id) != Some(session) {
                return None;
            }
            apply_position(&mut inner, position_ms, true)
        };
        self.flush();
        Some(state)
    }

    /// Jump to `position_ms`, clamped to `[0, duration]`.
    ///
    /// Fires a word-change event when the word under the new position
    /// differs from the current one.  The playing flag is left as is.
    pub fn seek(&self, position_ms: u64) -> HighlightingState {
        let state = {
            let mut inner = self.shared.lock();
            let clamped = match &inner.session {
                Some(session) => position_ms.min(session.table.duration_ms()),
                None => return inner.state.clone(),
            };
            apply_position(&mut inner, clamped, false)
        };
        self.flush();
        state
    }

    pub fn pause(&self) -> HighlightingState {
        self.set_playing(false)
    }

    pub fn resume(&self) -> HighlightingState {
        self.set_playing(true)
    }

    fn set_playing(&self, playing: bool) -> HighlightingState {
        let state = {
            let mut inner = self.shared.lock();
            if inner.session.is_some() && inner.state.is_playing != playing {
                inner.state.is_playing = playing;
                inner.state.updated_at = Instant::now();
                let snapshot = inner.state.clone();
                inner.outbox.push_back(Dispatch::State(snapshot));
            }
            inner.state.clone()
        };
        self.flush();
        state
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Register `listener` for every emitted state change.
    ///
    /// Listeners run outside the engine lock, in registration order; a
    /// panicking listener is logged and skipped.
    pub fn subscribe(
        &self,
        listener: impl Fn(&HighlightingState) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.shared.lock().listeners.add(Arc::new(listener));
        Subscription::new(id, Arc::downgrade(&self.shared))
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current snapshot.
    pub fn state(&self) -> HighlightingState {
        self.shared.lock().state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.lock().session.as_ref().map(|s| s.id)
    }

    pub fn reading_key(&self) -> Option<ReadingKey> {
        self.shared.lock().session.as_ref().map(|s| s.key.clone())
    }

    /// Table of the active session.
    pub fn table(&self) -> Option<Arc<TimingTable>> {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(|s| Arc::clone(&s.table))
    }

    /// Feed cadence for the active session (engine default when idle).
    pub fn update_interval(&self) -> Duration {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(|s| s.config.update_interval())
            .unwrap_or_else(|| self.defaults.update_interval())
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Deliver queued events unless another caller is already doing so.
    fn flush(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.dispatching || inner.outbox.is_empty() {
                return;
            }
            inner.dispatching = true;
        }

        loop {
            let (item, listeners) = {
                let mut inner = self.shared.lock();
                match inner.outbox.pop_front() {
                    Some(item @ Dispatch::State(_)) => (item, inner.listeners.snapshot()),
                    Some(item) => (item, Vec::new()),
                    None => {
                        inner.dispatching = false;
                        return;
                    }
                }
            };

            match item {
                Dispatch::State(state) => {
                    for listener in listeners {
                        invoke_guarded("state listener", || listener(&state));
                    }
                }
                Dispatch::WordChange(cb, change) => {
                    invoke_guarded("word-change callback", || cb(&change));
                }
                Dispatch::Complete(cb) => {
                    invoke_guarded("completion callback", || cb());
                }
            }
        }
    }
}

impl std::fmt::Debug for HighlightEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("HighlightEngine")
            .field("generation", &inner.generation)
            .field("state", &inner.state)
            .field("listeners", &inner.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Drop queued word-change and completion callbacks of a session that is
/// ending.  State snapshots stay queued for the listeners still registered.
fn discard_session_callbacks(outbox: &mut VecDeque<Dispatch>) {
    outbox.retain(|d| matches!(d, Dispatch::State(_)));
}

/// Reject a table filed under another reading.
fn check_key(key: &ReadingKey, table: TimingTable) -> Result<TimingTable, ProviderError> {
    if table.reading_id() == key.reading_id && table.category() == key.category {
        return Ok(table);
    }
    Err(ProviderError::InvalidData(TimingError::KeyMismatch {
        expected: format!("{}/{}", key.category, key.reading_id),
        found: format!("{}/{}", table.category(), table.reading_id()),
    }))
}

/// Apply a position to the active session and queue the resulting events.
///
/// `position_ms` is clamped to the table's duration before lookup; the
/// unclamped value decides completion.
fn apply_position(inner: &mut EngineInner, position_ms: u64, mark_playing: bool) -> HighlightingState {
    let EngineInner {
        session,
        state,
        outbox,
        ..
    } = inner;
    let Some(session) = session.as_mut() else {
        return state.clone();
    };

    let now = Instant::now();
    let duration_ms = session.table.duration_ms();
    let clamped = position_ms.min(duration_ms);
    let index = session.table.word_index_at(clamped);
    let was_playing = state.is_playing;

    state.position_ms = clamped;
    state.updated_at = now;
    if mark_playing {
        state.is_playing = true;
    }

    let word_changed = index != state.word_index;
    if word_changed {
        let previous = state.current_word.take();
        let word = index.and_then(|i| session.table.word(i)).cloned();
        log::debug!(
            "highlight: {} word {:?} → {:?} at {clamped} ms",
            session.id,
            state.word_index,
            index
        );

        state.word_index = index;
        state.current_word = word.clone();

        if session.has_emitted_word {
            if let Some(cb) = &session.callbacks.word_change {
                outbox.push_back(Dispatch::WordChange(
                    Arc::clone(cb),
                    WordChange {
                        word,
                        previous,
                        position_ms: clamped,
                        at: now,
                    },
                ));
            }
        }
        if index.is_some() {
            session.has_emitted_word = true;
        }
    }

    // The snapshot flag tracks the current position; `completion_fired`
    // latches the callback.
    let at_end = position_ms >= duration_ms;
    let completion_changed = state.is_complete != at_end;
    state.is_complete = at_end;

    let mut fire_complete = false;
    let mut newly_complete = false;
    if at_end {
        newly_complete = !session.completion_fired;
        fire_complete = newly_complete || !session.config.fire_completion_once;
        session.completion_fired = true;
    }

    let notify = word_changed
        || completion_changed
        || was_playing != state.is_playing
        || session.config.emit_position_updates;
    if notify {
        outbox.push_back(Dispatch::State(state.clone()));
    }

    if fire_complete {
        if newly_complete {
            log::info!("highlight: {} reached the end of {}", session.id, session.key);
        }
        if let Some(cb) = &session.callbacks.complete {
            outbox.push_back(Dispatch::Complete(Arc::clone(cb)));
        }
    }

    state.clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::provider::MemoryProvider;
    use crate::timing::{ReadingCategory, WordTiming};

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    fn word(text: &str, start_ms: u64, end_ms: u64, index: usize) -> WordTiming {
        WordTiming {
            text: text.into(),
            start_ms,
            end_ms,
            index,
            char_offset: 0,
            char_length: text.len(),
        }
    }

    fn key() -> ReadingKey {
        ReadingKey::new("jn-3-16", ReadingCategory::Gospel, "2025-03-09".parse().unwrap())
    }

    /// "For" [0,340) "God" [340,620) "so" [620,900), duration 900.
    fn table() -> TimingTable {
        TimingTable::new(
            "jn-3-16",
            ReadingCategory::Gospel,
            "John 3:16",
            900,
            vec![word("For", 0, 340, 0), word("God", 340, 620, 1), word("so", 620, 900, 2)],
        )
        .unwrap()
    }

    fn engine_with(table: TimingTable, config: HighlightConfig) -> HighlightEngine {
        let provider = MemoryProvider::new();
        provider.insert(key(), table);
        HighlightEngine::new(Arc::new(provider), config)
    }

    async fn started(engine: &HighlightEngine, callbacks: SessionCallbacks) -> SessionId {
        match engine.start_session(key(), None, callbacks).await.unwrap() {
            SessionStart::Started(info) => info.id,
            other => panic!("expected Started, got {other:?}"),
        }
    }

    /// Records the index of every word-change callback.
    fn recording_callbacks() -> (SessionCallbacks, Arc<Mutex<Vec<(Option<usize>, Option<usize>)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let callbacks = SessionCallbacks::new().on_word_change(move |change| {
            sink.lock()
                .unwrap()
                .push((change.previous_index(), change.index()));
        });
        (callbacks, log)
    }

    struct FailingProvider(ProviderError);

    #[async_trait]
    impl TimingProvider for FailingProvider {
        async fn timing_data(&self, _key: &ReadingKey) -> Result<TimingTable, ProviderError> {
            Err(self.0.clone())
        }
    }

    /// Blocks inside `timing_data` until released.
    struct GatedProvider {
        inner: MemoryProvider,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TimingProvider for GatedProvider {
        async fn timing_data(&self, key: &ReadingKey) -> Result<TimingTable, ProviderError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.timing_data(key).await
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn start_session_reports_table_summary() {
        let engine = engine_with(table(), HighlightConfig::default());
        let outcome = engine
            .start_session(key(), None, SessionCallbacks::new())
            .await
            .unwrap();

        let SessionStart::Started(info) = outcome else {
            panic!("expected Started");
        };
        assert_eq!(info.word_count, 3);
        assert_eq!(info.duration_ms, 900);
        assert_eq!(info.reference, "John 3:16");
        assert_eq!(engine.session_id(), Some(info.id));
        assert_eq!(engine.reading_key(), Some(key()));
        assert_eq!(engine.table().map(|t| t.len()), Some(3));

        let state = engine.state();
        assert!(state.is_active());
        assert!(state.is_playing);
        assert_eq!(state.position_ms, 0);
        assert_eq!(state.word_index, None);
    }

    #[tokio::test]
    async fn missing_table_is_no_timing_data() {
        let engine = HighlightEngine::new(Arc::new(MemoryProvider::new()), HighlightConfig::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let callbacks = SessionCallbacks::new().on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = engine.start_session(key(), None, callbacks).await.unwrap();
        assert_eq!(outcome, SessionStart::NoTimingData);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(!engine.is_active());
        assert_eq!(engine.state().phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn empty_table_is_no_timing_data() {
        let empty = TimingTable::new("jn-3-16", ReadingCategory::Gospel, "", 0, Vec::new()).unwrap();
        let engine = engine_with(empty, HighlightConfig::default());
        let outcome = engine
            .start_session(key(), None, SessionCallbacks::new())
            .await
            .unwrap();
        assert_eq!(outcome, SessionStart::NoTimingData);
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn provider_fault_is_reported_through_callback() {
        let engine = HighlightEngine::new(
            Arc::new(FailingProvider(ProviderError::Timeout)),
            HighlightConfig::default(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callbacks = SessionCallbacks::new().on_error(move |e| sink.lock().unwrap().push(e.clone()));

        let err = engine.start_session(key(), None, callbacks).await.unwrap_err();
        assert_eq!(err, HighlightError::Provider(ProviderError::Timeout));
        assert_eq!(seen.lock().unwrap().as_slice(), &[err]);
        assert!(!engine.is_active());

        // Engine stays usable as a no-op.
        assert_eq!(engine.update_position(100).phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn invalid_table_is_invalid_timing() {
        let violation = TimingError::Overlap {
            index: 1,
            start_ms: 300,
            previous_end_ms: 340,
        };
        let engine = HighlightEngine::new(
            Arc::new(FailingProvider(ProviderError::InvalidData(violation.clone()))),
            HighlightConfig::default(),
        );
        let err = engine
            .start_session(key(), None, SessionCallbacks::new())
            .await
            .unwrap_err();
        assert_eq!(err, HighlightError::InvalidTiming(violation));
    }

    #[tokio::test]
    async fn stop_during_fetch_supersedes_start() {
        let inner = MemoryProvider::new();
        inner.insert(key(), table());
        let provider = Arc::new(GatedProvider {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        });
        let engine = HighlightEngine::new(provider.clone(), HighlightConfig::default());

        let task = tokio::spawn({
            let engine = engine.clone();
            async move {
                engine
                    .start_session(key(), None, SessionCallbacks::new())
                    .await
            }
        });

        provider.entered.notified().await;
        assert_eq!(engine.state().phase, SessionPhase::Loading);
        engine.stop();
        provider.release.notify_one();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, SessionStart::Superseded);
        assert!(!engine.is_active());
        assert_eq!(engine.state().phase, SessionPhase::Idle);
        assert_eq!(engine.update_position(400).word_index, None);
    }

    #[tokio::test]
    async fn table_for_another_reading_is_rejected() {
        let psalm = TimingTable::new(
            "ps-23",
            ReadingCategory::Psalm,
            "Psalm 23:1",
            900,
            vec![word("The", 0, 300, 0), word("Lord", 300, 900, 1)],
        )
        .unwrap();
        // Filed under the gospel key.
        let engine = engine_with(psalm, HighlightConfig::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let callbacks = SessionCallbacks::new().on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = engine.start_session(key(), None, callbacks).await.unwrap_err();
        assert_eq!(
            err,
            HighlightError::InvalidTiming(TimingError::KeyMismatch {
                expected: "gospel/jn-3-16".into(),
                found: "psalm/ps-23".into(),
            })
        );
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!engine.is_active());
        assert!(engine.table().is_none());
    }

    #[tokio::test]
    async fn stop_from_listener_drops_pending_session_callbacks() {
        let engine = engine_with(table(), HighlightConfig::default());
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        started(&engine, SessionCallbacks::new().on_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        let handle = engine.clone();
        engine.subscribe(move |s: &HighlightingState| {
            if s.position_ms == 900 {
                handle.stop();
            }
        });

        engine.update_position(900);
        assert!(!engine.is_active());
        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_token_is_ignored_after_restart() {
        let engine = engine_with(table(), HighlightConfig::default());
        let first = started(&engine, SessionCallbacks::new()).await;
        engine.stop();
        let second = started(&engine, SessionCallbacks::new()).await;
        assert_ne!(first, second);

        assert!(engine.update_position_for(first, 400).is_none());
        assert_eq!(engine.state().position_ms, 0);

        let state = engine.update_position_for(second, 400).unwrap();
        assert_eq!(state.word_index, Some(1));
    }

    #[tokio::test]
    async fn stop_resets_state_and_clears_listeners() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        let sub = engine.subscribe(|_| {});
        engine.update_position(400);

        engine.stop();
        assert_eq!(engine.listener_count(), 0);
        assert!(!sub.unsubscribe());
        assert_eq!(engine.state(), HighlightingState {
            updated_at: engine.state().updated_at,
            ..HighlightingState::inactive()
        });
        assert!(engine.table().is_none());
    }

    // -----------------------------------------------------------------------
    // Position mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn positions_map_to_words() {
        let engine = engine_with(table(), HighlightConfig::default());
        let (callbacks, changes) = recording_callbacks();
        started(&engine, callbacks).await;

        assert_eq!(engine.update_position(0).word_index, Some(0));
        assert_eq!(engine.update_position(339).word_index, Some(0));
        let state = engine.update_position(340);
        assert_eq!(state.word_index, Some(1));
        assert_eq!(state.current_word.as_ref().map(|w| w.text.as_str()), Some("God"));
        assert_eq!(engine.update_position(700).word_index, Some(2));

        // The first highlighted word is not announced as a change.
        assert_eq!(
            changes.lock().unwrap().as_slice(),
            &[(Some(0), Some(1)), (Some(1), Some(2))]
        );
    }

    #[tokio::test]
    async fn repeated_positions_in_one_word_fire_nothing() {
        let engine = engine_with(table(), HighlightConfig::default());
        let (callbacks, changes) = recording_callbacks();
        started(&engine, callbacks).await;

        engine.update_position(350);
        for p in [360, 400, 500, 619] {
            assert_eq!(engine.update_position(p).word_index, Some(1));
        }
        assert!(changes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn monotonic_sweep_visits_every_word_once() {
        let engine = engine_with(table(), HighlightConfig::default());
        let (callbacks, changes) = recording_callbacks();
        started(&engine, callbacks).await;

        let mut last = None;
        for p in (0..=900).step_by(10) {
            let index = engine.update_position(p).word_index;
            assert!(index >= last, "word index went backwards at {p} ms");
            last = index;
        }
        assert_eq!(
            changes.lock().unwrap().as_slice(),
            &[(Some(0), Some(1)), (Some(1), Some(2))]
        );
    }

    #[tokio::test]
    async fn position_past_end_is_clamped_and_completes() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;

        let state = engine.update_position(5_000);
        assert_eq!(state.position_ms, 900);
        assert_eq!(state.word_index, Some(2));
        assert!(state.is_complete);
        assert!((state.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn idle_engine_ignores_positions() {
        let engine = engine_with(table(), HighlightConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        engine.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let state = engine.update_position(400);
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.word_index, None);
        assert!(engine.seek(400).word_index.is_none());
        assert!(!engine.pause().is_playing);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn completion_fires_once_by_default() {
        let engine = engine_with(table(), HighlightConfig::default());
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        started(&engine, SessionCallbacks::new().on_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        engine.update_position(899);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
        engine.update_position(900);
        engine.update_position(950);
        engine.update_position(900);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completion_repeats_when_unlatched() {
        let config = HighlightConfig {
            fire_completion_once: false,
            ..HighlightConfig::default()
        };
        let engine = engine_with(table(), config);
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        started(&engine, SessionCallbacks::new().on_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        engine.update_position(900);
        engine.update_position(900);
        assert_eq!(completions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn seeking_back_from_the_end_clears_completion() {
        let engine = engine_with(table(), HighlightConfig::default());
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        started(&engine, SessionCallbacks::new().on_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        assert!(engine.update_position(900).is_complete);
        let state = engine.seek(10);
        assert!(!state.is_complete);
        assert_eq!(state.word_index, Some(0));
        assert!(!engine.state().is_complete);

        // Reaching the end again flags the snapshot but keeps the latch.
        assert!(engine.update_position(900).is_complete);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn leaving_the_end_is_published_in_quiet_mode() {
        let config = HighlightConfig {
            emit_position_updates: false,
            ..HighlightConfig::default()
        };
        let engine = engine_with(table(), config);
        started(&engine, SessionCallbacks::new()).await;
        engine.update_position(850);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.subscribe(move |s: &HighlightingState| sink.lock().unwrap().push(s.is_complete));

        engine.update_position(900);
        engine.seek(880);
        assert_eq!(seen.lock().unwrap().as_slice(), &[true, false]);
    }

    // -----------------------------------------------------------------------
    // Seek / pause / resume
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn seek_fires_word_change_only_when_word_differs() {
        let engine = engine_with(table(), HighlightConfig::default());
        let (callbacks, changes) = recording_callbacks();
        started(&engine, callbacks).await;

        engine.update_position(100);
        let state = engine.seek(650);
        assert_eq!(state.word_index, Some(2));
        assert_eq!(changes.lock().unwrap().len(), 1);

        engine.seek(700);
        assert_eq!(changes.lock().unwrap().len(), 1);

        engine.seek(10);
        assert_eq!(
            changes.lock().unwrap().as_slice(),
            &[(Some(0), Some(2)), (Some(2), Some(0))]
        );
    }

    #[tokio::test]
    async fn seek_keeps_playing_flag_and_clamps() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;

        engine.update_position(100);
        engine.pause();
        let state = engine.seek(10_000);
        assert!(!state.is_playing);
        assert_eq!(state.position_ms, 900);
        assert_eq!(state.word_index, Some(2));
    }

    #[tokio::test]
    async fn seek_into_lead_in_clears_the_word() {
        let lead_in = TimingTable::new(
            "jn-3-16",
            ReadingCategory::Gospel,
            "John 3:16",
            1_000,
            vec![word("In", 200, 500, 0), word("the", 500, 800, 1)],
        )
        .unwrap();
        let engine = engine_with(lead_in, HighlightConfig::default());
        let (callbacks, changes) = recording_callbacks();
        started(&engine, callbacks).await;

        assert_eq!(engine.update_position(100).word_index, None);
        engine.update_position(600);
        let state = engine.seek(50);
        assert_eq!(state.word_index, None);
        assert!(state.current_word.is_none());
        // "In" was never announced: the first word emitted was "the".
        assert_eq!(changes.lock().unwrap().as_slice(), &[(Some(1), None)]);
    }

    #[tokio::test]
    async fn pause_and_resume_keep_position_and_word() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        engine.update_position(400);

        let paused = engine.pause();
        assert!(!paused.is_playing);
        assert_eq!(paused.position_ms, 400);
        assert_eq!(paused.word_index, Some(1));

        let resumed = engine.resume();
        assert!(resumed.is_playing);
        assert_eq!(resumed.position_ms, 400);
        assert_eq!(resumed.word_index, Some(1));
    }

    #[tokio::test]
    async fn redundant_pause_does_not_notify() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        engine.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.pause();
        engine.pause();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        engine.resume();
        engine.resume();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn position_update_while_paused_resumes_playback() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        engine.pause();
        assert!(engine.update_position(100).is_playing);
    }

    // -----------------------------------------------------------------------
    // Subscribers
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn quiet_config_notifies_only_on_transitions() {
        let config = HighlightConfig {
            emit_position_updates: false,
            ..HighlightConfig::default()
        };
        let engine = engine_with(table(), config);
        started(&engine, SessionCallbacks::new()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.subscribe(move |s: &HighlightingState| sink.lock().unwrap().push(s.word_index));

        for p in [0, 100, 200, 400, 500, 700] {
            engine.update_position(p);
        }
        assert_eq!(seen.lock().unwrap().as_slice(), &[Some(0), Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn every_position_is_published_by_default() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.subscribe(move |s: &HighlightingState| sink.lock().unwrap().push(s.position_ms));

        for p in [0, 100, 200] {
            engine.update_position(p);
        }
        assert_eq!(seen.lock().unwrap().as_slice(), &[0, 100, 200]);
    }

    #[tokio::test]
    async fn unsubscribe_is_exact_and_idempotent() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&a_calls), Arc::clone(&b_calls));
        let sub_a = engine.subscribe(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        engine.subscribe(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub_a.unsubscribe());
        assert!(!sub_a.unsubscribe());
        assert_eq!(engine.listener_count(), 1);

        engine.update_position(10);
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_others() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;
        engine.subscribe(|_| panic!("listener bug"));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        engine.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.update_position(100);
        engine.update_position(400);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.state().word_index, Some(1));
    }

    #[tokio::test]
    async fn listener_may_call_back_into_engine() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = engine.clone();
        engine.subscribe(move |s: &HighlightingState| {
            sink.lock().unwrap().push((s.word_index, s.is_playing));
            if s.word_index == Some(1) && s.is_playing {
                handle.pause();
            }
        });

        engine.update_position(400);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[(Some(1), true), (Some(1), false)]
        );
        assert!(!engine.state().is_playing);
        engine.stop();
    }

    #[tokio::test]
    async fn concurrent_feeders_deliver_identical_ordered_snapshots() {
        let engine = engine_with(table(), HighlightConfig::default());
        started(&engine, SessionCallbacks::new()).await;

        let record = || {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let listener = move |s: &HighlightingState| {
                let word_matches = s.current_word.as_ref().map(|w| w.index) == s.word_index;
                sink.lock().unwrap().push((s.position_ms, s.word_index, word_matches));
            };
            (seen, listener)
        };
        let (first, listener_a) = record();
        let (second, listener_b) = record();
        engine.subscribe(listener_a);
        engine.subscribe(listener_b);

        let feeders: Vec<_> = (0..2u64)
            .map(|offset| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for p in (offset..880).step_by(2) {
                        engine.update_position(p);
                    }
                })
            })
            .collect();
        for feeder in feeders {
            feeder.join().unwrap();
        }

        let first = first.lock().unwrap();
        let second = second.lock().unwrap();
        assert_eq!(first.len(), 880);
        assert_eq!(*first, *second);
        assert!(first.iter().all(|&(_, _, consistent)| consistent));
    }

    #[tokio::test]
    async fn update_interval_follows_session_config() {
        let engine = engine_with(table(), HighlightConfig::default());
        assert_eq!(engine.update_interval(), Duration::from_millis(100));

        let fast = HighlightConfig {
            update_interval_ms: 40,
            ..HighlightConfig::default()
        };
        engine
            .start_session(key(), Some(fast), SessionCallbacks::new())
            .await
            .unwrap();
        assert_eq!(engine.update_interval(), Duration::from_millis(40));
    }
}
