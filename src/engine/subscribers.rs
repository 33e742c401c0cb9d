//! Subscription registry for state listeners.

use std::sync::{Arc, Weak};

use crate::engine::highlighter::Shared;
use crate::engine::HighlightingState;

pub(crate) type Listener = Arc<dyn Fn(&HighlightingState) + Send + Sync>;

/// Registered listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove the listener registered as `id`; `false` if already gone.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by [`HighlightEngine::subscribe`].
///
/// Dropping it does **not** unsubscribe; call [`unsubscribe`](Self::unsubscribe).
/// The handle holds only a weak reference, so it never keeps an engine alive.
///
/// [`HighlightEngine::subscribe`]: crate::engine::HighlightEngine::subscribe
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    engine: Weak<Shared>,
}

impl Subscription {
    pub(crate) fn new(id: u64, engine: Weak<Shared>) -> Self {
        Self { id, engine }
    }

    /// Remove exactly this listener.
    ///
    /// Returns `true` if it was still registered.  Calling it again, after
    /// [`stop`](crate::engine::HighlightEngine::stop), or after the engine is
    /// gone is a harmless no-op returning `false`.
    pub fn unsubscribe(&self) -> bool {
        match self.engine.upgrade() {
            Some(shared) => shared.lock().listeners.remove(self.id),
            None => false,
        }
    }
}
