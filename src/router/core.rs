//! Event router: per-session fan-out, global listeners, orphan buffers.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::identifiers::{SessionKey, SubscriptionId};
use crate::protocol::Event;

use super::session_key::extract_session_key;
use super::subscription::Subscription;

// ============================================================================
// Constants
// ============================================================================

/// Default time an orphan buffer waits for its first subscriber.
pub const DEFAULT_BUFFER_GRACE: Duration = Duration::from_secs(30);

/// Maximum events buffered per session key.
pub const MAX_BUFFERED_EVENTS: usize = 512;

// ============================================================================
// Types
// ============================================================================

/// Event listener callback.
///
/// Called synchronously on the socket's dispatch path; keep it short.
/// A panicking listener is logged and skipped.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Events queued for a session key nobody listens to yet.
struct OrphanBuffer {
    events: VecDeque<Event>,
    /// Identifies the timer currently armed for this buffer.
    generation: u64,
    expiry: Option<JoinHandle<()>>,
}

impl OrphanBuffer {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            generation: 0,
            expiry: None,
        }
    }

    fn cancel_expiry(&mut self) {
        if let Some(handle) = self.expiry.take() {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct RouterState {
    sessions: FxHashMap<SessionKey, Vec<(SubscriptionId, Listener)>>,
    global: Vec<(SubscriptionId, Listener)>,
    buffers: FxHashMap<SessionKey, OrphanBuffer>,
    next_generation: u64,
}

pub(super) struct RouterInner {
    /// Serializes delivery so a flush and a live dispatch never interleave.
    /// Reentrant so listeners may subscribe from inside a callback.
    delivery: ReentrantMutex<()>,
    state: Mutex<RouterState>,
    grace: Duration,
    max_buffered: usize,
}

// ============================================================================
// EventRouter
// ============================================================================

/// Routes inbound events to session and global listeners.
///
/// Cloning yields another handle to the same router. Registrations and
/// buffers survive reconnects; only [`EventRouter::clear`] drops them.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_GRACE)
    }
}

impl EventRouter {
    /// Creates a router whose orphan buffers expire after `grace`.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self::with_capacity(grace, MAX_BUFFERED_EVENTS)
    }

    /// Creates a router with a custom per-session buffer cap.
    #[must_use]
    pub fn with_capacity(grace: Duration, max_buffered: usize) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(RouterState::default()),
                grace,
                max_buffered: max_buffered.max(1),
            }),
        }
    }

    /// Returns the orphan buffer grace window.
    #[inline]
    #[must_use]
    pub fn grace(&self) -> Duration {
        self.inner.grace
    }
}

// ============================================================================
// EventRouter - Dispatch
// ============================================================================

impl EventRouter {
    /// Delivers one event.
    ///
    /// Global listeners always receive it. If a session key is found and
    /// has listeners, they receive it too; otherwise it is buffered for
    /// the first subscriber of that key.
    pub fn dispatch(&self, event: Event) {
        let _delivery = self.inner.delivery.lock();
        let key = extract_session_key(&event.payload);

        let (global, session) = {
            let mut state = self.inner.state.lock();
            let global: Vec<Listener> = state.global.iter().map(|(_, l)| Arc::clone(l)).collect();

            let session = match &key {
                Some(key) => {
                    let listeners: Vec<Listener> = state
                        .sessions
                        .get(key)
                        .map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)).collect())
                        .unwrap_or_default();

                    if listeners.is_empty() {
                        self.inner.buffer(&mut state, key.clone(), event.clone());
                        None
                    } else {
                        Some(listeners)
                    }
                }
                None => None,
            };

            (global, session)
        };

        trace!(
            event = %event.event,
            session_key = ?key,
            global = global.len(),
            session = session.as_ref().map_or(0, Vec::len),
            "Dispatching event"
        );

        for listener in session.iter().flatten() {
            invoke(listener, &event);
        }
        for listener in &global {
            invoke(listener, &event);
        }
    }
}

// ============================================================================
// EventRouter - Subscriptions
// ============================================================================

impl EventRouter {
    /// Registers a listener for one session key.
    ///
    /// Any backlog buffered for the key is flushed to this listener, in
    /// arrival order, before this call returns.
    pub fn subscribe<F>(&self, session_key: impl Into<SessionKey>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let key = session_key.into();
        let listener: Listener = Arc::new(listener);
        let id = SubscriptionId::next();

        let _delivery = self.inner.delivery.lock();
        let backlog = {
            let mut state = self.inner.state.lock();
            state
                .sessions
                .entry(key.clone())
                .or_default()
                .push((id, Arc::clone(&listener)));

            state.buffers.remove(&key).map(|mut buffer| {
                buffer.cancel_expiry();
                buffer.events
            })
        };

        debug!(session_key = %key, %id, "Session listener registered");

        if let Some(backlog) = backlog {
            debug!(session_key = %key, count = backlog.len(), "Flushing buffered events");
            for event in &backlog {
                invoke(&listener, event);
            }
        }

        Subscription::new(Arc::downgrade(&self.inner), Some(key), id)
    }

    /// Registers a listener for every event.
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.inner.state.lock().global.push((id, Arc::new(listener)));
        debug!(%id, "Global listener registered");

        Subscription::new(Arc::downgrade(&self.inner), None, id)
    }

    /// Drops every listener and buffer.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for buffer in state.buffers.values_mut() {
            buffer.cancel_expiry();
        }
        state.buffers.clear();
        state.sessions.clear();
        state.global.clear();
        debug!("Event router cleared");
    }
}

// ============================================================================
// EventRouter - Introspection
// ============================================================================

impl EventRouter {
    /// Returns the number of listeners on `session_key`.
    #[must_use]
    pub fn listener_count(&self, session_key: &SessionKey) -> usize {
        self.inner
            .state
            .lock()
            .sessions
            .get(session_key)
            .map_or(0, Vec::len)
    }

    /// Returns the number of global listeners.
    #[must_use]
    pub fn global_listener_count(&self) -> usize {
        self.inner.state.lock().global.len()
    }

    /// Returns the number of events buffered for `session_key`.
    #[must_use]
    pub fn buffered_len(&self, session_key: &SessionKey) -> usize {
        self.inner
            .state
            .lock()
            .buffers
            .get(session_key)
            .map_or(0, |b| b.events.len())
    }

    /// Returns the number of session keys with a buffer.
    #[must_use]
    pub fn buffered_sessions(&self) -> usize {
        self.inner.state.lock().buffers.len()
    }
}

// ============================================================================
// RouterInner
// ============================================================================

impl RouterInner {
    /// Appends to the orphan buffer for `key` and re-arms its expiry.
    fn buffer(self: &Arc<Self>, state: &mut RouterState, key: SessionKey, event: Event) {
        state.next_generation += 1;
        let generation = state.next_generation;

        let buffer = state
            .buffers
            .entry(key.clone())
            .or_insert_with(OrphanBuffer::new);

        if buffer.events.len() >= self.max_buffered {
            buffer.events.pop_front();
            warn!(session_key = %key, max = self.max_buffered, "Orphan buffer full, dropping oldest event");
        }
        buffer.events.push_back(event);
        buffer.generation = generation;
        buffer.cancel_expiry();
        buffer.expiry = self.spawn_expiry(key.clone(), generation);

        trace!(session_key = %key, buffered = buffer.events.len(), "Buffered event");
    }

    /// Spawns the grace timer for one buffer generation.
    fn spawn_expiry(self: &Arc<Self>, key: SessionKey, generation: u64) -> Option<JoinHandle<()>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(session_key = %key, "No runtime, orphan buffer will not expire");
            return None;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let grace = self.grace;

        Some(runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&key, generation);
            }
        }))
    }

    /// Drops the buffer for `key` if its timer is still current.
    fn expire(&self, key: &SessionKey, generation: u64) {
        let mut state = self.state.lock();
        let current = state
            .buffers
            .get(key)
            .is_some_and(|b| b.generation == generation);

        if current && let Some(buffer) = state.buffers.remove(key) {
            debug!(
                session_key = %key,
                dropped = buffer.events.len(),
                "Orphan buffer expired"
            );
        }
    }

    /// Removes one registration.
    pub(super) fn remove(&self, key: Option<&SessionKey>, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();

        let removed = match key {
            Some(key) => {
                let Some(listeners) = state.sessions.get_mut(key) else {
                    return false;
                };
                let before = listeners.len();
                listeners.retain(|(sid, _)| *sid != id);
                let removed = listeners.len() != before;
                if listeners.is_empty() {
                    state.sessions.remove(key);
                }
                removed
            }
            None => {
                let before = state.global.len();
                state.global.retain(|(sid, _)| *sid != id);
                state.global.len() != before
            }
        };

        if removed {
            debug!(session_key = ?key, %id, "Listener unregistered");
        }
        removed
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Calls one listener, containing any panic.
fn invoke(listener: &Listener, event: &Event) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic".to_string());
        warn!(event = %event.event, %reason, "Event listener panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
