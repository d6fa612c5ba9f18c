//! Listener registration handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use crate::identifiers::{SessionKey, SubscriptionId};

use super::core::RouterInner;

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registered listener.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    router: Weak<RouterInner>,
    session_key: Option<SessionKey>,
    id: SubscriptionId,
}

impl Subscription {
    pub(super) fn new(
        router: Weak<RouterInner>,
        session_key: Option<SessionKey>,
        id: SubscriptionId,
    ) -> Self {
        Self {
            router,
            session_key,
            id,
        }
    }

    /// Returns the registration id.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the session key, or `None` for a global listener.
    #[inline]
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Removes the listener.
    ///
    /// Returns `false` if it was already gone (router cleared or dropped).
    pub fn unsubscribe(self) -> bool {
        self.router
            .upgrade()
            .is_some_and(|router| router.remove(self.session_key.as_ref(), self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("session_key", &self.session_key)
            .field("id", &self.id)
            .finish()
    }
}
