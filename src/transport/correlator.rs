//! Pending-call bookkeeping for request/response correlation.
//!
//! The correlator owns one response channel per outstanding request id.
//! An entry leaves the map exactly once: when its response arrives, when
//! its caller times out, or when the socket drops.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::Response;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
pub const MAX_PENDING_REQUESTS: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

// ============================================================================
// Correlator
// ============================================================================

/// Shared pending-call map.
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct Correlator {
    pending: Arc<Mutex<CorrelationMap>>,
}

impl Correlator {
    /// Creates an empty correlator.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending call and returns its response channel.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if `id` is already pending
    /// - [`Error::Protocol`] if too many calls are pending
    pub fn register(&self, id: RequestId) -> Result<oneshot::Receiver<Result<Response>>> {
        let mut pending = self.pending.lock();

        if pending.len() >= MAX_PENDING_REQUESTS {
            warn!(
                pending = pending.len(),
                max = MAX_PENDING_REQUESTS,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                pending.len(),
                MAX_PENDING_REQUESTS
            )));
        }

        if pending.contains_key(&id) {
            return Err(Error::protocol(format!("Duplicate request id: {id}")));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(rx)
    }

    /// Completes the pending call matching `response.id`.
    ///
    /// Returns `false` if no call with that id is pending.
    pub fn resolve(&self, response: Response) -> bool {
        let tx = self.pending.lock().remove(&response.id);

        match tx {
            Some(tx) => {
                let _ = tx.send(Ok(response));
                true
            }
            None => {
                warn!(id = %response.id, "Response for unknown request");
                false
            }
        }
    }

    /// Fails one pending call with `error`.
    ///
    /// Returns `false` if no call with that id is pending.
    pub fn reject(&self, id: &RequestId, error: Error) -> bool {
        match self.pending.lock().remove(id) {
            Some(tx) => {
                let _ = tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drops a pending call without notifying its caller.
    pub fn remove(&self, id: &RequestId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Fails every pending call with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of calls failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();

        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on disconnect");
        }
        count
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if no calls are pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_PENDING_REQUESTS, 1024);
    }

    #[tokio::test]
    async fn test_resolve_matches_by_id() {
        let correlator = Correlator::new();
        let a = RequestId::generate();
        let b = RequestId::generate();
        let rx_a = correlator.register(a).expect("register a");
        let rx_b = correlator.register(b).expect("register b");

        // Answer out of order.
        assert!(correlator.resolve(Response::success(b, json!("for b"))));
        assert!(correlator.resolve(Response::success(a, json!("for a"))));

        let got_a = rx_a.await.expect("a").expect("ok a");
        let got_b = rx_b.await.expect("b").expect("ok b");
        assert_eq!(got_a.payload, Some(json!("for a")));
        assert_eq!(got_b.payload, Some(json!("for b")));
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_resolve_unknown_id() {
        let correlator = Correlator::new();
        let response = Response::success(RequestId::generate(), json!(null));
        assert!(!correlator.resolve(response));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let correlator = Correlator::new();
        let id = RequestId::generate();
        let _rx = correlator.register(id).expect("first");

        assert!(correlator.register(id).is_err());
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_pending_limit() {
        let correlator = Correlator::new();
        let receivers: Vec<_> = (0..MAX_PENDING_REQUESTS)
            .map(|_| correlator.register(RequestId::generate()).expect("register"))
            .collect();

        assert_eq!(receivers.len(), MAX_PENDING_REQUESTS);
        assert!(correlator.register(RequestId::generate()).is_err());
    }

    #[tokio::test]
    async fn test_fail_all_rejects_everything() {
        let correlator = Correlator::new();
        let receivers: Vec<_> = (0..3)
            .map(|_| correlator.register(RequestId::generate()).expect("register"))
            .collect();

        assert_eq!(correlator.fail_all(), 3);
        assert!(correlator.is_empty());

        for rx in receivers {
            let result = rx.await.expect("sender used");
            assert!(matches!(result, Err(Error::ConnectionClosed)));
        }
    }

    #[tokio::test]
    async fn test_reject_single_call() {
        let correlator = Correlator::new();
        let id = RequestId::generate();
        let other = RequestId::generate();
        let rx = correlator.register(id).expect("register");
        let _other_rx = correlator.register(other).expect("register");

        assert!(correlator.reject(&id, Error::connection("send failed")));
        assert!(matches!(rx.await.expect("sent"), Err(Error::Connection { .. })));
        assert!(correlator.contains(&other));
    }

    #[test]
    fn test_remove() {
        let correlator = Correlator::new();
        let id = RequestId::generate();
        let _rx = correlator.register(id).expect("register");

        assert!(correlator.remove(&id));
        assert!(!correlator.remove(&id));
        assert!(!correlator.contains(&id));
    }
}
