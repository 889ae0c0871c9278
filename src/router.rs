//! Message router — fans each [`Envelope`] out to the listeners registered
//! for its type.
//!
//! # Listener identity
//!
//! A [`Listener`] is a cheap, cloneable handle around a callback. Clones share
//! one identity, so `on` with a clone of an already-registered listener is a
//! no-op and `off` with any clone removes it.
//!
//! # Isolation
//!
//! Every listener invocation is isolated: an `Err` return or a panic is
//! logged and counted, and the remaining listeners for the same message still
//! run. The registry lock is released before any listener is called, so
//! listeners may register or unregister listeners themselves.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::envelope::Envelope;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = Result<(), ListenerError>;

type Callback = dyn Fn(&Value) -> ListenerResult + Send + Sync;

// ── Listener ──────────────────────────────────────────────────────────────────

/// Stable identity of a [`Listener`] and all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{:x}", self.0)
    }
}

#[derive(Clone)]
pub struct Listener {
    callback: Arc<Callback>,
}

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) -> ListenerResult + Send + Sync + 'static,
    {
        Self { callback: Arc::new(callback) }
    }

    pub fn id(&self) -> ListenerId {
        ListenerId(Arc::as_ptr(&self.callback) as *const () as usize)
    }

    fn invoke(&self, data: &Value) -> ListenerResult {
        (self.callback)(data)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.id()).finish()
    }
}

// ── DispatchReport ────────────────────────────────────────────────────────────

/// Outcome of one [`Router::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked.
    pub failed: usize,
}

// ── Router ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Router {
    table: Mutex<HashMap<String, HashMap<ListenerId, Listener>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `kind`. Returns `false` if it was already
    /// registered there.
    pub fn on(&self, kind: &str, listener: &Listener) -> bool {
        let id = listener.id();
        let added = self
            .lock()
            .entry(kind.to_string())
            .or_default()
            .insert(id, listener.clone())
            .is_none();
        debug!(kind, %id, added, "listener registered");
        added
    }

    /// Remove `listener` from `kind`. Returns `false` if it was not there.
    pub fn off(&self, kind: &str, listener: &Listener) -> bool {
        let id = listener.id();
        let mut table = self.lock();
        let Some(set) = table.get_mut(kind) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            table.remove(kind);
        }
        debug!(kind, %id, removed, "listener removed");
        removed
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.lock().get(kind).map_or(0, HashMap::len)
    }

    /// Types that currently have at least one listener, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.lock().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Invoke every listener registered for `envelope.kind` with
    /// `envelope.data`. Unknown types are dropped silently.
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let listeners: Vec<Listener> = match self.lock().get(&envelope.kind) {
            Some(set) => set.values().cloned().collect(),
            None => {
                trace!(kind = %envelope.kind, "no listeners, message dropped");
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport::default();
        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(&envelope.data))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(kind = %envelope.kind, id = %listener.id(), "listener failed: {e}");
                }
                Err(payload) => {
                    report.failed += 1;
                    warn!(
                        kind = %envelope.kind,
                        id = %listener.id(),
                        "listener panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<ListenerId, Listener>>> {
        // Listeners never run under the lock, so a poisoned guard still holds
        // a consistent table.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Listener, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let listener = Listener::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (listener, hits)
    }

    #[test]
    fn on_then_dispatch_invokes_once_with_data() {
        let router = Router::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let listener = Listener::new(move |data| {
            s.lock().unwrap().push(data.clone());
            Ok(())
        });
        router.on("task_updated", &listener);

        let report = router.dispatch(&Envelope::new("task_updated", json!({"id": 1})));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
        assert_eq!(*seen.lock().unwrap(), vec![json!({"id": 1})]);
    }

    #[test]
    fn off_stops_delivery() {
        let router = Router::new();
        let (listener, hits) = counting();
        router.on("task_updated", &listener);
        assert!(router.off("task_updated", &listener));

        router.dispatch(&Envelope::new("task_updated", json!({"id": 1})));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(router.listener_count("task_updated"), 0);
        assert!(router.kinds().is_empty());
    }

    #[test]
    fn off_unknown_is_noop() {
        let router = Router::new();
        let (listener, _) = counting();
        assert!(!router.off("nothing", &listener));
        router.on("a", &listener);
        let (other, _) = counting();
        assert!(!router.off("a", &other));
        assert_eq!(router.listener_count("a"), 1);
    }

    #[test]
    fn duplicate_registration_is_idempotent() {
        let router = Router::new();
        let (listener, hits) = counting();
        assert!(router.on("ping", &listener));
        assert!(!router.on("ping", &listener.clone()));

        router.dispatch(&Envelope::new("ping", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_listener_under_two_types() {
        let router = Router::new();
        let (listener, hits) = counting();
        router.on("a", &listener);
        router.on("b", &listener);
        router.dispatch(&Envelope::new("a", Value::Null));
        router.dispatch(&Envelope::new("b", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(router.kinds(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unknown_type_is_dropped() {
        let router = Router::new();
        let (listener, hits) = counting();
        router.on("known", &listener);
        let report = router.dispatch(&Envelope::new("unknown_type", json!({})));
        assert_eq!(report, DispatchReport::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_listeners_do_not_block_others() {
        let router = Router::new();
        let (good, hits) = counting();
        let erroring = Listener::new(|_| Err("boom".into()));
        let panicking = Listener::new(|_| panic!("listener bug"));
        router.on("x", &erroring);
        router.on("x", &panicking);
        router.on("x", &good);

        let report = router.dispatch(&Envelope::new("x", Value::Null));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unregister_itself() {
        let router = Arc::new(Router::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));

        let r = router.clone();
        let h = hits.clone();
        let s = slot.clone();
        let listener = Listener::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = s.lock().unwrap().as_ref() {
                r.off("once", me);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(listener.clone());
        router.on("once", &listener);

        router.dispatch(&Envelope::new("once", Value::Null));
        router.dispatch(&Envelope::new("once", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_identity() {
        let (listener, _) = counting();
        let (other, _) = counting();
        assert_eq!(listener.id(), listener.clone().id());
        assert_ne!(listener.id(), other.id());
    }
}
