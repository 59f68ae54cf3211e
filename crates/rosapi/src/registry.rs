use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

use rosapi_proto::Sentence;

/// What the dispatcher should do with an exchange after one sentence.
#[derive(Debug)]
pub(crate) enum Flow {
    /// Keep routing sentences to this exchange.
    Continue,
    /// Exchange finished; unregister and close it with the given error.
    Finish(Option<Error>),
}

/// One outstanding exchange registered under a tag.
///
/// Implemented by exactly the two exchange kinds: one-shot requests and
/// listen streams. `close` is the explicit completion capability; it is
/// called exactly once, with the error that ended the exchange, or with
/// `None` for a clean finish or a deliberate local close.
pub(crate) trait Exchange: Send {
    fn process_sentence(&mut self, sentence: Sentence) -> Flow;
    fn close(&mut self, err: Option<Error>);
}

/// Tag table shared between caller threads and the dispatch loop.
///
/// Owned by the connection and handed to the dispatch thread through
/// shared ownership; there is no global state. The table plus the
/// concurrent-mode flag are one state value behind one mutex.
pub(crate) struct Registry {
    state: Mutex<State>,
}

enum State {
    /// Concurrent mode never enabled; the caller owns the read side.
    Sync,
    /// Dispatch loop running; sentences are routed through this table.
    Open(HashMap<String, Box<dyn Exchange>>),
    /// Dispatch loop ended; registration fails instead of hanging.
    Closed,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::Sync),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether concurrent mode has ever been enabled. Stays true after
    /// teardown so late requests fail fast instead of stealing the read
    /// side back.
    pub(crate) fn is_async(&self) -> bool {
        !matches!(*self.lock(), State::Sync)
    }

    /// Enable concurrent mode. Only the first caller succeeds.
    pub(crate) fn start(&self) -> Result<()> {
        let mut state = self.lock();
        match *state {
            State::Sync => {
                *state = State::Open(HashMap::new());
                Ok(())
            }
            State::Open(_) | State::Closed => Err(Error::AlreadyAsync),
        }
    }

    /// Atomically transmit a tagged sentence and register its exchange.
    ///
    /// The state lock is held across `send` so the dispatcher, which takes
    /// the same lock to look up a tag, can never route a reply into the
    /// gap between transmit and insert.
    pub(crate) fn send_and_register<F>(
        &self,
        tag: &str,
        exchange: Box<dyn Exchange>,
        send: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut state = self.lock();
        let State::Open(table) = &mut *state else {
            return Err(Error::AsyncLoopEnded);
        };
        send()?;
        table.insert(tag.to_string(), exchange);
        Ok(())
    }

    /// Take the exchange for `tag` out of the table, or `None` for unknown
    /// tags (replies to finished or cancelled exchanges may still arrive).
    ///
    /// The dispatcher removes before feeding so it never blocks on a full
    /// stream queue while holding the table lock; a surviving exchange is
    /// put back with [`Registry::reinsert`]. Tags are never reused, so no
    /// other registration can collide while the entry is out.
    pub(crate) fn remove(&self, tag: &str) -> Option<Box<dyn Exchange>> {
        match &mut *self.lock() {
            State::Open(table) => table.remove(tag),
            State::Sync | State::Closed => None,
        }
    }

    /// Put a still-collecting exchange back after dispatch.
    pub(crate) fn reinsert(&self, tag: String, exchange: Box<dyn Exchange>) {
        if let State::Open(table) = &mut *self.lock() {
            table.insert(tag, exchange);
        }
    }

    /// End routing: mark the registry closed and drain every outstanding
    /// exchange for the caller to close.
    pub(crate) fn close_all(&self) -> Vec<Box<dyn Exchange>> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, State::Closed) {
            State::Open(table) => table.into_values().collect(),
            State::Sync | State::Closed => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;

    impl Exchange for Inert {
        fn process_sentence(&mut self, _sentence: Sentence) -> Flow {
            Flow::Continue
        }

        fn close(&mut self, _err: Option<Error>) {}
    }

    fn recorder() -> Box<dyn Exchange> {
        Box::new(Inert)
    }

    #[test]
    fn start_succeeds_once() {
        let registry = Registry::new();
        assert!(!registry.is_async());
        registry.start().unwrap();
        assert!(registry.is_async());
        assert!(matches!(registry.start(), Err(Error::AlreadyAsync)));
    }

    #[test]
    fn register_fails_before_start_and_after_close() {
        let registry = Registry::new();
        let err = registry
            .send_and_register("r1", recorder(), || Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::AsyncLoopEnded));

        registry.start().unwrap();
        registry
            .send_and_register("r1", recorder(), || Ok(()))
            .unwrap();

        let drained = registry.close_all();
        assert_eq!(drained.len(), 1);

        let err = registry
            .send_and_register("r2", recorder(), || Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::AsyncLoopEnded));
        assert!(registry.is_async());
    }

    #[test]
    fn failed_send_does_not_register() {
        let registry = Registry::new();
        registry.start().unwrap();
        let err = registry
            .send_and_register("r1", recorder(), || {
                Err(Error::Proto(rosapi_proto::ProtoError::ConnectionClosed))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Proto(_)));
        assert!(registry.remove("r1").is_none());
    }

    #[test]
    fn remove_and_reinsert() {
        let registry = Registry::new();
        registry.start().unwrap();
        registry
            .send_and_register("l1", recorder(), || Ok(()))
            .unwrap();

        let exchange = registry.remove("l1").expect("registered tag");
        assert!(registry.remove("l1").is_none());
        registry.reinsert("l1".to_string(), exchange);
        assert!(registry.remove("l1").is_some());
        assert!(registry.remove("unknown").is_none());
    }
}
