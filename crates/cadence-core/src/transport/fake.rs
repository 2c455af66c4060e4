//! Deterministic delivery gating for tests.
//!
//! With fake events enabled on a [Context], a subscriber whose endpoint
//! has an enabled [SocketEventHandle] under the current prefix announces
//! every receive on `recv_called` and then blocks until the test sets
//! `recv_ready`. This lets a harness step a consumer one receive at a
//! time without relying on real timing.

use super::context::{Context, lock};
use std::{
    collections::HashMap,
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::trace;

#[derive(Debug, Default)]
pub(crate) struct FakeEvents {
    enabled: AtomicBool,
    prefix: Mutex<Option<String>>,
    /// Keyed by (identifier, endpoint).
    handles: Mutex<HashMap<(String, String), Arc<HandleState>>>,
}

#[derive(Debug, Default)]
struct HandleState {
    enabled: AtomicBool,
    recv_called: Signal,
    recv_ready: Signal,
}

/// A manually-reset boolean flag that threads can wait on.
#[derive(Debug, Default)]
pub struct Signal {
    set: Mutex<bool>,
    cond: Condvar,
    /// Wake channels of [wait_for_one_event] callers.
    watchers: Mutex<Vec<flume::Sender<()>>>,
}

impl Signal {
    pub fn set(&self) {
        *lock(&self.set) = true;
        self.cond.notify_all();

        // A full watcher already has a wakeup pending.
        lock(&self.watchers).retain(|watcher| {
            !matches!(watcher.try_send(()), Err(flume::TrySendError::Disconnected(_)))
        });
    }

    pub fn clear(&self) {
        *lock(&self.set) = false;
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.set)
    }

    /// Block until set or until `timeout` elapses. Returns whether the
    /// signal is set.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = lock(&self.set);
        match timeout {
            Some(timeout) => {
                let (guard, _) = self
                    .cond
                    .wait_timeout_while(guard, timeout, |set| !*set)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
            None => *self
                .cond
                .wait_while(guard, |set| !*set)
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Test-side handle gating receives on one endpoint.
#[derive(Debug, Clone)]
pub struct SocketEventHandle {
    endpoint: String,
    identifier: String,
    state: Arc<HandleState>,
}

impl SocketEventHandle {
    /// Bind a handle to `endpoint` under `identifier` (the context's
    /// current fake prefix when `None`).
    ///
    /// With `replace` set the handle takes over the binding with fresh
    /// signals; otherwise it shares any handle already bound.
    pub fn new(ctx: &Context, endpoint: &str, identifier: Option<&str>, replace: bool) -> Self {
        let identifier = identifier
            .map(str::to_string)
            .or_else(|| ctx.fake_prefix())
            .unwrap_or_default();
        let key = (identifier.clone(), endpoint.to_string());

        let mut handles = lock(&ctx.fake().handles);
        let state = if replace {
            let state = Arc::new(HandleState::default());
            handles.insert(key, state.clone());
            state
        } else {
            handles.entry(key).or_default().clone()
        };

        Self {
            endpoint: endpoint.to_string(),
            identifier,
            state,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Release);
    }

    /// Set by the subscriber each time it enters a gated receive.
    pub fn recv_called(&self) -> &Signal {
        &self.state.recv_called
    }

    /// Set by the test to release one gated receive.
    pub fn recv_ready(&self) -> &Signal {
        &self.state.recv_ready
    }
}

/// Convenience constructor: when `replace` is set, the new handle's
/// enabled state is forced to `enable`.
pub fn fake_event_handle(
    ctx: &Context,
    endpoint: &str,
    identifier: Option<&str>,
    replace: bool,
    enable: bool,
) -> SocketEventHandle {
    let handle = SocketEventHandle::new(ctx, endpoint, identifier, replace);
    if replace {
        handle.set_enabled(enable);
    }
    handle
}

/// Wait until any of `signals` is set. Returns the index of the first set
/// signal, or `None` on timeout.
pub fn wait_for_one_event(signals: &[&Signal], timeout: Option<Duration>) -> Option<usize> {
    let (wake_tx, wake_rx) = flume::bounded(1);
    for signal in signals {
        let mut watchers = lock(&signal.watchers);
        watchers.retain(|watcher| !watcher.is_disconnected());
        watchers.push(wake_tx.clone());
    }
    drop(wake_tx);

    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    loop {
        if let Some(index) = signals.iter().position(|signal| signal.is_set()) {
            return Some(index);
        }

        let woke = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                wake_rx.recv_timeout(remaining).is_ok()
            }
            None => wake_rx.recv().is_ok(),
        };

        if !woke {
            return signals.iter().position(|signal| signal.is_set());
        }
    }
}

impl Context {
    pub fn toggle_fake_events(&self, enabled: bool) {
        self.fake().enabled.store(enabled, Ordering::Release);
    }

    pub fn fake_events_enabled(&self) -> bool {
        self.fake().enabled.load(Ordering::Acquire)
    }

    pub fn set_fake_prefix(&self, prefix: impl Into<String>) {
        *lock(&self.fake().prefix) = Some(prefix.into());
    }

    pub fn fake_prefix(&self) -> Option<String> {
        lock(&self.fake().prefix).clone()
    }

    pub fn delete_fake_prefix(&self) {
        *lock(&self.fake().prefix) = None;
    }

    /// Block a receive on `endpoint` until the test releases it.
    pub(crate) fn gate_receive(&self, endpoint: &str) {
        if !self.fake_events_enabled() {
            return;
        }

        let key = (self.fake_prefix().unwrap_or_default(), endpoint.to_string());
        let Some(state) = lock(&self.fake().handles).get(&key).cloned() else {
            return;
        };
        if !state.enabled.load(Ordering::Acquire) {
            return;
        }

        trace!(endpoint = %endpoint, "Gated receive waiting for release");
        state.recv_called.set();
        state.recv_ready.wait(None);
        state.recv_ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DEFAULT_ADDR;
    use std::{thread, time::Instant};

    #[test]
    fn test_prefix_lifecycle() {
        let ctx = Context::new();
        assert_eq!(ctx.fake_prefix(), None);
        ctx.set_fake_prefix("test_a");
        assert_eq!(ctx.fake_prefix().as_deref(), Some("test_a"));
        ctx.delete_fake_prefix();
        assert_eq!(ctx.fake_prefix(), None);
    }

    #[test]
    fn test_handle_defaults_to_prefix() {
        let ctx = Context::new();
        ctx.set_fake_prefix("sim");
        let handle = fake_event_handle(&ctx, "carState", None, true, true);
        assert_eq!(handle.identifier(), "sim");
        assert!(handle.enabled());
    }

    #[test]
    fn test_shared_handle_sees_same_signals() {
        let ctx = Context::new();
        let owner = fake_event_handle(&ctx, "carState", Some("x"), true, false);
        let observer = SocketEventHandle::new(&ctx, "carState", Some("x"), false);

        owner.recv_ready().set();
        assert!(observer.recv_ready().is_set());
        observer.set_enabled(true);
        assert!(owner.enabled());
    }

    #[test]
    fn test_signal_wait_timeout() {
        let signal = Signal::default();
        assert!(!signal.wait(Some(Duration::from_millis(5))));
        signal.set();
        assert!(signal.wait(Some(Duration::from_millis(5))));
        signal.clear();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_wait_for_one_event_wakes_on_set() {
        let signals = Arc::new([Signal::default(), Signal::default()]);
        assert_eq!(
            wait_for_one_event(&[&signals[0], &signals[1]], Some(Duration::from_millis(5))),
            None
        );

        let setter = {
            let signals = signals.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signals[1].set();
            })
        };

        let start = Instant::now();
        let fired = wait_for_one_event(&[&signals[0], &signals[1]], None);
        assert_eq!(fired, Some(1));
        assert!(start.elapsed() < Duration::from_secs(1));
        setter.join().unwrap();

        // The finished wait left no live watchers behind.
        signals[1].set();
        assert!(lock(&signals[1].watchers).is_empty());
    }

    #[test]
    fn test_gated_receive_waits_for_release() {
        let ctx = Context::new();
        ctx.set_fake_prefix("gate");
        let handle = fake_event_handle(&ctx, "modelV2", None, true, true);
        ctx.toggle_fake_events(true);

        let publisher = ctx.pub_socket("modelV2").unwrap();
        let sub = ctx.sub_socket("modelV2", DEFAULT_ADDR, false).unwrap();
        publisher.send(b"m").unwrap();

        let receiver = thread::spawn(move || sub.receive(true).unwrap());

        let fired = wait_for_one_event(&[handle.recv_called()], Some(Duration::from_secs(5)));
        assert_eq!(fired, Some(0));
        assert!(!receiver.is_finished());

        handle.recv_ready().set();
        assert_eq!(receiver.join().unwrap(), Some(b"m".to_vec()));
        assert!(!handle.recv_ready().is_set());
    }

    #[test]
    fn test_disabled_fake_events_do_not_gate() {
        let ctx = Context::new();
        let _handle = fake_event_handle(&ctx, "modelV2", None, true, true);

        let sub = ctx.sub_socket("modelV2", DEFAULT_ADDR, false).unwrap();
        assert_eq!(sub.receive(true).unwrap(), None);
    }
}
