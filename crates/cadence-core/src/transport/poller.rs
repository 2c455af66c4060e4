use super::socket::SubSocket;
use std::time::{Duration, Instant};

/// Waits on several subscribers at once.
#[derive(Debug)]
pub struct Poller {
    sockets: Vec<SubSocket>,
    wake_tx: flume::Sender<()>,
    wake_rx: flume::Receiver<()>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    pub fn new() -> Self {
        // One pending token is enough to wake a waiting poll.
        let (wake_tx, wake_rx) = flume::bounded(1);
        Self {
            sockets: Vec::new(),
            wake_tx,
            wake_rx,
        }
    }

    pub fn register(&mut self, sock: &SubSocket) {
        sock.reader().add_waker(self.wake_tx.clone());
        self.sockets.push(sock.clone());
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Wait up to `timeout` for any registered socket to have unread
    /// messages, then return every socket that does, in registration
    /// order. Returns an empty list on timeout.
    pub fn poll(&self, timeout: Duration) -> Vec<SubSocket> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            while self.wake_rx.try_recv().is_ok() {}

            let ready = self.ready();
            if !ready.is_empty() {
                return ready;
            }

            let woke = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return ready;
                    }
                    self.wake_rx.recv_timeout(remaining).is_ok()
                }
                None => self.wake_rx.recv().is_ok(),
            };

            if !woke {
                return self.ready();
            }
        }
    }

    fn ready(&self) -> Vec<SubSocket> {
        self.sockets
            .iter()
            .filter(|sock| sock.pending() > 0)
            .cloned()
            .collect()
    }
}
