use super::context::{Channel, Context, Reader};
use crate::error::{MessagingError, Result};
use flume::{RecvTimeoutError, TryRecvError};
use std::{sync::Arc, time::Duration};

/// Receiving end of a channel.
///
/// Clones share the same queue, so a message is consumed by whichever
/// clone receives it first.
#[derive(Debug, Clone)]
pub struct SubSocket {
    ctx: Context,
    endpoint: Arc<str>,
    reader: Arc<Reader>,
    timeout: Option<Duration>,
}

impl SubSocket {
    pub(crate) fn new(ctx: Context, endpoint: &str, reader: Arc<Reader>) -> Self {
        Self {
            ctx,
            endpoint: endpoint.into(),
            reader,
            timeout: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bound blocking receives. `None` blocks until a message arrives.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of unread messages.
    pub fn pending(&self) -> usize {
        self.reader.rx.len()
    }

    pub(crate) fn reader(&self) -> &Arc<Reader> {
        &self.reader
    }

    /// Take the next message.
    ///
    /// Returns `Ok(None)` when nothing is queued (non-blocking) or the
    /// receive timeout expired (blocking).
    pub fn receive(&self, non_blocking: bool) -> Result<Option<Vec<u8>>> {
        self.ctx.gate_receive(&self.endpoint);
        let rx = &self.reader.rx;

        if non_blocking {
            return match rx.try_recv() {
                Ok(dat) => Ok(Some(dat)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(self.disconnected()),
            };
        }

        match self.timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(dat) => Ok(Some(dat)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(self.disconnected()),
            },
            None => rx.recv().map(Some).map_err(|_| self.disconnected()),
        }
    }

    fn disconnected(&self) -> MessagingError {
        MessagingError::Disconnected {
            endpoint: self.endpoint.to_string(),
        }
    }
}

/// Sending end of a channel. Dropping it frees the endpoint for another
/// publisher.
#[derive(Debug)]
pub struct PubSocket {
    channel: Arc<Channel>,
}

impl PubSocket {
    pub(crate) fn new(channel: Arc<Channel>) -> Self {
        Self { channel }
    }

    pub fn endpoint(&self) -> &str {
        self.channel.endpoint()
    }

    /// Deliver `dat` to every current reader. There is no delivery
    /// acknowledgment.
    pub fn send(&self, dat: &[u8]) -> Result<()> {
        self.channel.publish(dat);
        Ok(())
    }

    /// Whether every current reader has consumed the last publish.
    /// False when there are no readers.
    pub fn all_readers_updated(&self) -> bool {
        self.channel.all_readers_updated()
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.channel.release_publisher();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DEFAULT_ADDR;
    use std::{thread, time::Instant};

    #[test]
    fn test_blocking_receive_times_out() {
        let ctx = Context::new();
        let mut sub = ctx.sub_socket("deviceState", DEFAULT_ADDR, false).unwrap();
        sub.set_timeout(Some(Duration::from_millis(20)));

        let start = Instant::now();
        assert_eq!(sub.receive(false).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_blocking_receive_wakes_on_publish() {
        let ctx = Context::new();
        let publisher = ctx.pub_socket("deviceState").unwrap();
        let sub = ctx.sub_socket("deviceState", DEFAULT_ADDR, false).unwrap();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.send(b"late").unwrap();
        });

        assert_eq!(sub.receive(false).unwrap(), Some(b"late".to_vec()));
        handle.join().unwrap();
    }

    #[test]
    fn test_pending_counts_unread() {
        let ctx = Context::new();
        let publisher = ctx.pub_socket("sendcan").unwrap();
        let sub = ctx.sub_socket("sendcan", DEFAULT_ADDR, false).unwrap();

        publisher.send(b"1").unwrap();
        publisher.send(b"2").unwrap();
        assert_eq!(sub.pending(), 2);
        sub.receive(true).unwrap();
        assert_eq!(sub.pending(), 1);
        assert_eq!(publisher.endpoint(), "sendcan");
        assert_eq!(sub.endpoint(), "sendcan");
    }
}
