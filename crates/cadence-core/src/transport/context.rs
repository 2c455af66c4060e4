use super::{
    fake::FakeEvents,
    socket::{PubSocket, SubSocket},
};
use crate::error::{MessagingError, Result};
use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::debug;

/// Address publishers bind to.
pub const DEFAULT_ADDR: &str = "127.0.0.1";

/// Channel factory shared by every publisher and subscriber in a process.
///
/// Cloning is cheap and yields a handle to the same set of channels.
/// Channels live as long as any clone of the context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    channels: Mutex<HashMap<ChannelKey, Arc<Channel>>>,
    fake: FakeEvents,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChannelKey {
    addr: IpAddr,
    endpoint: String,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the publisher for `endpoint`. Only one publisher may exist
    /// per endpoint at a time.
    pub fn pub_socket(&self, endpoint: &str) -> Result<PubSocket> {
        let addr = parse_addr(DEFAULT_ADDR)?;
        let channel = self.channel(addr, endpoint);
        channel.claim_publisher()?;

        debug!(endpoint = %endpoint, "Created publisher socket");
        Ok(PubSocket::new(channel))
    }

    /// Create a subscriber for `endpoint` at `addr`.
    ///
    /// With `conflate` set, only the newest unread message is retained;
    /// older unread messages are silently dropped on publish.
    pub fn sub_socket(&self, endpoint: &str, addr: &str, conflate: bool) -> Result<SubSocket> {
        let addr = parse_addr(addr)?;
        let channel = self.channel(addr, endpoint);
        let reader = Arc::new(Reader::new(conflate));
        channel.attach(&reader);

        debug!(endpoint = %endpoint, addr = %addr, conflate, "Created subscriber socket");
        Ok(SubSocket::new(self.clone(), endpoint, reader))
    }

    pub(crate) fn fake(&self) -> &FakeEvents {
        &self.inner.fake
    }

    fn channel(&self, addr: IpAddr, endpoint: &str) -> Arc<Channel> {
        let key = ChannelKey {
            addr,
            endpoint: endpoint.to_string(),
        };
        lock(&self.inner.channels)
            .entry(key)
            .or_insert_with(|| Arc::new(Channel::new(endpoint)))
            .clone()
    }
}

fn parse_addr(addr: &str) -> Result<IpAddr> {
    addr.parse().map_err(|_| MessagingError::InvalidAddress {
        addr: addr.to_string(),
    })
}

/// Lock a mutex, ignoring poisoning. No critical section in the transport
/// can leave its data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One endpoint at one address.
#[derive(Debug)]
pub(crate) struct Channel {
    endpoint: String,
    has_publisher: AtomicBool,
    readers: Mutex<Vec<Weak<Reader>>>,
}

impl Channel {
    fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            has_publisher: AtomicBool::new(false),
            readers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn claim_publisher(&self) -> Result<()> {
        if self.has_publisher.swap(true, Ordering::AcqRel) {
            return Err(MessagingError::MultiplePublishers {
                endpoint: self.endpoint.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn release_publisher(&self) {
        self.has_publisher.store(false, Ordering::Release);
    }

    fn attach(&self, reader: &Arc<Reader>) {
        let mut readers = lock(&self.readers);
        readers.retain(|reader| reader.strong_count() > 0);
        readers.push(Arc::downgrade(reader));
    }

    /// Copy `dat` into every live reader queue. Returns the number of
    /// readers reached.
    pub(crate) fn publish(&self, dat: &[u8]) -> usize {
        let mut readers = lock(&self.readers);
        readers.retain(|reader| reader.strong_count() > 0);

        readers
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|reader| reader.deliver(dat))
            .count()
    }

    /// True when at least one reader is attached and every reader has
    /// consumed everything published so far.
    pub(crate) fn all_readers_updated(&self) -> bool {
        let readers = lock(&self.readers);
        let mut any = false;
        for reader in readers.iter().filter_map(Weak::upgrade) {
            any = true;
            if !reader.rx.is_empty() {
                return false;
            }
        }
        any
    }
}

/// The per-subscriber queue.
#[derive(Debug)]
pub(crate) struct Reader {
    conflate: bool,
    tx: flume::Sender<Vec<u8>>,
    pub(crate) rx: flume::Receiver<Vec<u8>>,
    wakers: Mutex<Vec<flume::Sender<()>>>,
}

impl Reader {
    fn new(conflate: bool) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            conflate,
            tx,
            rx,
            wakers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_waker(&self, waker: flume::Sender<()>) {
        lock(&self.wakers).push(waker);
    }

    fn deliver(&self, dat: &[u8]) -> bool {
        if self.conflate {
            while self.rx.try_recv().is_ok() {}
        }
        if self.tx.send(dat.to_vec()).is_err() {
            return false;
        }

        // A full waker means a wakeup is already pending.
        lock(&self.wakers).retain(|waker| {
            !matches!(waker.try_send(()), Err(flume::TrySendError::Disconnected(_)))
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_publisher_is_rejected() {
        let ctx = Context::new();
        let first = ctx.pub_socket("carState").unwrap();

        let err = ctx.pub_socket("carState").unwrap_err();
        assert!(matches!(err, MessagingError::MultiplePublishers { ref endpoint } if endpoint == "carState"));

        drop(first);
        assert!(ctx.pub_socket("carState").is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let ctx = Context::new();
        assert!(matches!(
            ctx.sub_socket("carState", "not an address", false),
            Err(MessagingError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_publish_reaches_every_reader() {
        let ctx = Context::new();
        let publisher = ctx.pub_socket("modelV2").unwrap();
        let a = ctx.sub_socket("modelV2", DEFAULT_ADDR, false).unwrap();
        let b = ctx.sub_socket("modelV2", DEFAULT_ADDR, false).unwrap();

        publisher.send(b"hello").unwrap();
        assert_eq!(a.receive(true).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(b.receive(true).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(a.receive(true).unwrap(), None);
    }

    #[test]
    fn test_other_address_is_a_separate_channel() {
        let ctx = Context::new();
        let publisher = ctx.pub_socket("modelV2").unwrap();
        let remote = ctx.sub_socket("modelV2", "10.0.0.2", false).unwrap();

        publisher.send(b"x").unwrap();
        assert_eq!(remote.receive(true).unwrap(), None);
    }

    #[test]
    fn test_conflate_keeps_newest() {
        let ctx = Context::new();
        let publisher = ctx.pub_socket("carState").unwrap();
        let sub = ctx.sub_socket("carState", DEFAULT_ADDR, true).unwrap();

        for i in 0u8..5 {
            publisher.send(&[i]).unwrap();
        }
        assert_eq!(sub.receive(true).unwrap(), Some(vec![4]));
        assert_eq!(sub.receive(true).unwrap(), None);
    }

    #[test]
    fn test_dropped_readers_pruned_without_publisher() {
        let ctx = Context::new();
        for _ in 0..10 {
            drop(ctx.sub_socket("radarState", DEFAULT_ADDR, false).unwrap());
        }
        let _live = ctx.sub_socket("radarState", DEFAULT_ADDR, false).unwrap();

        let channel = ctx.channel(parse_addr(DEFAULT_ADDR).unwrap(), "radarState");
        assert_eq!(lock(&channel.readers).len(), 1);
    }

    #[test]
    fn test_all_readers_updated() {
        let ctx = Context::new();
        let publisher = ctx.pub_socket("carState").unwrap();

        // Nobody listening yet.
        assert!(!publisher.all_readers_updated());

        let sub = ctx.sub_socket("carState", DEFAULT_ADDR, false).unwrap();
        assert!(publisher.all_readers_updated());

        publisher.send(b"a").unwrap();
        assert!(!publisher.all_readers_updated());

        sub.receive(true).unwrap();
        assert!(publisher.all_readers_updated());

        drop(sub);
        assert!(!publisher.all_readers_updated());
    }
}
