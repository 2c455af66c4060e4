//! Message retrieval policies built on [SubSocket::receive].

use crate::{
    envelope::{Event, log_from_bytes},
    error::Result,
    transport::{Context, Poller, PubSocket, SubSocket},
};
use std::time::Duration;
use tracing::debug;

/// Options for [sub_sock].
#[derive(Debug, Default)]
pub struct SubOptions<'a> {
    /// Register the new socket with this poller.
    pub poller: Option<&'a mut Poller>,
    /// Address to connect to; `None` means [DEFAULT_ADDR](crate::transport::DEFAULT_ADDR).
    pub addr: Option<&'a str>,
    pub conflate: bool,
    /// Receive timeout for blocking receives.
    pub timeout: Option<Duration>,
}

pub fn pub_sock(ctx: &Context, endpoint: &str) -> Result<PubSocket> {
    ctx.pub_socket(endpoint)
}

pub fn sub_sock(ctx: &Context, endpoint: &str, options: SubOptions<'_>) -> Result<SubSocket> {
    let SubOptions {
        poller,
        addr,
        conflate,
        timeout,
    } = options;

    let addr = addr.unwrap_or(crate::transport::DEFAULT_ADDR);
    let mut sock = ctx.sub_socket(endpoint, addr, conflate)?;
    sock.set_timeout(timeout);

    if let Some(poller) = poller {
        poller.register(&sock);
    }
    Ok(sock)
}

/// Receive every message currently queued, undecoded.
///
/// With `wait_for_one`, the first receive blocks (subject to the socket
/// timeout); the rest never do.
pub fn drain_sock_raw(sock: &SubSocket, wait_for_one: bool) -> Result<Vec<Vec<u8>>> {
    let mut ret = Vec::new();
    loop {
        let non_blocking = !(wait_for_one && ret.is_empty());
        let Some(dat) = sock.receive(non_blocking)? else {
            break;
        };
        ret.push(dat);
    }
    Ok(ret)
}

/// Receive and decode every message currently queued, in arrival order.
pub fn drain_sock(sock: &SubSocket, wait_for_one: bool) -> Result<Vec<Event>> {
    drain_sock_raw(sock, wait_for_one)?
        .iter()
        .map(|dat| log_from_bytes(dat))
        .collect()
}

/// Receive everything queued and decode only the newest message.
pub fn recv_sock(sock: &SubSocket, wait: bool) -> Result<Option<Event>> {
    let mut latest = None;
    let mut dropped = 0usize;

    loop {
        let non_blocking = !(wait && latest.is_none());
        let Some(dat) = sock.receive(non_blocking)? else {
            break;
        };
        if latest.replace(dat).is_some() {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!(endpoint = %sock.endpoint(), dropped, "Dropped older messages");
    }

    latest.map(|dat| log_from_bytes(&dat)).transpose()
}

/// Blocking receive of a single message, bounded by the socket timeout.
pub fn recv_one(sock: &SubSocket) -> Result<Option<Event>> {
    sock.receive(false)?
        .map(|dat| log_from_bytes(&dat))
        .transpose()
}

pub fn recv_one_or_none(sock: &SubSocket) -> Result<Option<Event>> {
    sock.receive(true)?
        .map(|dat| log_from_bytes(&dat))
        .transpose()
}

/// Keep receiving until a message arrives. Blocks forever if nothing is
/// ever published.
pub fn recv_one_retry(sock: &SubSocket) -> Result<Event> {
    loop {
        if let Some(dat) = sock.receive(false)? {
            return log_from_bytes(&dat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{envelope::new_message, services::Service};
    use std::{thread, time::Instant};

    fn queue_five(ctx: &Context) -> (PubSocket, SubSocket, Vec<Event>) {
        let publisher = pub_sock(ctx, "carState").unwrap();
        let sub = sub_sock(ctx, "carState", SubOptions::default()).unwrap();

        let sent: Vec<Event> = (1..=5u64)
            .map(|i| {
                new_message(Service::CarState, None)
                    .unwrap()
                    .with_log_mono_time(i)
            })
            .collect();
        for msg in &sent {
            publisher.send(&msg.to_bytes().unwrap()).unwrap();
        }
        (publisher, sub, sent)
    }

    #[test]
    fn test_recv_sock_keeps_only_latest() {
        let ctx = Context::new();
        let (_publisher, sub, sent) = queue_five(&ctx);

        let latest = recv_sock(&sub, false).unwrap().unwrap();
        assert_eq!(latest, sent[4]);
        assert_eq!(sub.pending(), 0);
        assert!(recv_sock(&sub, false).unwrap().is_none());
    }

    #[test]
    fn test_drain_sock_returns_all_in_order() {
        let ctx = Context::new();
        let (_publisher, sub, sent) = queue_five(&ctx);

        let drained = drain_sock(&sub, false).unwrap();
        assert_eq!(drained, sent);
        assert!(drain_sock(&sub, false).unwrap().is_empty());
    }

    #[test]
    fn test_drain_sock_raw_matches_sent_bytes() {
        let ctx = Context::new();
        let (_publisher, sub, sent) = queue_five(&ctx);

        let raw = drain_sock_raw(&sub, false).unwrap();
        let expected: Vec<Vec<u8>> = sent.iter().map(|m| m.to_bytes().unwrap()).collect();
        assert_eq!(raw, expected);
    }

    #[test]
    fn test_wait_for_one_blocks_until_first_message() {
        let ctx = Context::new();
        let publisher = pub_sock(&ctx, "deviceState").unwrap();
        let sub = sub_sock(&ctx, "deviceState", SubOptions::default()).unwrap();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let msg = new_message(Service::DeviceState, None).unwrap();
            publisher.send(&msg.to_bytes().unwrap()).unwrap();
        });

        let msgs = drain_sock(&sub, true).unwrap();
        assert_eq!(msgs.len(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_recv_one_respects_timeout() {
        let ctx = Context::new();
        let sub = sub_sock(
            &ctx,
            "gpsLocation",
            SubOptions {
                timeout: Some(Duration::from_millis(10)),
                ..SubOptions::default()
            },
        )
        .unwrap();

        let start = Instant::now();
        assert!(recv_one(&sub).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(recv_one_or_none(&sub).unwrap().is_none());
    }

    #[test]
    fn test_recv_one_retry_outlasts_timeouts() {
        let ctx = Context::new();
        let publisher = pub_sock(&ctx, "liveCalibration").unwrap();
        let sub = sub_sock(
            &ctx,
            "liveCalibration",
            SubOptions {
                timeout: Some(Duration::from_millis(5)),
                ..SubOptions::default()
            },
        )
        .unwrap();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let msg = new_message(Service::LiveCalibration, None)
                .unwrap()
                .with_valid(true);
            publisher.send(&msg.to_bytes().unwrap()).unwrap();
        });

        let msg = recv_one_retry(&sub).unwrap();
        assert!(msg.valid);
        assert_eq!(msg.which(), Service::LiveCalibration);
        handle.join().unwrap();
    }

    #[test]
    fn test_sub_sock_registers_with_poller() {
        let ctx = Context::new();
        let mut poller = Poller::new();
        let _sub = sub_sock(
            &ctx,
            "radarState",
            SubOptions {
                poller: Some(&mut poller),
                conflate: true,
                ..SubOptions::default()
            },
        )
        .unwrap();
        assert_eq!(poller.len(), 1);
    }

    #[test]
    fn test_decode_failure_propagates() {
        let ctx = Context::new();
        let publisher = pub_sock(&ctx, "carState").unwrap();
        let sub = sub_sock(&ctx, "carState", SubOptions::default()).unwrap();
        publisher.send(&[0xff, 0xff]).unwrap();
        assert!(recv_one_or_none(&sub).is_err());
    }
}
