//! One publisher per service.

use crate::{
    envelope::Event,
    services::Service,
    transport::{Context, PubSocket},
};
use eyre::{Result, WrapErr, eyre};
use indexmap::IndexMap;
use std::{
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info};

/// Sleep between reader checks while waiting for subscribers to catch up.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes accepted by [PubMaster::send].
#[derive(Debug, Clone, Copy)]
pub enum SendData<'a> {
    /// Already-encoded bytes, sent unchanged.
    Raw(&'a [u8]),
    /// An envelope, encoded before sending.
    Event(&'a Event),
}

impl<'a> From<&'a [u8]> for SendData<'a> {
    fn from(dat: &'a [u8]) -> Self {
        SendData::Raw(dat)
    }
}

impl<'a> From<&'a Vec<u8>> for SendData<'a> {
    fn from(dat: &'a Vec<u8>) -> Self {
        SendData::Raw(dat)
    }
}

impl<'a> From<&'a Event> for SendData<'a> {
    fn from(event: &'a Event) -> Self {
        SendData::Event(event)
    }
}

/// Owns a publisher for each of a set of services.
#[derive(Debug)]
pub struct PubMaster {
    sockets: IndexMap<Service, PubSocket>,
}

impl PubMaster {
    /// Bind one publisher per distinct service.
    pub fn new(ctx: &Context, services: impl IntoIterator<Item = Service>) -> Result<Self> {
        let mut sockets = IndexMap::new();
        for service in services {
            if sockets.contains_key(&service) {
                continue;
            }
            let sock = ctx
                .pub_socket(service.name())
                .wrap_err_with(|| format!("Failed to publish '{service}'"))?;
            sockets.insert(service, sock);
        }

        info!(services = sockets.len(), "PubMaster ready");
        Ok(Self { sockets })
    }

    pub fn services(&self) -> impl Iterator<Item = Service> + '_ {
        self.sockets.keys().copied()
    }

    /// Send raw bytes or an envelope on `service`.
    ///
    /// Raw bytes are not checked against the service schema.
    pub fn send<'a>(&self, service: Service, data: impl Into<SendData<'a>>) -> Result<()> {
        let sock = self.socket(service)?;
        match data.into() {
            SendData::Raw(dat) => sock.send(dat)?,
            SendData::Event(event) => sock.send(&event.to_bytes()?)?,
        }
        Ok(())
    }

    /// Whether every current subscriber of `service` has consumed the last
    /// publish. False when there are no subscribers.
    pub fn all_readers_updated(&self, service: Service) -> Result<bool> {
        Ok(self.socket(service)?.all_readers_updated())
    }

    /// Block until [all_readers_updated](Self::all_readers_updated) holds
    /// or `timeout` elapses, checking every [DEFAULT_POLL_INTERVAL].
    /// Returns the last observed readiness.
    pub fn wait_for_readers_to_update(&self, service: Service, timeout: Duration) -> Result<bool> {
        self.wait_for_readers_to_update_with_interval(service, timeout, DEFAULT_POLL_INTERVAL)
    }

    pub fn wait_for_readers_to_update_with_interval(
        &self,
        service: Service,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool> {
        let sock = self.socket(service)?;
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if sock.all_readers_updated() {
                return Ok(true);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => interval,
            };
            if remaining.is_zero() {
                debug!(service = %service, ?timeout, "Readers did not catch up in time");
                return Ok(false);
            }
            thread::sleep(interval.min(remaining));
        }
    }

    /// Async variant of
    /// [wait_for_readers_to_update](Self::wait_for_readers_to_update).
    #[cfg(feature = "tokio")]
    pub async fn wait_for_readers_to_update_async(
        &self,
        service: Service,
        timeout: Duration,
    ) -> Result<bool> {
        let sock = self.socket(service)?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if sock.all_readers_updated() {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!(service = %service, ?timeout, "Readers did not catch up in time");
                return Ok(false);
            }
            tokio::time::sleep(DEFAULT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn socket(&self, service: Service) -> Result<&PubSocket> {
        self.sockets
            .get(&service)
            .ok_or_else(|| eyre!("Service '{service}' is not published by this PubMaster"))
    }
}
