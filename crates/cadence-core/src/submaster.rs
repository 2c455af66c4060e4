//! Per-tick aggregation of many subscribed services.

use crate::{
    clock,
    config::SubMasterConfig,
    drain::recv_one_or_none,
    envelope::{Event, Payload},
    error::MessagingError,
    services::Service,
    state::ServiceState,
    transport::{Context, Poller, SubSocket},
};
use eyre::{Result, WrapErr};
use indexmap::{IndexMap, IndexSet};
use std::{ops::Index, time::Duration};
use tracing::{debug, info, warn};

/// A service is alive while its last receipt is younger than this many
/// expected periods.
const ALIVE_PERIODS: f64 = 10.0;

/// The mean interval must beat the period at this fraction of the
/// expected frequency.
const MIN_FREQ_RATIO: f64 = 0.9;

/// Tracks the latest message and health flags of a fixed set of services.
///
/// Each call to [update](Self::update) is one tick: the frame counter
/// advances, ready subscribers are drained and every service's liveness
/// and rate flags are recomputed.
#[derive(Debug)]
pub struct SubMaster {
    frame: i64,
    states: IndexMap<Service, ServiceState>,
    sockets: IndexMap<Service, SubSocket>,
    poller: Poller,
    policy: CheckPolicy,
}

#[derive(Debug, Default)]
struct CheckPolicy {
    non_polled: IndexSet<Service>,
    ignore_alive: IndexSet<Service>,
    ignore_avg_freq: IndexSet<Service>,
    ignore_valid: IndexSet<Service>,
}

impl CheckPolicy {
    fn rate_check_applies(&self, service: Service, state: &ServiceState) -> bool {
        state.has_received()
            && service.has_frequency()
            && !self.non_polled.contains(&service)
            && !self.ignore_avg_freq.contains(&service)
            && !self.ignore_alive.contains(&service)
    }
}

impl SubMaster {
    pub fn new(ctx: &Context, config: SubMasterConfig) -> Result<Self> {
        config.validate()?;

        // Pin the clock origin before any receipt can be timestamped.
        clock::monotonic();

        if let Some(poll) = &config.poll {
            for service in poll.iter().filter(|s| !config.services.contains(s)) {
                warn!(service = %service, "Polled service is not tracked and will be ignored");
            }
        }

        let non_polled: IndexSet<Service> = config
            .services
            .iter()
            .copied()
            .filter(|&service| config.is_non_polled(service))
            .collect();

        let (ignore_alive, ignore_avg_freq) = if config.simulation {
            let all: IndexSet<Service> = config.services.iter().copied().collect();
            (all.clone(), all)
        } else {
            (
                config.ignore_alive.iter().copied().collect(),
                config.ignore_avg_freq.iter().copied().collect(),
            )
        };

        let mut poller = Poller::new();
        let mut states = IndexMap::with_capacity(config.services.len());
        let mut sockets = IndexMap::with_capacity(config.services.len());

        for &service in &config.services {
            let sock = ctx
                .sub_socket(service.name(), &config.addr, true)
                .wrap_err_with(|| format!("Failed to subscribe to '{service}'"))?;
            if !non_polled.contains(&service) {
                poller.register(&sock);
            }
            states.insert(service, ServiceState::new(placeholder(service)?));
            sockets.insert(service, sock);
        }

        info!(
            services = states.len(),
            polled = poller.len(),
            simulation = config.simulation,
            addr = %config.addr,
            "SubMaster ready"
        );

        Ok(Self {
            frame: -1,
            states,
            sockets,
            poller,
            policy: CheckPolicy {
                non_polled,
                ignore_alive,
                ignore_avg_freq,
                ignore_valid: config.ignore_valid.iter().copied().collect(),
            },
        })
    }

    /// Run one tick.
    ///
    /// Waits up to `timeout` for any polled service to become ready,
    /// takes at most one message from each ready subscriber and from every
    /// non-polled subscriber, then recomputes all flags.
    ///
    /// A message that fails to decode is logged and treated as absent.
    /// Other receive faults do not stop the tick either: every message
    /// already taken is applied and the frame advances before the first
    /// fault is returned.
    pub fn update(&mut self, timeout: Duration) -> Result<()> {
        let mut msgs = Vec::with_capacity(self.sockets.len());
        let mut first_err = None;

        let ready = self.poller.poll(timeout);
        let non_polled = self
            .policy
            .non_polled
            .iter()
            .filter_map(|service| self.sockets.get(service));

        for sock in ready.iter().chain(non_polled) {
            match receive(sock) {
                Ok(msg) => msgs.push(msg),
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        self.update_msgs(clock::monotonic(), msgs);

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Apply a batch of received messages as one tick observed at `now`.
    ///
    /// `None` entries are no-ops. Messages for untracked services are
    /// skipped.
    pub fn update_msgs(&mut self, now: Duration, msgs: impl IntoIterator<Item = Option<Event>>) {
        self.frame += 1;
        let frame = self.frame;

        for state in self.states.values_mut() {
            state.updated = false;
        }

        for msg in msgs.into_iter().flatten() {
            let service = msg.which();
            let Some(state) = self.states.get_mut(&service) else {
                warn!(service = %service, frame, "Dropping message for untracked service");
                continue;
            };
            state.record(now, frame, msg);
            if self.policy.ignore_valid.contains(&service) {
                state.valid = true;
            }
        }

        let policy = &self.policy;
        for (&service, state) in self.states.iter_mut() {
            let (was_alive, was_freq_ok) = (state.alive, state.freq_ok);

            if service.has_frequency() {
                let max_age = Duration::from_secs_f64(ALIVE_PERIODS / service.frequency());
                state.alive = policy.ignore_alive.contains(&service)
                    || now.saturating_sub(state.recv_time) < max_age;

                state.freq_ok = if policy.rate_check_applies(service, state) {
                    let max_avg =
                        Duration::from_secs_f64(1.0 / (MIN_FREQ_RATIO * service.frequency()));
                    state.history.mean().is_some_and(|avg| avg < max_avg)
                } else {
                    true
                };
            } else {
                state.alive = true;
                state.freq_ok = true;
            }

            if was_alive && !state.alive {
                warn!(service = %service, frame, "Service is no longer alive");
            } else if !was_alive && state.alive {
                debug!(service = %service, frame, "Service is alive");
            }
            if was_freq_ok && !state.freq_ok {
                warn!(
                    service = %service,
                    frame,
                    expected_hz = service.frequency(),
                    "Service is below its expected rate"
                );
            } else if !was_freq_ok && state.freq_ok {
                debug!(service = %service, frame, "Service rate recovered");
            }
        }
    }

    /// Number of completed ticks minus one; `-1` before the first tick.
    pub fn frame(&self) -> i64 {
        self.frame
    }

    /// Tracked services in configuration order.
    pub fn services(&self) -> impl Iterator<Item = Service> + '_ {
        self.states.keys().copied()
    }

    pub fn contains(&self, service: Service) -> bool {
        self.states.contains_key(&service)
    }

    /// Whether `service` is served by the poller.
    pub fn is_polled(&self, service: Service) -> bool {
        self.contains(service) && !self.policy.non_polled.contains(&service)
    }

    pub fn state(&self, service: Service) -> Option<&ServiceState> {
        self.states.get(&service)
    }

    pub fn states(&self) -> impl Iterator<Item = (Service, &ServiceState)> + '_ {
        self.states.iter().map(|(&service, state)| (service, state))
    }

    pub fn updated(&self, service: Service) -> Option<bool> {
        self.state(service).map(|state| state.updated)
    }

    pub fn alive(&self, service: Service) -> Option<bool> {
        self.state(service).map(|state| state.alive)
    }

    pub fn freq_ok(&self, service: Service) -> Option<bool> {
        self.state(service).map(|state| state.freq_ok)
    }

    pub fn valid(&self, service: Service) -> Option<bool> {
        self.state(service).map(|state| state.valid)
    }

    pub fn recv_time(&self, service: Service) -> Option<Duration> {
        self.state(service).map(|state| state.recv_time)
    }

    pub fn recv_frame(&self, service: Service) -> Option<i64> {
        self.state(service).map(|state| state.recv_frame)
    }

    pub fn log_mono_time(&self, service: Service) -> Option<u64> {
        self.state(service).map(|state| state.log_mono_time)
    }

    pub fn payload(&self, service: Service) -> Option<&Payload> {
        self.state(service).map(|state| &state.payload)
    }

    /// Every selected service not exempt from the liveness check is alive.
    ///
    /// `None` selects every tracked service. Untracked services in the
    /// selection fail the check.
    pub fn all_alive(&self, services: Option<&[Service]>) -> bool {
        self.selected(services)
            .filter(|service| !self.policy.ignore_alive.contains(service))
            .all(|service| self.check(service, |_, state| state.alive))
    }

    /// Every selected service passes the average-rate check, or is exempt
    /// from it.
    pub fn all_freq_ok(&self, services: Option<&[Service]>) -> bool {
        self.selected(services).all(|service| {
            self.check(service, |policy, state| {
                !policy.rate_check_applies(service, state) || state.freq_ok
            })
        })
    }

    /// Every selected service not exempt from the validity check carries a
    /// valid last message.
    pub fn all_valid(&self, services: Option<&[Service]>) -> bool {
        self.selected(services)
            .filter(|service| !self.policy.ignore_valid.contains(service))
            .all(|service| self.check(service, |_, state| state.valid))
    }

    pub fn all_checks(&self, services: Option<&[Service]>) -> bool {
        self.all_alive(services) && self.all_freq_ok(services) && self.all_valid(services)
    }

    fn selected<'a>(
        &'a self,
        services: Option<&'a [Service]>,
    ) -> Box<dyn Iterator<Item = Service> + 'a> {
        match services {
            Some(services) => Box::new(services.iter().copied()),
            None => Box::new(self.states.keys().copied()),
        }
    }

    fn check<F>(&self, service: Service, f: F) -> bool
    where
        F: FnOnce(&CheckPolicy, &ServiceState) -> bool,
    {
        match self.states.get(&service) {
            Some(state) => f(&self.policy, state),
            None => {
                debug!(service = %service, "Checked service is not tracked");
                false
            }
        }
    }
}

impl Index<Service> for SubMaster {
    type Output = Payload;

    /// The latest payload of a tracked service.
    ///
    /// # Panics
    ///
    /// Panics if `service` is not tracked.
    fn index(&self, service: Service) -> &Payload {
        &self.states[&service].payload
    }
}

fn receive(sock: &SubSocket) -> Result<Option<Event>> {
    match recv_one_or_none(sock) {
        Ok(msg) => Ok(msg),
        Err(MessagingError::Decode(err)) => {
            warn!(endpoint = %sock.endpoint(), error = %err, "Dropping undecodable message");
            Ok(None)
        }
        Err(err) => {
            Err(err).wrap_err_with(|| format!("Failed to receive on '{}'", sock.endpoint()))
        }
    }
}

/// An empty payload to expose before the first receipt.
fn placeholder(service: Service) -> Result<Payload> {
    match Payload::init(service, None) {
        Ok(payload) => Ok(payload),
        Err(MessagingError::SizeRequired { .. }) => {
            debug!(service = %service, "Using an empty list as placeholder");
            Ok(Payload::init(service, Some(0))?)
        }
        Err(err) => Err(err.into()),
    }
}
