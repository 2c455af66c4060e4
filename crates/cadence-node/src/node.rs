//! MonitorNode implementation.

use crate::config::{Config, PublisherConfig};
use cadence_core::{Context, PubMaster, Service, SubMaster, new_message};
use eyre::{Result, WrapErr, eyre};
use itertools::Itertools;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

/// Health of one service as judged by the SubMaster's checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHealth {
    pub service: Service,
    pub alive: bool,
    pub freq_ok: bool,
    pub valid: bool,
}

impl ServiceHealth {
    pub fn healthy(&self) -> bool {
        self.alive && self.freq_ok && self.valid
    }
}

/// A snapshot of every monitored service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub frame: i64,
    pub services: Vec<ServiceHealth>,
}

impl HealthReport {
    pub fn from_submaster(sm: &SubMaster) -> Self {
        let services = sm
            .services()
            .map(|service| {
                let subset = [service];
                ServiceHealth {
                    service,
                    alive: sm.all_alive(Some(&subset)),
                    freq_ok: sm.all_freq_ok(Some(&subset)),
                    valid: sm.all_valid(Some(&subset)),
                }
            })
            .collect();

        Self {
            frame: sm.frame(),
            services,
        }
    }

    pub fn healthy(&self) -> bool {
        self.services.iter().all(ServiceHealth::healthy)
    }

    pub fn failing(&self) -> impl Iterator<Item = &ServiceHealth> {
        self.services.iter().filter(|health| !health.healthy())
    }

    pub fn get(&self, service: Service) -> Option<&ServiceHealth> {
        self.services.iter().find(|health| health.service == service)
    }
}

/// The health monitor node.
///
/// Drives a [SubMaster] at a fixed tick against a set of synthetic
/// publishers, one thread per publisher, and logs a health report at a
/// fixed interval.
pub struct MonitorNode {
    config: Config,
    sm: SubMaster,
    pm: Arc<PubMaster>,
}

impl MonitorNode {
    /// Create a node on `ctx`. Subscribers are created before publishers so
    /// that no early message is missed.
    pub fn new(ctx: &Context, config: Config) -> Result<Self> {
        config.validate()?;

        info!(
            services = config.submaster.services.len(),
            publishers = config.publishers.len(),
            tick = ?config.tick,
            update_timeout = ?config.update_timeout,
            simulation = config.submaster.simulation,
            "Creating MonitorNode"
        );

        for publisher in &config.publishers {
            if !config.submaster.services.contains(&publisher.service) {
                warn!(service = %publisher.service, "Publisher targets an unmonitored service");
            }
        }

        let sm = SubMaster::new(ctx, config.submaster.clone())?;
        let pm = PubMaster::new(ctx, config.publishers.iter().map(|p| p.service))?;

        Ok(Self {
            config,
            sm,
            pm: Arc::new(pm),
        })
    }

    /// Run until `run_for` elapses or `shutdown` is raised, then stop the
    /// publishers and return the final health report.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<HealthReport> {
        let mut handles = Vec::with_capacity(self.config.publishers.len());
        let mut spawned = Ok(());
        for publisher in &self.config.publishers {
            match spawn_publisher(self.pm.clone(), publisher.clone(), shutdown.clone()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    spawned = Err(err);
                    break;
                }
            }
        }

        let result = spawned.and_then(|()| self.monitor(&shutdown));

        shutdown.store(true, Ordering::Release);
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "Publisher failed"),
                Err(_) => error!("Publisher thread panicked"),
            }
        }

        let report = result?;
        info!(frame = report.frame, healthy = report.healthy(), "MonitorNode stopped");
        Ok(report)
    }

    fn monitor(&mut self, shutdown: &AtomicBool) -> Result<HealthReport> {
        let start = Instant::now();
        let deadline = self.config.run_for.and_then(|run_for| start.checked_add(run_for));
        let mut next_tick = start;
        let mut next_report = start + self.config.report_interval;
        let mut last_healthy = None;

        loop {
            if shutdown.load(Ordering::Acquire) {
                debug!("Shutdown requested");
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            self.sm.update(self.config.update_timeout)?;

            let now = Instant::now();
            if now >= next_report {
                let report = HealthReport::from_submaster(&self.sm);
                log_report(&report, last_healthy);
                last_healthy = Some(report.healthy());
                next_report = now + self.config.report_interval;
            }

            next_tick += self.config.tick;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        Ok(HealthReport::from_submaster(&self.sm))
    }
}

fn log_report(report: &HealthReport, last_healthy: Option<bool>) {
    if report.healthy() {
        if last_healthy != Some(true) {
            info!(frame = report.frame, "All services healthy");
        } else {
            debug!(frame = report.frame, "All services healthy");
        }
        return;
    }

    let describe = |health: &ServiceHealth| {
        let failed = [
            (!health.alive).then_some("dead"),
            (!health.freq_ok).then_some("slow"),
            (!health.valid).then_some("invalid"),
        ]
        .into_iter()
        .flatten()
        .join("+");
        format!("{}({})", health.service, failed)
    };

    warn!(
        frame = report.frame,
        failing = %report.failing().map(describe).join(", "),
        "Services unhealthy"
    );
}

fn spawn_publisher(
    pm: Arc<PubMaster>,
    config: PublisherConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<()>>> {
    let period = config
        .period()
        .ok_or_else(|| eyre!("No publish period for '{}'", config.service))?;

    let service = config.service;
    thread::Builder::new()
        .name(format!("pub-{service}"))
        .spawn(move || publish_loop(&pm, &config, period, &shutdown))
        .wrap_err_with(|| format!("Failed to spawn publisher for '{service}'"))
}

fn publish_loop(
    pm: &PubMaster,
    config: &PublisherConfig,
    period: Duration,
    shutdown: &AtomicBool,
) -> Result<()> {
    let service = config.service;
    let size = service.is_list().then_some(0);
    let start = Instant::now();
    let mut next = start;
    let mut sent = 0u64;

    debug!(service = %service, ?period, valid = config.valid, "Publisher started");

    while !shutdown.load(Ordering::Acquire) {
        if config
            .stop_after
            .is_some_and(|stop_after| start.elapsed() >= stop_after)
        {
            info!(service = %service, sent, "Publisher reached stop_after");
            break;
        }

        let msg = new_message(service, size)?.with_valid(config.valid);
        pm.send(service, &msg)?;
        sent += 1;

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }

    debug!(service = %service, sent, "Publisher stopped");
    Ok(())
}
