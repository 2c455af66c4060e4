use crate::{services::Service, transport::DEFAULT_ADDR};
use eyre::{Result, bail, ensure};
use serde::Deserialize;

/// Configuration passed to [SubMaster::new](crate::SubMaster::new).
#[derive(Debug, Clone, Deserialize)]
pub struct SubMasterConfig {
    /// Services to track.
    pub services: Vec<Service>,

    /// Services served by the poller. When set and non-empty, every
    /// other tracked service is received non-blocking each tick instead.
    #[serde(default)]
    pub poll: Option<Vec<Service>>,

    /// Services exempt from the liveness check.
    #[serde(default)]
    pub ignore_alive: Vec<Service>,

    /// Services exempt from the average-rate check.
    #[serde(default)]
    pub ignore_avg_freq: Vec<Service>,

    /// Services exempt from the validity check.
    #[serde(default)]
    pub ignore_valid: Vec<Service>,

    /// Address subscribers connect to.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Pure-software harness without real timing: every service skips the
    /// liveness and average-rate checks.
    #[serde(default)]
    pub simulation: bool,
}

fn default_addr() -> String {
    DEFAULT_ADDR.to_string()
}

impl SubMasterConfig {
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: services.into_iter().collect(),
            poll: None,
            ignore_alive: Vec::new(),
            ignore_avg_freq: Vec::new(),
            ignore_valid: Vec::new(),
            addr: default_addr(),
            simulation: false,
        }
    }

    pub fn with_poll(mut self, poll: impl IntoIterator<Item = Service>) -> Self {
        self.poll = Some(poll.into_iter().collect());
        self
    }

    pub fn with_ignore_alive(mut self, services: impl IntoIterator<Item = Service>) -> Self {
        self.ignore_alive = services.into_iter().collect();
        self
    }

    pub fn with_ignore_avg_freq(mut self, services: impl IntoIterator<Item = Service>) -> Self {
        self.ignore_avg_freq = services.into_iter().collect();
        self
    }

    pub fn with_ignore_valid(mut self, services: impl IntoIterator<Item = Service>) -> Self {
        self.ignore_valid = services.into_iter().collect();
        self
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.services.is_empty(),
            "At least one service is required"
        );
        ensure!(!self.addr.is_empty(), "addr cannot be empty");

        let mut services = self.services.clone();
        services.sort();
        for window in services.windows(2) {
            if window[0] == window[1] {
                bail!("Duplicate service: {}", window[0]);
            }
        }

        Ok(())
    }

    /// Whether `service` is received directly instead of via the poller.
    pub fn is_non_polled(&self, service: Service) -> bool {
        match &self.poll {
            Some(poll) if !poll.is_empty() => !poll.contains(&service),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = SubMasterConfig::new([Service::CarState, Service::ModelV2])
            .with_poll([Service::ModelV2])
            .with_ignore_valid([Service::CarState])
            .with_simulation(true);

        assert_eq!(config.services.len(), 2);
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert!(config.simulation);
        assert!(config.is_non_polled(Service::CarState));
        assert!(!config.is_non_polled(Service::ModelV2));
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_poll_list_polls_everything() {
        let config = SubMasterConfig::new([Service::CarState]).with_poll(Vec::<Service>::new());
        assert!(!config.is_non_polled(Service::CarState));

        let config = SubMasterConfig::new([Service::CarState]);
        assert!(!config.is_non_polled(Service::CarState));
    }

    #[test]
    fn test_reject_empty_services() {
        let config = SubMasterConfig::new(Vec::<Service>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_duplicate_services() {
        let config = SubMasterConfig::new([Service::CarState, Service::CarState]);
        assert!(config.validate().is_err());
    }
}
