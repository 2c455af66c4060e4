//! Configuration parsing and validation for the cadence node.

use cadence_core::{Service, SubMasterConfig};
use eyre::{Result, WrapErr, bail, ensure};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Services to monitor and how to check them.
    pub submaster: SubMasterConfig,

    /// Interval between SubMaster updates.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,

    /// How long each update waits for polled services.
    #[serde(with = "humantime_serde", default = "default_update_timeout")]
    pub update_timeout: Duration,

    /// Interval between health reports.
    #[serde(with = "humantime_serde", default = "default_report_interval")]
    pub report_interval: Duration,

    /// Stop after this long. Runs until interrupted when absent.
    #[serde(with = "humantime_serde", default)]
    pub run_for: Option<Duration>,

    /// Synthetic publishers started alongside the monitor.
    #[serde(default)]
    pub publishers: Vec<PublisherConfig>,
}

fn default_update_timeout() -> Duration {
    Duration::from_millis(100)
}

fn default_report_interval() -> Duration {
    Duration::from_secs(1)
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.submaster
            .validate()
            .wrap_err("Invalid submaster configuration")?;

        ensure!(!self.tick.is_zero(), "tick must be greater than zero");
        ensure!(
            !self.report_interval.is_zero(),
            "report_interval must be greater than zero"
        );

        for (i, publisher) in self.publishers.iter().enumerate() {
            ensure!(
                publisher.rate_scale.is_finite() && publisher.rate_scale > 0.0,
                "Publisher at index {} has a non-positive rate_scale",
                i
            );
            if publisher.period().is_none() {
                bail!(
                    "Publisher '{}' has no expected frequency; set an explicit period",
                    publisher.service
                );
            }
        }

        // Check for duplicate publishers
        let mut services: Vec<Service> = self.publishers.iter().map(|p| p.service).collect();
        services.sort();
        for window in services.windows(2) {
            if window[0] == window[1] {
                bail!("Duplicate publisher: {}", window[0]);
            }
        }

        Ok(())
    }
}

/// A synthetic publisher for one service.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub service: Service,

    /// Multiplier on the service's expected frequency.
    #[serde(default = "default_rate_scale")]
    pub rate_scale: f64,

    /// Explicit publish period, overriding the scaled frequency.
    #[serde(with = "humantime_serde", default)]
    pub period: Option<Duration>,

    /// Validity flag stamped on every message.
    #[serde(default = "default_valid")]
    pub valid: bool,

    /// Stop publishing after this long.
    #[serde(with = "humantime_serde", default)]
    pub stop_after: Option<Duration>,
}

fn default_rate_scale() -> f64 {
    1.0
}

fn default_valid() -> bool {
    true
}

impl PublisherConfig {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            rate_scale: default_rate_scale(),
            period: None,
            valid: default_valid(),
            stop_after: None,
        }
    }

    /// The interval between messages, if one can be derived.
    pub fn period(&self) -> Option<Duration> {
        if let Some(period) = self.period {
            return (!period.is_zero()).then_some(period);
        }
        if !self.service.has_frequency() {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / (self.service.frequency() * self.rate_scale)).ok()
    }
}
