//! Static topic registry.
//!
//! Every topic on the bus is a [Service] with a fixed payload schema and
//! an expected publish frequency. A frequency of zero means the topic is
//! event-driven and is exempt from liveness and rate checks.

use eyre::bail;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Frequencies at or below this value are treated as "no expected rate".
pub const MIN_FREQUENCY: f64 = 1e-5;

/// A topic known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Service {
    CarState,
    ControlsState,
    ModelV2,
    RadarState,
    DeviceState,
    PandaStates,
    LiveCalibration,
    CarParams,
    GpsLocation,
    Sendcan,
    OnroadEvents,
    UserFlag,
}

impl Service {
    pub const ALL: [Service; 12] = [
        Service::CarState,
        Service::ControlsState,
        Service::ModelV2,
        Service::RadarState,
        Service::DeviceState,
        Service::PandaStates,
        Service::LiveCalibration,
        Service::CarParams,
        Service::GpsLocation,
        Service::Sendcan,
        Service::OnroadEvents,
        Service::UserFlag,
    ];

    /// The endpoint name used on the bus.
    pub fn name(self) -> &'static str {
        match self {
            Service::CarState => "carState",
            Service::ControlsState => "controlsState",
            Service::ModelV2 => "modelV2",
            Service::RadarState => "radarState",
            Service::DeviceState => "deviceState",
            Service::PandaStates => "pandaStates",
            Service::LiveCalibration => "liveCalibration",
            Service::CarParams => "carParams",
            Service::GpsLocation => "gpsLocation",
            Service::Sendcan => "sendcan",
            Service::OnroadEvents => "onroadEvents",
            Service::UserFlag => "userFlag",
        }
    }

    /// Expected publish frequency in Hz.
    pub fn frequency(self) -> f64 {
        match self {
            Service::CarState => 100.,
            Service::ControlsState => 100.,
            Service::ModelV2 => 20.,
            Service::RadarState => 20.,
            Service::DeviceState => 2.,
            Service::PandaStates => 10.,
            Service::LiveCalibration => 4.,
            Service::CarParams => 0.02,
            Service::GpsLocation => 1.,
            Service::Sendcan => 100.,
            Service::OnroadEvents => 1.,
            Service::UserFlag => 0.,
        }
    }

    /// Whether the service has a known positive expected rate.
    pub fn has_frequency(self) -> bool {
        self.frequency() > MIN_FREQUENCY
    }

    /// Whether the payload is a variable-length list.
    pub fn is_list(self) -> bool {
        matches!(
            self,
            Service::PandaStates | Service::Sendcan | Service::OnroadEvents
        )
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Service {
    type Err = eyre::Report;

    fn from_str(s: &str) -> eyre::Result<Self> {
        match Service::ALL.iter().find(|service| service.name() == s) {
            Some(service) => Ok(*service),
            None => bail!("unknown service '{}'", s),
        }
    }
}
