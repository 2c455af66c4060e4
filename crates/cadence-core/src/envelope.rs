//! The message envelope wrapping every payload on the bus.

use crate::{
    clock,
    error::{MessagingError, Result},
    schema::*,
    services::Service,
};
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Outer wrapper carrying a validity flag, the producer's monotonic
/// timestamp and exactly one service payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-assigned monotonic time in nanoseconds.
    pub log_mono_time: u64,
    pub valid: bool,
    pub payload: Payload,
}

/// The payload slot, tagged by service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    CarState(CarState),
    ControlsState(ControlsState),
    ModelV2(ModelV2),
    RadarState(RadarState),
    DeviceState(DeviceState),
    PandaStates(Vec<PandaState>),
    LiveCalibration(LiveCalibration),
    CarParams(CarParams),
    GpsLocation(GpsLocation),
    Sendcan(Vec<CanFrame>),
    OnroadEvents(Vec<OnroadEvent>),
    UserFlag(UserFlag),
}

impl Payload {
    /// Build a default payload for a service.
    ///
    /// List-shaped services require `size` and are filled with that many
    /// default elements; struct services reject a size.
    pub fn init(service: Service, size: Option<usize>) -> Result<Self> {
        match (service.is_list(), size) {
            (true, None) => return Err(MessagingError::SizeRequired { service }),
            (false, Some(_)) => return Err(MessagingError::SizeNotApplicable { service }),
            _ => {}
        }
        let len = size.unwrap_or(0);

        let payload = match service {
            Service::CarState => Payload::CarState(CarState::default()),
            Service::ControlsState => Payload::ControlsState(ControlsState::default()),
            Service::ModelV2 => Payload::ModelV2(ModelV2::default()),
            Service::RadarState => Payload::RadarState(RadarState::default()),
            Service::DeviceState => Payload::DeviceState(DeviceState::default()),
            Service::PandaStates => Payload::PandaStates(vec![PandaState::default(); len]),
            Service::LiveCalibration => Payload::LiveCalibration(LiveCalibration::default()),
            Service::CarParams => Payload::CarParams(CarParams::default()),
            Service::GpsLocation => Payload::GpsLocation(GpsLocation::default()),
            Service::Sendcan => Payload::Sendcan(vec![CanFrame::default(); len]),
            Service::OnroadEvents => Payload::OnroadEvents(vec![OnroadEvent::default(); len]),
            Service::UserFlag => Payload::UserFlag(UserFlag::default()),
        };
        Ok(payload)
    }

    /// The service this payload belongs to.
    pub fn service(&self) -> Service {
        match self {
            Payload::CarState(_) => Service::CarState,
            Payload::ControlsState(_) => Service::ControlsState,
            Payload::ModelV2(_) => Service::ModelV2,
            Payload::RadarState(_) => Service::RadarState,
            Payload::DeviceState(_) => Service::DeviceState,
            Payload::PandaStates(_) => Service::PandaStates,
            Payload::LiveCalibration(_) => Service::LiveCalibration,
            Payload::CarParams(_) => Service::CarParams,
            Payload::GpsLocation(_) => Service::GpsLocation,
            Payload::Sendcan(_) => Service::Sendcan,
            Payload::OnroadEvents(_) => Service::OnroadEvents,
            Payload::UserFlag(_) => Service::UserFlag,
        }
    }
}

impl Event {
    /// The service carried in the payload slot.
    pub fn which(&self) -> Service {
        self.payload.service()
    }

    pub fn with_valid(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    pub fn with_log_mono_time(mut self, log_mono_time: u64) -> Self {
        self.log_mono_time = log_mono_time;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec().serialize(self).map_err(MessagingError::Encode)
    }
}

/// Build a new envelope for `service`.
///
/// The envelope starts out invalid and stamped with the current monotonic
/// time; use the `with_*` methods to override fields. See
/// [Payload::init] for the meaning of `size`.
pub fn new_message(service: Service, size: Option<usize>) -> Result<Event> {
    Ok(Event {
        log_mono_time: clock::monotonic_nanos(),
        valid: false,
        payload: Payload::init(service, size)?,
    })
}

/// Decode an envelope. Nesting depth and total size are not limited.
pub fn log_from_bytes(dat: &[u8]) -> Result<Event> {
    codec().deserialize(dat).map_err(MessagingError::Decode)
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_no_limit()
}
