use crate::services::Service;

/// Result type used by the transport and envelope layers.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Faults raised by the transport or while encoding/decoding envelopes.
///
/// Apart from [Decode](Self::Decode) inside
/// [SubMaster::update](crate::SubMaster::update), these are not recovered
/// by [SubMaster](crate::SubMaster) or [PubMaster](crate::PubMaster); they
/// propagate to the caller wrapped in an [eyre::Report] and can be
/// recovered with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// A second publisher tried to bind an endpoint that already has one.
    #[error("endpoint '{endpoint}' already has a publisher")]
    MultiplePublishers { endpoint: String },

    /// The bind address could not be parsed as an IP address.
    #[error("invalid address '{addr}'")]
    InvalidAddress { addr: String },

    /// The channel behind a socket is gone.
    #[error("endpoint '{endpoint}' disconnected")]
    Disconnected { endpoint: String },

    /// A list-shaped payload was initialized without an explicit size.
    #[error("service '{service}' has a list payload and requires an explicit size")]
    SizeRequired { service: Service },

    /// A size was given for a payload that is not list-shaped.
    #[error("service '{service}' has a struct payload and does not take a size")]
    SizeNotApplicable { service: Service },

    #[error("failed to encode envelope")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode envelope")]
    Decode(#[source] bincode::Error),
}
