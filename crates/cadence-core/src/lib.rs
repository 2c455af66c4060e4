//! This library aggregates many pub/sub topics into a single per-tick
//! view, tracking for each topic the latest message and whether it is
//! alive, arriving at its expected rate and marked valid by its producer.
//!
//! # Usage
//!
//! ```rust
//! use cadence_core::{Context, PubMaster, Service, SubMaster, SubMasterConfig, new_message};
//! use std::time::Duration;
//!
//! # fn main() -> eyre::Result<()> {
//! let ctx = Context::new();
//!
//! // Subscribers must exist before anything is published.
//! let config = SubMasterConfig::new([Service::CarState, Service::ModelV2]);
//! let mut sm = SubMaster::new(&ctx, config)?;
//! let pm = PubMaster::new(&ctx, [Service::CarState])?;
//!
//! let msg = new_message(Service::CarState, None)?.with_valid(true);
//! pm.send(Service::CarState, &msg)?;
//!
//! // One tick: wait up to 100 ms for anything to arrive.
//! sm.update(Duration::from_millis(100))?;
//! assert_eq!(sm.updated(Service::CarState), Some(true));
//! assert_eq!(sm.updated(Service::ModelV2), Some(false));
//! assert!(sm.all_valid(Some(&[Service::CarState])));
//! # Ok(())
//! # }
//! ```

pub mod clock;
mod config;
pub mod drain;
mod envelope;
mod error;
pub mod history;
mod pubmaster;
pub mod schema;
mod services;
pub mod state;
mod submaster;
pub mod transport;

pub use config::SubMasterConfig;
pub use drain::{
    SubOptions, drain_sock, drain_sock_raw, pub_sock, recv_one, recv_one_or_none,
    recv_one_retry, recv_sock, sub_sock,
};
pub use envelope::{Event, Payload, log_from_bytes, new_message};
pub use error::{MessagingError, Result};
pub use pubmaster::{DEFAULT_POLL_INTERVAL, PubMaster, SendData};
pub use services::{MIN_FREQUENCY, Service};
pub use state::ServiceState;
pub use submaster::SubMaster;
pub use transport::{Context, Poller, PubSocket, SubSocket};
