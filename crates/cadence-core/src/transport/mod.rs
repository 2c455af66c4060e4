//! In-process publish/subscribe transport.
//!
//! A [Context] owns every channel created through it and may be shared
//! across threads. Each subscriber gets its own queue; publishing copies
//! the bytes into every live subscriber queue and wakes any [Poller] the
//! subscriber is registered with.

mod context;
pub mod fake;
mod poller;
mod socket;

pub use context::{Context, DEFAULT_ADDR};
pub use fake::{Signal, SocketEventHandle, fake_event_handle, wait_for_one_event};
pub use poller::Poller;
pub use socket::{PubSocket, SubSocket};
