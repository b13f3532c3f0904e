//! Application boundary: collaborator ports and outbound events.
//!
//! The OTA engine in [`crate::ota`] never touches the network, the JSON
//! parser or the flash directly.  Everything external is reached through
//! the traits in [`ports`], which keeps the engine testable on the host.

pub mod events;
pub mod ports;
