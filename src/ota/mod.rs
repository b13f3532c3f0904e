//! OTA engine: job lifecycle, block download session, inbound routing.
//!
//! | Module      | Owns                                        |
//! |-------------|---------------------------------------------|
//! | `lifecycle` | the single active job and its status        |
//! | `session`   | block requests and the reassembly buffer    |
//! | `router`    | topic → component classification            |
//! | `agent`     | composition of the above over the ports     |
//! | `channels`  | transport callback → dispatch task hand-off |

pub mod agent;
pub mod channels;
pub mod lifecycle;
pub mod router;
pub mod session;

pub use agent::OtaAgent;
