//! Port traits: the hexagonal boundary between the OTA engine and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ OtaAgent (domain)
//! ```
//!
//! | Port            | Driven by                | Used for                        |
//! |-----------------|--------------------------|---------------------------------|
//! | `Publisher`     | MQTT client              | jobs / stream requests          |
//! | `JsonExtractor` | JSON parser              | job-id / document extraction    |
//! | `BlockTransfer` | stream protocol codec    | block requests and decoding     |
//! | `ImageSink`     | flash / post-processing  | the assembled image             |
//! | `EventSink`     | log / telemetry          | structured engine events        |

use crate::identity::DeviceIdentity;

// ───────────────────────────────────────────────────────────────
// Publisher port (domain → pub/sub transport)
// ───────────────────────────────────────────────────────────────

/// Outbound half of the pub/sub transport.
pub trait Publisher {
    /// `false` while the transport has no session with the broker.
    fn is_connected(&self) -> bool;

    /// Publish `payload` on `topic`.  Returns whether the transport
    /// accepted the message.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool;
}

// ───────────────────────────────────────────────────────────────
// JSON extraction port
// ───────────────────────────────────────────────────────────────

/// Looks up a dotted field path (`execution.jobId`, `afr_ota.files.0.fileid`)
/// in a JSON document.
pub trait JsonExtractor {
    /// `None` if the document is not valid JSON or the field is absent.
    /// String values are returned without quotes; any other value is
    /// returned as compact JSON text.
    fn extract(&self, document: &str, field_path: &str) -> Option<String>;
}

// ───────────────────────────────────────────────────────────────
// Block transfer port (stream request encoding + block decoding)
// ───────────────────────────────────────────────────────────────

/// A request for `count` blocks starting at block index `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub file_id: u8,
    pub block_size: u32,
    pub offset: u32,
    pub count: u32,
}

/// Metadata of a decoded block; the payload is the first `len` bytes of
/// the caller's output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub file_id: u8,
    pub block_id: u32,
    pub len: usize,
}

pub trait BlockTransfer {
    /// Prepare the transfer of `image_ref` for this device.
    fn init(&mut self, identity: &DeviceIdentity, image_ref: &str) -> bool;

    /// Encode and publish a block request.
    fn request_block<P: Publisher>(&mut self, publisher: &mut P, request: &BlockRequest) -> bool;

    /// Whether `topic` carries block data for the prepared transfer.
    fn is_block_topic(&self, topic: &str) -> bool;

    /// Decode one block message into `out`.  `None` if the payload is
    /// malformed or its data does not fit `out`.
    fn decode_block(&self, payload: &[u8], out: &mut [u8]) -> Option<BlockHeader>;
}

// ───────────────────────────────────────────────────────────────
// Image sink port (domain → post-download processing)
// ───────────────────────────────────────────────────────────────

pub trait ImageSink {
    /// Receives the complete image.  Returning `false` fails the job.
    fn on_transfer_complete(&mut self, image: &[u8]) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`OtaEvent`](super::events::OtaEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::OtaEvent);
}
