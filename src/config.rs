//! Engine configuration and fixed capacities.
//!
//! The capacities are compile-time constants because every buffer on the
//! protocol path is statically sized.  The tunables live in [`OtaConfig`],
//! which can be deserialised from JSON (e.g. provisioning payload) or built
//! from [`Default`].

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::jobs::topics::is_json_string_safe;
use crate::ota::session::RetryPolicy;

// ── Fixed capacities ──────────────────────────────────────────

/// Capacity of every jobs/streams topic buffer.
pub const TOPIC_BUFFER_SIZE: usize = 256;

/// Longest accepted device identity (thing name).
pub const MAX_THING_NAME_LEN: usize = 128;

/// Longest accepted job id.
pub const MAX_JOB_ID_LEN: usize = 64;

/// Longest accepted client token.
pub const MAX_CLIENT_TOKEN_LEN: usize = 64;

/// Longest accepted expected-version string.
pub const MAX_VERSION_LEN: usize = 16;

/// Longest accepted image reference (stream name).
pub const MAX_IMAGE_REF_LEN: usize = 64;

/// `{"clientToken":""}` plus the longest token.
pub const START_NEXT_MSG_CAPACITY: usize = 18 + MAX_CLIENT_TOKEN_LEN;

/// `{"status":"","expectedVersion":""}` plus `IN_PROGRESS` plus the longest version.
pub const UPDATE_MSG_CAPACITY: usize = 34 + 11 + MAX_VERSION_LEN;

/// Default transfer block size in bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Size of the decoded-block scratch buffer; upper bound for `block_size`.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Default reassembly buffer capacity (largest downloadable file).
pub const MAX_FILE_SIZE: usize = 65_536;

/// Blocks requested per request message. One block in flight at a time.
pub const BLOCKS_PER_REQUEST: u32 = 1;

// ── Tunables ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    /// Bytes per requested block.
    pub block_size: u32,
    /// Token echoed by the job service in start-next replies.
    pub client_token: heapless::String<MAX_CLIENT_TOKEN_LEN>,
    /// Used when the accepted execution carries no `versionNumber`.
    pub default_expected_version: heapless::String<MAX_VERSION_LEN>,
    /// How long a block request may stay unanswered before it is re-sent.
    pub request_timeout_ms: u32,
    /// Re-sends of one block before the transfer is abandoned.
    pub max_request_retries: u8,
}

impl Default for OtaConfig {
    fn default() -> Self {
        let mut client_token = heapless::String::new();
        let _ = client_token.push_str("clientToken");
        let mut default_expected_version = heapless::String::new();
        let _ = default_expected_version.push_str("1");
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            client_token,
            default_expected_version,
            request_timeout_ms: 5_000,
            max_request_retries: 3,
        }
    }
}

impl OtaConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 || self.block_size as usize > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSize);
        }
        if !is_json_string_safe(&self.client_token) {
            return Err(ConfigError::ClientToken);
        }
        if !is_json_string_safe(&self.default_expected_version) {
            return Err(ConfigError::ExpectedVersion);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::RequestTimeout);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout_ms: self.request_timeout_ms,
            max_retries: self.max_request_retries,
        }
    }
}
