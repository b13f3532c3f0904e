//! Unified error types for the OTA job engine.
//!
//! Each subsystem keeps a small `Copy` error enum; all of them convert into
//! the crate-level [`Error`] so bring-up code can funnel failures through a
//! single type.  Protocol-path failures that are expected in normal operation
//! (builder capacity, topic mismatch) are not errors at all: builders return
//! `None` and matchers return `false`.

use core::fmt;

use crate::ota::session::SessionError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The device identity is unusable for topic construction.
    Identity(IdentityError),
    /// Engine configuration failed validation.
    Config(ConfigError),
    /// A block download session failed.
    Session(SessionError),
    /// Platform bring-up failed (WiFi, MQTT client, logger).
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(e) => write!(f, "identity: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    Empty,
    /// Longer than [`MAX_THING_NAME_LEN`](crate::config::MAX_THING_NAME_LEN).
    TooLong,
    /// Contains `/`, `+`, `#` or NUL, which would change the topic structure.
    InvalidCharacter,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "device identity is empty"),
            Self::TooLong => write!(f, "device identity exceeds 128 bytes"),
            Self::InvalidCharacter => write!(f, "device identity contains a topic metacharacter"),
        }
    }
}

impl From<IdentityError> for Error {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `block_size` is zero or larger than the block scratch buffer.
    BlockSize,
    /// The client token is empty or not a valid JSON string body.
    ClientToken,
    /// The default expected version is empty or not a valid JSON string body.
    ExpectedVersion,
    /// `request_timeout_ms` is zero.
    RequestTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockSize => write!(f, "block size out of range"),
            Self::ClientToken => write!(f, "client token is empty or malformed"),
            Self::ExpectedVersion => write!(f, "default expected version is empty or malformed"),
            Self::RequestTimeout => write!(f, "request timeout must be non-zero"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}
