//! Job-driven OTA engine.
//!
//! A device asks the job service for its next job over pub/sub, downloads
//! the job's file block by block into a fixed buffer, and reports the
//! job's outcome.  The engine ([`ota`]) and protocol helpers ([`jobs`]) are
//! pure logic behind the port traits in [`app::ports`]; ESP-IDF code is
//! confined to [`adapters`] and guarded by `#[cfg(target_os = "espidf")]`.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod ota;
