//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below exercises the OTA agent against mock ports and the
//! real stream codec.  All tests run on the host with no broker.

mod agent_flow_tests;
mod failure_tests;
mod mock_ports;
