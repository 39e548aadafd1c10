//! hdcptest - exercise an HDCP driver end to end.
//!
//! This crate provides:
//! - The HDCP driver interface (`HdcpDriver`) and its port event callback.
//! - A test runner that creates a session, enables and verifies protection on
//!   every connected port, disables it again and tears the session down.
//! - A backend for the vendor HDCP SDK shared library and a scripted mock.
//!
//! Feature flags:
//! - `log`: route library diagnostics to the `log` crate.
//! - `sdk`: enable the SDK shared library backend.
//! - `cli`: enable the CLI binary helpers.

#[macro_use]
mod macros;

/// HDCP driver interface and event callback.
pub mod driver;
/// Common error types and Result alias.
pub mod error;
/// Scripted in-process driver.
pub mod mock;
/// Port records and enumeration snapshots.
pub mod port;
/// Test runner and run outcome.
pub mod runner;
/// Driver status codes, levels, port status and events.
pub mod status;

/// SDK shared library backend (feature: `sdk`).
#[cfg(feature = "sdk")]
pub mod sdk;

pub use driver::{HdcpDriver, PortEventHandler, SessionHandle};
pub use error::{Error, Result};
pub use runner::{Outcome, TestMode, TestRunner};
