//! Error types for hdcptest.

use thiserror::Error;

use crate::status::{HdcpLevel, HdcpStatus, PortStatus};

/// Main error type for HDCP test operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A driver call returned a non-successful status.
    #[error("Failed to {op} (error {status})")]
    Driver { op: &'static str, status: HdcpStatus },

    /// Setting the protection level failed on a port.
    #[error("Failed to set {level:?} (error {status}) on port {port}")]
    SetLevel {
        port: u32,
        level: HdcpLevel,
        status: HdcpStatus,
    },

    /// Querying a port's status failed.
    #[error("Port {port}: failed to get status (error {status})")]
    QueryStatus { port: u32, status: HdcpStatus },

    /// A port reported a status other than the one expected.
    #[error("Port {port}: status {observed} is not expected ({expected})")]
    StatusMismatch {
        port: u32,
        observed: PortStatus,
        expected: PortStatus,
    },

    /// The driver reported more ports than the table holds.
    #[error("Port count {count} is larger than max number of ports ({max})")]
    TooManyPorts { count: u32, max: usize },

    /// No external display is connected.
    #[error("No external display connected")]
    NoDisplay,

    /// Enumeration found ports but none of them is connected.
    #[error("No connected port to operate on")]
    NoConnectedPort,

    /// An operation needed a session that does not exist.
    #[error("No HDCP session is open")]
    NoSession,

    /// A session already exists for this runner.
    #[error("HDCP session {0} already created")]
    SessionExists(u32),

    /// Unrecognised test mode name.
    #[error("Invalid test mode: {0}")]
    InvalidTestMode(String),

    /// The SDK shared library could not be loaded or is missing symbols.
    #[cfg(feature = "sdk")]
    #[error("Failed to load HDCP SDK: {0}")]
    LibraryLoad(#[from] libloading::Error),
}

impl Error {
    /// Driver status this error is reported as.
    ///
    /// Driver failures keep their own code; everything detected on this side
    /// of the API is an internal error, except the no-display condition.
    pub fn status(&self) -> HdcpStatus {
        match self {
            Error::Driver { status, .. } | Error::SetLevel { status, .. } => *status,
            Error::NoDisplay => HdcpStatus::ErrorNoDisplay,
            Error::SessionExists(_) => HdcpStatus::ErrorAlreadyCreated,
            Error::QueryStatus { .. }
            | Error::StatusMismatch { .. }
            | Error::TooManyPorts { .. }
            | Error::NoConnectedPort
            | Error::NoSession
            | Error::InvalidTestMode(_) => HdcpStatus::ErrorInternal,
            #[cfg(feature = "sdk")]
            Error::LibraryLoad(_) => HdcpStatus::ErrorInternal,
        }
    }
}

/// Result type alias for hdcptest operations.
pub type Result<T> = std::result::Result<T, Error>;
