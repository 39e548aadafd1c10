//! Driver status codes, protection levels, port status and port events.
//!
//! Numeric values match the HDCP SDK's C enums so they can cross the FFI
//! boundary unchanged and double as process exit codes.

use std::fmt;

/// Status code returned by every HDCP driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdcpStatus {
    Successful,
    ErrorAlreadyCreated,
    ErrorInvalidParameter,
    /// No external display is connected.
    ErrorNoDisplay,
    ErrorRevokedDevice,
    ErrorSrmInvalid,
    ErrorInsufficientMemory,
    ErrorInternal,
    ErrorSrmNotRecent,
    ErrorSrmFileStorage,
    ErrorMaxDevicesExceeded,
    ErrorMaxDepthExceeded,
    ErrorMsgTransaction,
    /// A code this crate does not know about, kept verbatim.
    Unknown(u32),
}

impl HdcpStatus {
    /// Decode a raw driver status code.
    pub fn from_raw(code: u32) -> Self {
        match code {
            0 => HdcpStatus::Successful,
            1 => HdcpStatus::ErrorAlreadyCreated,
            2 => HdcpStatus::ErrorInvalidParameter,
            3 => HdcpStatus::ErrorNoDisplay,
            4 => HdcpStatus::ErrorRevokedDevice,
            5 => HdcpStatus::ErrorSrmInvalid,
            6 => HdcpStatus::ErrorInsufficientMemory,
            7 => HdcpStatus::ErrorInternal,
            8 => HdcpStatus::ErrorSrmNotRecent,
            9 => HdcpStatus::ErrorSrmFileStorage,
            10 => HdcpStatus::ErrorMaxDevicesExceeded,
            11 => HdcpStatus::ErrorMaxDepthExceeded,
            12 => HdcpStatus::ErrorMsgTransaction,
            other => HdcpStatus::Unknown(other),
        }
    }

    /// Raw driver status code.
    pub fn code(self) -> u32 {
        match self {
            HdcpStatus::Successful => 0,
            HdcpStatus::ErrorAlreadyCreated => 1,
            HdcpStatus::ErrorInvalidParameter => 2,
            HdcpStatus::ErrorNoDisplay => 3,
            HdcpStatus::ErrorRevokedDevice => 4,
            HdcpStatus::ErrorSrmInvalid => 5,
            HdcpStatus::ErrorInsufficientMemory => 6,
            HdcpStatus::ErrorInternal => 7,
            HdcpStatus::ErrorSrmNotRecent => 8,
            HdcpStatus::ErrorSrmFileStorage => 9,
            HdcpStatus::ErrorMaxDevicesExceeded => 10,
            HdcpStatus::ErrorMaxDepthExceeded => 11,
            HdcpStatus::ErrorMsgTransaction => 12,
            HdcpStatus::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == HdcpStatus::Successful
    }

    /// Turn a raw code into `Ok(())` on success and `Err(status)` otherwise.
    pub fn check(code: u32) -> std::result::Result<(), HdcpStatus> {
        let status = HdcpStatus::from_raw(code);
        if status.is_success() {
            Ok(())
        } else {
            Err(status)
        }
    }

    /// Process exit code for this status.
    ///
    /// Codes that do not fit in a byte collapse to the internal error code.
    pub fn exit_code(self) -> u8 {
        u8::try_from(self.code()).unwrap_or(HdcpStatus::ErrorInternal.code() as u8)
    }
}

impl fmt::Display for HdcpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Drivers report plain numbers; keep them visible next to the name.
        match self {
            HdcpStatus::Unknown(code) => write!(f, "unknown status {}", code),
            status => write!(f, "{:?} ({})", status, status.code()),
        }
    }
}

/// Requested HDCP protection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HdcpLevel {
    /// HDCP disabled.
    Level0 = 0,
    /// HDCP with the highest version the port supports.
    Level1 = 1,
    /// HDCP 2.2 with type 1 stream restriction.
    Level2 = 2,
}

impl HdcpLevel {
    pub fn is_enabled(self) -> bool {
        self != HdcpLevel::Level0
    }
}

impl From<HdcpLevel> for u32 {
    fn from(level: HdcpLevel) -> Self {
        level as u32
    }
}

bitflags::bitflags! {
    /// Port status bitmask reported by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PortStatus: u32 {
        const CONNECTED = 0x1;
        const HDCP_TYPE0_ENABLED = 0x2;
        const HDCP_TYPE1_ENABLED = 0x4;
        const REPEATER_ATTACHED = 0x8;
    }
}

impl PortStatus {
    /// Nothing attached to the port.
    pub const DISCONNECTED: Self = Self::empty();
    /// Connected with HDCP type 0 protection on.
    pub const TYPE0_ENABLE: Self = Self::CONNECTED.union(Self::HDCP_TYPE0_ENABLED);
    /// Connected with HDCP type 1 protection on.
    pub const TYPE1_ENABLE: Self = Self::CONNECTED.union(Self::HDCP_TYPE1_ENABLED);

    /// Human readable label; only exact matches of the known states have one.
    pub fn label(self) -> &'static str {
        STATUS_LABELS
            .iter()
            .find(|(status, _)| *status == self)
            .map(|(_, label)| *label)
            .unwrap_or("UNKNOWN")
    }

    pub fn is_connected(self) -> bool {
        self.contains(Self::CONNECTED)
    }

    pub fn has_repeater(self) -> bool {
        self.contains(Self::REPEATER_ATTACHED)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const STATUS_LABELS: [(PortStatus, &str); 5] = [
    (PortStatus::CONNECTED, "Disabled/Connected"),
    (PortStatus::TYPE0_ENABLE, "Type0Enabled"),
    (PortStatus::TYPE1_ENABLE, "Type1Enabled"),
    (PortStatus::REPEATER_ATTACHED, "RepeaterAttached"),
    (PortStatus::DISCONNECTED, "Invalid/Disconnected"),
];

/// Asynchronous port event delivered through the status change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PortEvent {
    None = 0,
    PlugIn = 1,
    PlugOut = 2,
    LinkLost = 3,
}

impl PortEvent {
    /// Decode a raw event; unknown values read as [`PortEvent::None`].
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => PortEvent::PlugIn,
            2 => PortEvent::PlugOut,
            3 => PortEvent::LinkLost,
            _ => PortEvent::None,
        }
    }
}
