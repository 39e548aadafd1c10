//! The HDCP driver interface consumed by the test runner.
//!
//! [`HdcpDriver`] covers the five driver operations the runner needs. The
//! asynchronous status change notification is modelled as a
//! [`PortEventHandler`] the driver calls from its own context.

use std::fmt;
use std::sync::Arc;

use crate::port::PortList;
use crate::status::{HdcpLevel, HdcpStatus, PortEvent, PortStatus};

/// Driver call result; the error is the non-successful driver status.
pub type DriverResult<T> = std::result::Result<T, HdcpStatus>;

/// Opaque identifier of one HDCP context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u32);

impl SessionHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiver of port plug, unplug and link loss notifications.
///
/// Drivers may call this from any thread while other calls are in flight.
pub trait PortEventHandler: Send + Sync {
    fn on_port_event(&self, handle: SessionHandle, port_id: u32, event: PortEvent);
}

/// HDCP driver API.
pub trait HdcpDriver {
    /// Create a context and register `handler` for its port events.
    ///
    /// The driver keeps the handler alive until the context is destroyed.
    fn create(&self, handler: Arc<dyn PortEventHandler>) -> DriverResult<SessionHandle>;

    /// Destroy a context created by [`HdcpDriver::create`].
    fn destroy(&self, handle: SessionHandle) -> DriverResult<()>;

    /// Snapshot the port table.
    fn enumerate_display(&self, handle: SessionHandle) -> DriverResult<PortList>;

    /// Request a protection level on one port.
    fn set_protection_level(
        &self,
        handle: SessionHandle,
        port_id: u32,
        level: HdcpLevel,
    ) -> DriverResult<()>;

    /// Current status of one port.
    fn get_status(&self, handle: SessionHandle, port_id: u32) -> DriverResult<PortStatus>;
}

impl<D: HdcpDriver + ?Sized> HdcpDriver for &D {
    fn create(&self, handler: Arc<dyn PortEventHandler>) -> DriverResult<SessionHandle> {
        (**self).create(handler)
    }

    fn destroy(&self, handle: SessionHandle) -> DriverResult<()> {
        (**self).destroy(handle)
    }

    fn enumerate_display(&self, handle: SessionHandle) -> DriverResult<PortList> {
        (**self).enumerate_display(handle)
    }

    fn set_protection_level(
        &self,
        handle: SessionHandle,
        port_id: u32,
        level: HdcpLevel,
    ) -> DriverResult<()> {
        (**self).set_protection_level(handle, port_id, level)
    }

    fn get_status(&self, handle: SessionHandle, port_id: u32) -> DriverResult<PortStatus> {
        (**self).get_status(handle, port_id)
    }
}

/// Handler that reports every port event as a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

impl PortEventHandler for LoggingEventHandler {
    fn on_port_event(&self, handle: SessionHandle, port_id: u32, event: PortEvent) {
        debug!("Status change on session {}", handle);
        match event {
            PortEvent::PlugIn => info!("Plug in on port {}", port_id),
            PortEvent::PlugOut => info!("Plug out on port {}", port_id),
            PortEvent::LinkLost => warn!("Link lost on port {}", port_id),
            PortEvent::None => info!("No event on port {}", port_id),
        }
    }
}
