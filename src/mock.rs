//! Scripted in-process HDCP driver.
//!
//! `MockDriver` behaves like a well-mannered driver by default: protection
//! levels set on a connected port show up in its status. Failures and odd
//! statuses are scripted per port, and every call is recorded so tests can
//! check ordering and cleanup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::{DriverResult, HdcpDriver, PortEventHandler, SessionHandle};
use crate::port::{Port, PortList};
use crate::status::{HdcpLevel, HdcpStatus, PortEvent, PortStatus};

/// A driver call as seen by [`MockDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    Create,
    Destroy(SessionHandle),
    EnumerateDisplay(SessionHandle),
    SetProtectionLevel {
        handle: SessionHandle,
        port_id: u32,
        level: HdcpLevel,
    },
    GetStatus {
        handle: SessionHandle,
        port_id: u32,
    },
}

#[derive(Default)]
struct MockState {
    next_handle: u32,
    ports: PortList,
    create_failure: Option<HdcpStatus>,
    enumerate_failure: Option<HdcpStatus>,
    set_level_failures: HashMap<u32, HdcpStatus>,
    get_status_failures: HashMap<u32, HdcpStatus>,
    reported_status: HashMap<u32, PortStatus>,
    level_status: HashMap<(u32, HdcpLevel), PortStatus>,
    levels: HashMap<u32, HdcpLevel>,
    sessions: HashMap<u32, Arc<dyn PortEventHandler>>,
    calls: Vec<DriverCall>,
}

/// In-process HDCP driver with scripted behaviour.
#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// A driver with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `ports` as the enumeration result.
    pub fn with_ports(self, ports: &[Port]) -> Self {
        self.state().ports = PortList::from_ports(ports);
        self
    }

    /// Use a raw port table as the enumeration result.
    pub fn with_port_list(self, ports: PortList) -> Self {
        self.state().ports = ports;
        self
    }

    pub fn fail_create(self, status: HdcpStatus) -> Self {
        self.state().create_failure = Some(status);
        self
    }

    pub fn fail_enumerate(self, status: HdcpStatus) -> Self {
        self.state().enumerate_failure = Some(status);
        self
    }

    pub fn fail_set_level(self, port_id: u32, status: HdcpStatus) -> Self {
        self.state().set_level_failures.insert(port_id, status);
        self
    }

    pub fn fail_get_status(self, port_id: u32, status: HdcpStatus) -> Self {
        self.state().get_status_failures.insert(port_id, status);
        self
    }

    /// Always report `status` for `port_id`, whatever level was set.
    pub fn report_status(self, port_id: u32, status: PortStatus) -> Self {
        self.state().reported_status.insert(port_id, status);
        self
    }

    /// Report `status` for `port_id` while `level` is the active level.
    pub fn report_status_at(self, port_id: u32, level: HdcpLevel, status: PortStatus) -> Self {
        self.state().level_status.insert((port_id, level), status);
        self
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    /// Number of destroy calls received.
    pub fn destroy_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, DriverCall::Destroy(_)))
            .count()
    }

    /// Sessions created and not yet destroyed.
    pub fn live_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Deliver a port event to the handler of every live session.
    pub fn fire_event(&self, port_id: u32, event: PortEvent) {
        let targets: Vec<(u32, Arc<dyn PortEventHandler>)> = self
            .state()
            .sessions
            .iter()
            .map(|(handle, handler)| (*handle, Arc::clone(handler)))
            .collect();
        for (handle, handler) in targets {
            handler.on_port_event(SessionHandle(handle), port_id, event);
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockState {
    fn require_session(&self, handle: SessionHandle) -> DriverResult<()> {
        if self.sessions.contains_key(&handle.raw()) {
            Ok(())
        } else {
            Err(HdcpStatus::ErrorInvalidParameter)
        }
    }

    fn port(&self, port_id: u32) -> DriverResult<Port> {
        self.ports
            .ports()
            .iter()
            .find(|port| port.id == port_id)
            .copied()
            .ok_or(HdcpStatus::ErrorInvalidParameter)
    }
}

impl HdcpDriver for MockDriver {
    fn create(&self, handler: Arc<dyn PortEventHandler>) -> DriverResult<SessionHandle> {
        let mut state = self.state();
        state.calls.push(DriverCall::Create);
        if let Some(status) = state.create_failure {
            return Err(status);
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        state.sessions.insert(handle, handler);
        Ok(SessionHandle(handle))
    }

    fn destroy(&self, handle: SessionHandle) -> DriverResult<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::Destroy(handle));
        if state.sessions.remove(&handle.raw()).is_none() {
            return Err(HdcpStatus::ErrorInvalidParameter);
        }
        Ok(())
    }

    fn enumerate_display(&self, handle: SessionHandle) -> DriverResult<PortList> {
        let mut state = self.state();
        state.calls.push(DriverCall::EnumerateDisplay(handle));
        state.require_session(handle)?;
        if let Some(status) = state.enumerate_failure {
            return Err(status);
        }
        Ok(state.ports.clone())
    }

    fn set_protection_level(
        &self,
        handle: SessionHandle,
        port_id: u32,
        level: HdcpLevel,
    ) -> DriverResult<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::SetProtectionLevel {
            handle,
            port_id,
            level,
        });
        state.require_session(handle)?;
        state.port(port_id)?;
        if let Some(status) = state.set_level_failures.get(&port_id) {
            return Err(*status);
        }
        state.levels.insert(port_id, level);
        Ok(())
    }

    fn get_status(&self, handle: SessionHandle, port_id: u32) -> DriverResult<PortStatus> {
        let mut state = self.state();
        state.calls.push(DriverCall::GetStatus { handle, port_id });
        state.require_session(handle)?;
        let port = state.port(port_id)?;
        if let Some(status) = state.get_status_failures.get(&port_id) {
            return Err(*status);
        }
        if let Some(status) = state.reported_status.get(&port_id) {
            return Ok(*status);
        }

        let level = state.levels.get(&port_id).copied();
        if let Some(status) = level.and_then(|level| state.level_status.get(&(port_id, level))) {
            return Ok(*status);
        }

        let mut status = port.status & (PortStatus::CONNECTED | PortStatus::REPEATER_ATTACHED);
        if status.is_connected() {
            match level {
                Some(HdcpLevel::Level1) => status |= PortStatus::HDCP_TYPE0_ENABLED,
                Some(HdcpLevel::Level2) => status |= PortStatus::HDCP_TYPE1_ENABLED,
                Some(HdcpLevel::Level0) | None => {}
            }
        }
        Ok(status)
    }
}
