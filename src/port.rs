//! Port records and the enumeration snapshot.

use crate::status::PortStatus;

/// Maximum number of physical ports the driver reports.
pub const NUM_PHYSICAL_PORTS_MAX: usize = 5;

/// One physical display port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub id: u32,
    pub status: PortStatus,
}

impl Port {
    pub fn new(id: u32, status: PortStatus) -> Self {
        Self { id, status }
    }

    /// An unused table slot.
    pub const fn empty() -> Self {
        Self {
            id: 0,
            status: PortStatus::DISCONNECTED,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }
}

impl Default for Port {
    fn default() -> Self {
        Self::empty()
    }
}

/// Snapshot of the driver's port table taken by one enumeration call.
///
/// The table has a fixed capacity; `count` is whatever the driver reported
/// and may exceed the capacity, which callers must treat as an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortList {
    ports: [Port; NUM_PHYSICAL_PORTS_MAX],
    count: u32,
}

impl PortList {
    /// Build a snapshot from a raw table and reported count.
    pub fn from_raw(ports: [Port; NUM_PHYSICAL_PORTS_MAX], count: u32) -> Self {
        Self { ports, count }
    }

    /// Build a snapshot from a slice, truncated to the table capacity.
    ///
    /// The reported count is the slice length, so an oversized slice yields a
    /// list that fails [`PortList::exceeds_capacity`].
    pub fn from_ports(ports: &[Port]) -> Self {
        let mut table = [Port::empty(); NUM_PHYSICAL_PORTS_MAX];
        for (slot, port) in table.iter_mut().zip(ports) {
            *slot = *port;
        }
        Self {
            ports: table,
            count: u32::try_from(ports.len()).unwrap_or(u32::MAX),
        }
    }

    /// Port count as reported by the driver.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn exceeds_capacity(&self) -> bool {
        self.count as usize > NUM_PHYSICAL_PORTS_MAX
    }

    /// Valid entries of the table, in enumeration order.
    pub fn ports(&self) -> &[Port] {
        let len = (self.count as usize).min(NUM_PHYSICAL_PORTS_MAX);
        &self.ports[..len]
    }

    /// Connected ports, in enumeration order.
    pub fn connected(&self) -> impl Iterator<Item = &Port> + '_ {
        self.ports().iter().filter(|port| port.is_connected())
    }
}
