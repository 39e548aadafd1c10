//! End-to-end HDCP exercise.
//!
//! [`TestRunner`] walks one session through create, enumerate, enable,
//! verify, disable, verify and destroy. Any failing step skips straight to
//! cleanup, and the session is destroyed on every path once it exists.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::driver::{HdcpDriver, LoggingEventHandler, PortEventHandler, SessionHandle};
use crate::error::{Error, Result};
use crate::port::{PortList, NUM_PHYSICAL_PORTS_MAX};
use crate::status::{HdcpLevel, HdcpStatus, PortStatus};

/// Which protection level the run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// HDCP with the highest version the port supports.
    Hdcp,
    /// HDCP 2.2 with the type 1 stream restriction.
    HdcpType1,
}

impl TestMode {
    /// Level requested when enabling protection.
    pub fn level(self) -> HdcpLevel {
        match self {
            TestMode::Hdcp => HdcpLevel::Level1,
            TestMode::HdcpType1 => HdcpLevel::Level2,
        }
    }

    /// Status every connected port should report once protection is on.
    pub fn expected_status(self) -> PortStatus {
        match self {
            TestMode::Hdcp => PortStatus::TYPE0_ENABLE,
            TestMode::HdcpType1 => PortStatus::TYPE1_ENABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::Hdcp => "hdcp",
            TestMode::HdcpType1 => "hdcptype1",
        }
    }
}

impl FromStr for TestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hdcp" => Ok(TestMode::Hdcp),
            "hdcptype1" => Ok(TestMode::HdcpType1),
            _ => Err(Error::InvalidTestMode(s.to_string())),
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a runner is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Created,
    Enumerated,
    LevelSet,
    Verified,
    Destroyed,
}

/// Result of a full run.
#[derive(Debug)]
pub enum Outcome {
    Passed,
    /// Nothing to test; not a failure.
    NoDisplay,
    Failed(Error),
}

impl Outcome {
    /// Driver status the run ends with.
    pub fn status(&self) -> HdcpStatus {
        match self {
            Outcome::Passed => HdcpStatus::Successful,
            Outcome::NoDisplay => HdcpStatus::ErrorNoDisplay,
            Outcome::Failed(err) => err.status(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.status().exit_code()
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

/// Drives one HDCP session against a driver.
pub struct TestRunner<D: HdcpDriver> {
    driver: D,
    handler: Arc<dyn PortEventHandler>,
    handle: Option<SessionHandle>,
    ports: PortList,
    state: SessionState,
}

impl<D: HdcpDriver> TestRunner<D> {
    /// Create a runner that logs port events.
    pub fn new(driver: D) -> Self {
        Self::with_handler(driver, Arc::new(LoggingEventHandler))
    }

    /// Create a runner that registers `handler` for port events.
    pub fn with_handler(driver: D, handler: Arc<dyn PortEventHandler>) -> Self {
        Self {
            driver,
            handler,
            handle: None,
            ports: PortList::default(),
            state: SessionState::Uninitialized,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle
    }

    /// Port snapshot from the last enumeration.
    pub fn ports(&self) -> &PortList {
        &self.ports
    }

    /// Create the HDCP context and register the event handler.
    pub fn create(&mut self) -> Result<()> {
        if let Some(handle) = self.handle {
            return Err(Error::SessionExists(handle.raw()));
        }

        match self.driver.create(Arc::clone(&self.handler)) {
            Ok(handle) => {
                info!("HDCP context creation passed");
                debug!("Session handle {}", handle);
                self.handle = Some(handle);
                self.state = SessionState::Created;
                Ok(())
            }
            Err(status) => {
                error!("HDCP context creation failed (error: {})", status);
                Err(Error::Driver {
                    op: "create HDCP context",
                    status,
                })
            }
        }
    }

    /// Snapshot the port table and report what is connected.
    pub fn enumerate(&mut self) -> Result<()> {
        let handle = self.session()?;
        let ports = self.driver.enumerate_display(handle).map_err(|status| {
            error!("Failed to enumerate display (error {})", status);
            Error::Driver {
                op: "enumerate display",
                status,
            }
        })?;

        if ports.exceeds_capacity() {
            error!("Port count is larger than max number of ports");
            return Err(Error::TooManyPorts {
                count: ports.count(),
                max: NUM_PHYSICAL_PORTS_MAX,
            });
        }
        if ports.is_empty() {
            warn!("No external display connected, please connect it!");
            return Err(Error::NoDisplay);
        }

        for port in ports.connected() {
            let kind = if port.status.has_repeater() {
                "repeater"
            } else {
                "receiver"
            };
            info!("Display through port {} is connected as a {}!", port.id, kind);
        }

        self.ports = ports;
        self.state = SessionState::Enumerated;
        Ok(())
    }

    /// Request `level` on every connected port, stopping at the first failure.
    pub fn set_level(&mut self, level: HdcpLevel) -> Result<()> {
        let handle = self.session()?;
        let action = if level.is_enabled() {
            "enable HDCP"
        } else {
            "disable HDCP"
        };

        let mut attempted = false;
        for port in self.ports.connected() {
            attempted = true;
            if let Err(status) = self.driver.set_protection_level(handle, port.id, level) {
                error!("Failed to {} (error = {}) on port {}", action, status, port.id);
                return Err(Error::SetLevel {
                    port: port.id,
                    level,
                    status,
                });
            }
        }
        if !attempted {
            error!("Failed to {}: no connected port", action);
            return Err(Error::NoConnectedPort);
        }

        info!("Succeed to {}", action);
        self.state = SessionState::LevelSet;
        Ok(())
    }

    /// Check that every connected port reports exactly `expected`.
    pub fn get_status(&mut self, expected: PortStatus) -> Result<()> {
        let handle = self.session()?;

        let mut checked = false;
        for port in self.ports.connected() {
            checked = true;
            let observed = self.driver.get_status(handle, port.id).map_err(|status| {
                error!("Port {}: failed to get status (error: {})", port.id, status);
                Error::QueryStatus {
                    port: port.id,
                    status,
                }
            })?;

            if observed != expected {
                error!(
                    "Port {}: status {} is not expected ({})",
                    port.id, observed, expected
                );
                return Err(Error::StatusMismatch {
                    port: port.id,
                    observed,
                    expected,
                });
            }
            info!("Port {}: status {} is expected", port.id, observed);
        }
        if !checked {
            return Err(Error::NoConnectedPort);
        }

        self.state = SessionState::Verified;
        Ok(())
    }

    /// Release the HDCP context.
    ///
    /// The handle is given up even when the driver reports an error, so a
    /// session is never destroyed twice. Without a session this is a no-op.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.state = SessionState::Destroyed;

        match self.driver.destroy(handle) {
            Ok(()) => {
                debug!("Destroyed HDCP session {}", handle);
                Ok(())
            }
            Err(status) => {
                error!("Failed to destroy HDCP context (error {})", status);
                Err(Error::Driver {
                    op: "destroy HDCP context",
                    status,
                })
            }
        }
    }

    /// Run the whole exercise for `mode` and report how it ended.
    pub fn run(&mut self, mode: TestMode) -> Outcome {
        if let Err(err) = self.create() {
            error!("Please ensure hdcp service launched before test");
            error!("HDCP {} test failed!", mode);
            return Outcome::Failed(err);
        }

        let result = self.exercise(mode);
        // Cleanup failures are reported but do not decide the outcome.
        let _ = self.destroy();

        let outcome = match result {
            Ok(()) => Outcome::Passed,
            Err(Error::NoDisplay) => Outcome::NoDisplay,
            Err(err) => Outcome::Failed(err),
        };
        match &outcome {
            Outcome::Passed => info!("HDCP {} test passed!", mode),
            Outcome::Failed(err) => error!("HDCP {} test failed! ({})", mode, err),
            Outcome::NoDisplay => {}
        }
        outcome
    }

    fn exercise(&mut self, mode: TestMode) -> Result<()> {
        self.enumerate()?;
        self.set_level(mode.level())?;
        self.get_status(mode.expected_status())?;
        self.set_level(HdcpLevel::Level0)?;
        self.get_status(PortStatus::CONNECTED)
    }

    fn session(&self) -> Result<SessionHandle> {
        self.handle.ok_or(Error::NoSession)
    }
}

impl<D: HdcpDriver> Drop for TestRunner<D> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{Outcome, SessionState, TestMode, TestRunner};
    use crate::driver::{PortEventHandler, SessionHandle};
    use crate::error::Error;
    use crate::mock::{DriverCall, MockDriver};
    use crate::port::{Port, PortList, NUM_PHYSICAL_PORTS_MAX};
    use crate::status::{HdcpLevel, HdcpStatus, PortEvent, PortStatus};

    fn connected(id: u32) -> Port {
        Port::new(id, PortStatus::CONNECTED)
    }

    fn set_level_calls(driver: &MockDriver) -> Vec<(u32, HdcpLevel)> {
        driver
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::SetProtectionLevel { port_id, level, .. } => Some((port_id, level)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn full_run_passes_for_both_modes() {
        for mode in [TestMode::Hdcp, TestMode::HdcpType1] {
            let driver = MockDriver::new().with_ports(&[connected(1), connected(2)]);
            let mut runner = TestRunner::new(&driver);

            let outcome = runner.run(mode);

            assert!(outcome.is_passed(), "{:?}", outcome);
            assert_eq!(outcome.exit_code(), 0);
            assert_eq!(runner.state(), SessionState::Destroyed);
            assert_eq!(driver.destroy_count(), 1);
            assert_eq!(
                set_level_calls(&driver),
                vec![
                    (1, mode.level()),
                    (2, mode.level()),
                    (1, HdcpLevel::Level0),
                    (2, HdcpLevel::Level0),
                ]
            );
        }
    }

    #[test]
    fn driver_call_order_is_fixed() {
        let driver = MockDriver::new().with_ports(&[connected(3)]);
        let mut runner = TestRunner::new(&driver);
        assert!(runner.run(TestMode::Hdcp).is_passed());

        let h = SessionHandle(1);
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Create,
                DriverCall::EnumerateDisplay(h),
                DriverCall::SetProtectionLevel {
                    handle: h,
                    port_id: 3,
                    level: HdcpLevel::Level1,
                },
                DriverCall::GetStatus { handle: h, port_id: 3 },
                DriverCall::SetProtectionLevel {
                    handle: h,
                    port_id: 3,
                    level: HdcpLevel::Level0,
                },
                DriverCall::GetStatus { handle: h, port_id: 3 },
                DriverCall::Destroy(h),
            ]
        );
    }

    #[test]
    fn type1_port_at_level1_passes_step_by_step() {
        let driver = MockDriver::new()
            .with_ports(&[Port::new(1, PortStatus::CONNECTED | PortStatus::HDCP_TYPE1_ENABLED)])
            .report_status_at(1, HdcpLevel::Level1, PortStatus::TYPE1_ENABLE);
        let mut runner = TestRunner::new(&driver);

        runner.create().unwrap();
        runner.enumerate().unwrap();
        assert_eq!(runner.ports().count(), 1);

        runner.set_level(HdcpLevel::Level1).unwrap();
        assert_eq!(runner.state(), SessionState::LevelSet);
        runner.get_status(PortStatus::TYPE1_ENABLE).unwrap();
        assert_eq!(runner.state(), SessionState::Verified);

        runner.set_level(HdcpLevel::Level0).unwrap();
        runner.get_status(PortStatus::CONNECTED).unwrap();
        runner.destroy().unwrap();

        assert_eq!(runner.state(), SessionState::Destroyed);
        assert_eq!(driver.destroy_count(), 1);
    }

    #[test]
    fn oversized_port_count_is_internal_error() {
        for extra in 1..=3usize {
            let ports: Vec<Port> = (0..(NUM_PHYSICAL_PORTS_MAX + extra) as u32)
                .map(connected)
                .collect();
            let driver = MockDriver::new().with_ports(&ports);
            let mut runner = TestRunner::new(&driver);

            runner.create().unwrap();
            let err = runner.enumerate().unwrap_err();
            assert!(matches!(err, Error::TooManyPorts { .. }), "{:?}", err);
            assert_eq!(err.status(), HdcpStatus::ErrorInternal);
        }
    }

    #[test]
    fn no_display_ends_run_without_failure() {
        let driver = MockDriver::new();
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::HdcpType1);

        assert!(matches!(outcome, Outcome::NoDisplay));
        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(driver.destroy_count(), 1);
        assert!(set_level_calls(&driver).is_empty());
    }

    #[test]
    fn set_level_stops_at_first_failing_port() {
        let driver = MockDriver::new()
            .with_ports(&[connected(1), connected(2), connected(3)])
            .fail_set_level(2, HdcpStatus::ErrorMsgTransaction);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::Hdcp);

        match outcome {
            Outcome::Failed(Error::SetLevel { port, status, .. }) => {
                assert_eq!(port, 2);
                assert_eq!(status, HdcpStatus::ErrorMsgTransaction);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            set_level_calls(&driver),
            vec![(1, HdcpLevel::Level1), (2, HdcpLevel::Level1)]
        );
        assert_eq!(driver.destroy_count(), 1);
    }

    #[test]
    fn set_level_skips_disconnected_ports() {
        let driver = MockDriver::new().with_ports(&[
            Port::new(1, PortStatus::DISCONNECTED),
            connected(2),
            Port::new(5, PortStatus::DISCONNECTED),
        ]);
        let mut runner = TestRunner::new(&driver);
        runner.create().unwrap();
        runner.enumerate().unwrap();

        runner.set_level(HdcpLevel::Level2).unwrap();

        assert_eq!(set_level_calls(&driver), vec![(2, HdcpLevel::Level2)]);
    }

    #[test]
    fn status_mismatch_fails_with_both_statuses() {
        let driver = MockDriver::new()
            .with_ports(&[connected(1), connected(4)])
            .report_status(4, PortStatus::CONNECTED);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::HdcpType1);

        match &outcome {
            Outcome::Failed(Error::StatusMismatch {
                port,
                observed,
                expected,
            }) => {
                assert_eq!(*port, 4);
                assert_eq!(observed.label(), "Disabled/Connected");
                assert_eq!(expected.label(), "Type1Enabled");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(outcome.exit_code(), 7);
        // Disable is never attempted after a failed verification.
        assert!(!set_level_calls(&driver).contains(&(1, HdcpLevel::Level0)));
        assert_eq!(driver.destroy_count(), 1);
    }

    #[test]
    fn repeater_port_does_not_match_plain_status() {
        let driver = MockDriver::new()
            .with_ports(&[Port::new(1, PortStatus::CONNECTED | PortStatus::REPEATER_ATTACHED)]);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::Hdcp);

        assert!(matches!(outcome, Outcome::Failed(Error::StatusMismatch { .. })));
    }

    #[test]
    fn status_query_failure_is_internal_error() {
        let driver = MockDriver::new()
            .with_ports(&[connected(1)])
            .fail_get_status(1, HdcpStatus::ErrorInvalidParameter);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::Hdcp);

        assert!(matches!(outcome, Outcome::Failed(Error::QueryStatus { port: 1, .. })));
        assert_eq!(outcome.status(), HdcpStatus::ErrorInternal);
        assert_eq!(driver.destroy_count(), 1);
    }

    #[test]
    fn create_failure_skips_everything() {
        let driver = MockDriver::new()
            .with_ports(&[connected(1)])
            .fail_create(HdcpStatus::ErrorAlreadyCreated);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::Hdcp);

        assert_eq!(outcome.status(), HdcpStatus::ErrorAlreadyCreated);
        assert_eq!(driver.calls(), vec![DriverCall::Create]);
        assert_eq!(runner.state(), SessionState::Uninitialized);
    }

    #[test]
    fn enumerate_failure_is_surfaced_verbatim() {
        let driver = MockDriver::new().fail_enumerate(HdcpStatus::ErrorInsufficientMemory);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::Hdcp);

        assert_eq!(outcome.exit_code(), 6);
        assert_eq!(driver.destroy_count(), 1);
    }

    #[test]
    fn no_connected_port_is_internal_error() {
        let driver = MockDriver::new().with_ports(&[Port::new(7, PortStatus::DISCONNECTED)]);
        let mut runner = TestRunner::new(&driver);

        let outcome = runner.run(TestMode::Hdcp);

        assert!(matches!(outcome, Outcome::Failed(Error::NoConnectedPort)));
        assert_eq!(outcome.exit_code(), 7);
    }

    #[test]
    fn destroy_runs_once_even_when_called_again() {
        let driver = MockDriver::new().with_ports(&[connected(1)]);
        let mut runner = TestRunner::new(&driver);
        runner.create().unwrap();

        runner.destroy().unwrap();
        runner.destroy().unwrap();
        drop(runner);

        assert_eq!(driver.destroy_count(), 1);
        assert_eq!(driver.live_sessions(), 0);
    }

    #[test]
    fn dropping_a_live_runner_destroys_the_session() {
        let driver = MockDriver::new().with_ports(&[connected(1)]);
        {
            let mut runner = TestRunner::new(&driver);
            runner.create().unwrap();
            runner.enumerate().unwrap();
        }
        assert_eq!(driver.destroy_count(), 1);
        assert_eq!(driver.live_sessions(), 0);
    }

    #[test]
    fn steps_without_session_are_rejected() {
        let driver = MockDriver::new().with_ports(&[connected(1)]);
        let mut runner = TestRunner::new(&driver);

        assert!(matches!(runner.enumerate(), Err(Error::NoSession)));
        assert!(matches!(runner.set_level(HdcpLevel::Level1), Err(Error::NoSession)));
        runner.create().unwrap();
        assert!(matches!(runner.create(), Err(Error::SessionExists(1))));
    }

    #[test]
    fn events_reach_registered_handler() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<PortEvent>>);

        impl PortEventHandler for Recorder {
            fn on_port_event(&self, _handle: SessionHandle, _port_id: u32, event: PortEvent) {
                self.0.lock().unwrap().push(event);
            }
        }

        let driver = MockDriver::new().with_ports(&[connected(1)]);
        let recorder = Arc::new(Recorder::default());
        let mut runner = TestRunner::with_handler(&driver, recorder.clone());
        runner.create().unwrap();

        driver.fire_event(1, PortEvent::LinkLost);
        driver.fire_event(1, PortEvent::PlugOut);

        assert_eq!(*recorder.0.lock().unwrap(), vec![PortEvent::LinkLost, PortEvent::PlugOut]);
        assert_eq!(runner.state(), SessionState::Created);
    }

    #[test]
    fn slots_past_reported_count_are_not_touched() {
        let mut table = [Port::empty(); NUM_PHYSICAL_PORTS_MAX];
        table[0] = connected(1);
        table[1] = connected(2);
        let driver = MockDriver::new().with_port_list(PortList::from_raw(table, 1));
        let mut runner = TestRunner::new(&driver);

        assert!(runner.run(TestMode::Hdcp).is_passed());
        assert_eq!(
            set_level_calls(&driver),
            vec![(1, HdcpLevel::Level1), (1, HdcpLevel::Level0)]
        );
    }

    #[test]
    fn test_mode_parses_case_insensitively() {
        assert_eq!("HDCP".parse::<TestMode>().unwrap(), TestMode::Hdcp);
        assert_eq!("HdcpType1".parse::<TestMode>().unwrap(), TestMode::HdcpType1);
        assert!(matches!(
            "hdcp2".parse::<TestMode>(),
            Err(Error::InvalidTestMode(_))
        ));
        assert_eq!(TestMode::HdcpType1.expected_status(), PortStatus::TYPE1_ENABLE);
        assert_eq!(TestMode::Hdcp.level(), HdcpLevel::Level1);
    }
}
