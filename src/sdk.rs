//! HDCP SDK shared library backend.
//!
//! The SDK exports a small C API (`HDCPCreate`, `HDCPDestroy`,
//! `HDCPEnumerateDisplay`, `HDCPSetProtectionLevel`, `HDCPGetStatus`). The
//! library is opened at runtime so the crate builds and tests without it.

use std::collections::HashMap;
use std::ffi::{c_void, OsStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use libloading::{Library, Symbol};

use crate::driver::{DriverResult, HdcpDriver, PortEventHandler, SessionHandle};
use crate::error::Result;
use crate::port::{Port, PortList, NUM_PHYSICAL_PORTS_MAX};
use crate::status::{HdcpLevel, HdcpStatus, PortEvent, PortStatus};

/// Library opened when no path is configured.
pub const DEFAULT_LIBRARY: &str = "libhdcpsdk.so";

type Context = *mut c_void;

/// `CallBackFunction` from the SDK headers.
type CallBackFunction = unsafe extern "C" fn(u32, u32, u32, Context);

type HdcpCreateFn = unsafe extern "C" fn(*mut u32, CallBackFunction, Context) -> u32;
type HdcpDestroyFn = unsafe extern "C" fn(u32) -> u32;
type HdcpEnumerateDisplayFn = unsafe extern "C" fn(u32, *mut RawPortList) -> u32;
type HdcpSetProtectionLevelFn = unsafe extern "C" fn(u32, u32, u32) -> u32;
type HdcpGetStatusFn = unsafe extern "C" fn(u32, u32, *mut u32) -> u32;

/// `Port` as laid out by the SDK.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RawPort {
    id: u32,
    status: u32,
}

/// `PortList` as laid out by the SDK.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RawPortList {
    ports: [RawPort; NUM_PHYSICAL_PORTS_MAX],
    port_count: u32,
}

impl From<RawPortList> for PortList {
    fn from(raw: RawPortList) -> Self {
        let ports = raw
            .ports
            .map(|port| Port::new(port.id, PortStatus::from_bits_retain(port.status)));
        PortList::from_raw(ports, raw.port_count)
    }
}

struct SdkApi {
    create: HdcpCreateFn,
    destroy: HdcpDestroyFn,
    enumerate_display: HdcpEnumerateDisplayFn,
    set_protection_level: HdcpSetProtectionLevelFn,
    get_status: HdcpGetStatusFn,
}

impl SdkApi {
    /// Resolve every entry point up front so a partial SDK fails at load.
    fn resolve(library: &Library) -> Result<Self> {
        // SAFETY: the signatures match the SDK's exported C prototypes.
        unsafe {
            let create: Symbol<HdcpCreateFn> = library.get(b"HDCPCreate\0")?;
            let destroy: Symbol<HdcpDestroyFn> = library.get(b"HDCPDestroy\0")?;
            let enumerate_display: Symbol<HdcpEnumerateDisplayFn> =
                library.get(b"HDCPEnumerateDisplay\0")?;
            let set_protection_level: Symbol<HdcpSetProtectionLevelFn> =
                library.get(b"HDCPSetProtectionLevel\0")?;
            let get_status: Symbol<HdcpGetStatusFn> = library.get(b"HDCPGetStatus\0")?;

            Ok(Self {
                create: *create,
                destroy: *destroy,
                enumerate_display: *enumerate_display,
                set_protection_level: *set_protection_level,
                get_status: *get_status,
            })
        }
    }
}

/// Handler registered with the SDK, boxed so its address stays put.
type RegisteredHandler = Box<Arc<dyn PortEventHandler>>;

/// HDCP driver backed by the vendor SDK.
pub struct SdkDriver {
    api: SdkApi,
    handlers: Mutex<HashMap<u32, RegisteredHandler>>,
    // Function pointers in `api` are only valid while this is loaded.
    _library: Library,
}

impl SdkDriver {
    /// Open the SDK from the default library name.
    pub fn load() -> Result<Self> {
        Self::open(DEFAULT_LIBRARY)
    }

    /// Open the SDK from `path`.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading HDCP SDK from {:?}", path);
        // SAFETY: loading runs the library's initialisers; the SDK has no
        // requirements beyond being loaded once per process.
        let library = unsafe { Library::new(path)? };
        let api = SdkApi::resolve(&library)?;
        Ok(Self::from_parts(library, api))
    }

    fn from_parts(library: Library, api: SdkApi) -> Self {
        Self {
            api,
            handlers: Mutex::new(HashMap::new()),
            _library: library,
        }
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<u32, RegisteredHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HdcpDriver for SdkDriver {
    fn create(&self, handler: Arc<dyn PortEventHandler>) -> DriverResult<SessionHandle> {
        let registered: RegisteredHandler = Box::new(handler);
        let context = &*registered as *const Arc<dyn PortEventHandler> as Context;
        let mut handle = 0u32;

        // SAFETY: `handle` is a valid out pointer and `context` points into a
        // box that is kept in `handlers` until the session is destroyed.
        let code = unsafe { (self.api.create)(&mut handle, status_change, context) };
        HdcpStatus::check(code)?;

        self.handlers().insert(handle, registered);
        Ok(SessionHandle(handle))
    }

    fn destroy(&self, handle: SessionHandle) -> DriverResult<()> {
        // SAFETY: plain value call.
        let code = unsafe { (self.api.destroy)(handle.raw()) };
        let registered = self.handlers().remove(&handle.raw());
        match HdcpStatus::check(code) {
            // The driver stops calling back once destroy succeeds.
            Ok(()) => Ok(()),
            Err(status) => {
                // The session may still be live and holding the context.
                if let Some(registered) = registered {
                    warn!("Leaking event handler of undestroyed session {}", handle);
                    std::mem::forget(registered);
                }
                Err(status)
            }
        }
    }

    fn enumerate_display(&self, handle: SessionHandle) -> DriverResult<PortList> {
        let mut raw = RawPortList::default();
        // SAFETY: `raw` matches the SDK's `PortList` layout.
        let code = unsafe { (self.api.enumerate_display)(handle.raw(), &mut raw) };
        HdcpStatus::check(code)?;
        Ok(raw.into())
    }

    fn set_protection_level(
        &self,
        handle: SessionHandle,
        port_id: u32,
        level: HdcpLevel,
    ) -> DriverResult<()> {
        // SAFETY: plain value call.
        let code =
            unsafe { (self.api.set_protection_level)(handle.raw(), port_id, level.into()) };
        HdcpStatus::check(code)
    }

    fn get_status(&self, handle: SessionHandle, port_id: u32) -> DriverResult<PortStatus> {
        let mut status = 0u32;
        // SAFETY: `status` is a valid out pointer.
        let code = unsafe { (self.api.get_status)(handle.raw(), port_id, &mut status) };
        HdcpStatus::check(code)?;
        Ok(PortStatus::from_bits_retain(status))
    }
}

/// Status change trampoline handed to `HDCPCreate`.
unsafe extern "C" fn status_change(handle: u32, port_id: u32, event: u32, context: Context) {
    if context.is_null() {
        error!("hdcp context pointer is null");
        return;
    }

    // SAFETY: non-null contexts are the boxed handlers registered in
    // `SdkDriver::create`, alive until the matching destroy returns.
    let handler = unsafe { &*(context as *const Arc<dyn PortEventHandler>) };
    let delivered = catch_unwind(AssertUnwindSafe(|| {
        handler.on_port_event(SessionHandle(handle), port_id, PortEvent::from_raw(event));
    }));
    if delivered.is_err() {
        error!("Port event handler panicked on port {}", port_id);
    }
}
