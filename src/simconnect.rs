//! SimConnect client feeding the [`SimVarCache`].
//!
//! SimConnect.dll is loaded at runtime so the viewer still starts (with a
//! not-ready cache) on machines without the SDK.

use std::ffi::{c_char, c_void, CString};
use std::ptr::addr_of;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use libloading::Library;

use crate::diag::LogBuffer;
use crate::simvar::{SimSnapshot, SimValue, SimVar, SimVarCache, Unit, TITLE};

// -----------------------------
// SimConnect minimal FFI
// -----------------------------
type DWord = u32;
type HRESULT = i32;
type Handle = *mut c_void;
type HWnd = *mut c_void;

#[repr(C)]
struct SimRecv {
    dw_size: DWord,
    dw_version: DWord,
    dw_id: DWord,
}

#[repr(C)]
struct SimRecvSimObjectData {
    base: SimRecv,
    dw_request_id: DWord,
    dw_object_id: DWord,
    dw_define_id: DWord,
    dw_flags: DWord,
    dw_entrynumber: DWord,
    dw_outof: DWord,
    dw_define_count: DWord,
    dw_data: DWord, // payload starts here
}

#[repr(C)]
struct SimRecvEvent {
    base: SimRecv,
    u_group_id: DWord,
    u_event_id: DWord,
    dw_data: DWord,
}

const SIMCONNECT_RECV_ID_QUIT: DWord = 3;
const SIMCONNECT_RECV_ID_EVENT: DWord = 4;
const SIMCONNECT_RECV_ID_SIMOBJECT_DATA: DWord = 8;

const SIMCONNECT_PERIOD_ONCE: DWord = 1;
const SIMCONNECT_PERIOD_SIM_FRAME: DWord = 3;

const SIMCONNECT_DATATYPE_FLOAT64: DWord = 4;
const SIMCONNECT_DATATYPE_STRING256: DWord = 9;

const USER_OBJECT_ID: DWord = 0;

const EVT_SIM_START: DWord = 1001;
const EVT_SIM_STOP: DWord = 1002;

const DEF_VARS: DWord = 2001;
const REQ_VARS: DWord = 3001;
const DEF_TITLE: DWord = 2201;
const REQ_TITLE: DWord = 3201;

type PfnSimConnectOpen =
    unsafe extern "system" fn(*mut Handle, *const c_char, HWnd, DWord, Handle, DWord) -> HRESULT;
type PfnSimConnectClose = unsafe extern "system" fn(Handle) -> HRESULT;
type PfnSimConnectAddToDataDefinition = unsafe extern "system" fn(
    Handle,
    DWord,
    *const c_char,
    *const c_char,
    DWord,
    f32,
    DWord,
) -> HRESULT;
type PfnSimConnectRequestDataOnSimObject = unsafe extern "system" fn(
    Handle,
    DWord,
    DWord,
    DWord,
    DWord,
    DWord,
    DWord,
    DWord,
    DWord,
) -> HRESULT;
type PfnSimConnectGetNextDispatch =
    unsafe extern "system" fn(Handle, *mut *mut SimRecv, *mut DWord) -> HRESULT;
type PfnSimConnectSubscribeToSystemEvent =
    unsafe extern "system" fn(Handle, DWord, *const c_char) -> HRESULT;

#[inline]
fn hr_hex(hr: HRESULT) -> String {
    format!("0x{:08X}", hr as u32)
}

#[derive(Clone)]
struct SimConnectFns {
    _lib: Arc<Library>,
    open: PfnSimConnectOpen,
    close: PfnSimConnectClose,
    add_to_def: PfnSimConnectAddToDataDefinition,
    req_data: PfnSimConnectRequestDataOnSimObject,
    next_dispatch: PfnSimConnectGetNextDispatch,
    subscribe_event: Option<PfnSimConnectSubscribeToSystemEvent>,
}

fn load_simconnect() -> Result<SimConnectFns> {
    let lib = unsafe {
        Library::new("SimConnect.dll")
            .or_else(|_| Library::new(r"C:\\Windows\\System32\\SimConnect.dll"))
            .context("Load SimConnect.dll failed")?
    };
    unsafe {
        let open: PfnSimConnectOpen = *lib.get(b"SimConnect_Open\0")?;
        let close: PfnSimConnectClose = *lib.get(b"SimConnect_Close\0")?;
        let add_to_def: PfnSimConnectAddToDataDefinition =
            *lib.get(b"SimConnect_AddToDataDefinition\0")?;
        let req_data: PfnSimConnectRequestDataOnSimObject =
            *lib.get(b"SimConnect_RequestDataOnSimObject\0")?;
        let next_dispatch: PfnSimConnectGetNextDispatch =
            *lib.get(b"SimConnect_GetNextDispatch\0")?;
        let subscribe_event: Option<PfnSimConnectSubscribeToSystemEvent> = lib
            .get::<PfnSimConnectSubscribeToSystemEvent>(b"SimConnect_SubscribeToSystemEvent\0")
            .ok()
            .map(|s| *s);

        Ok(SimConnectFns {
            _lib: Arc::new(lib),
            open,
            close,
            add_to_def,
            req_data,
            next_dispatch,
            subscribe_event,
        })
    }
}

// -----------------------------
// Session
// -----------------------------

/// An open SimConnect handle; closed on drop.
struct Session<'a> {
    fns: &'a SimConnectFns,
    h: Handle,
}

impl<'a> Session<'a> {
    fn open(fns: &'a SimConnectFns, client_name: &str) -> Result<Self> {
        let name = CString::new(client_name).context("client name contains NUL")?;
        let mut h: Handle = std::ptr::null_mut();
        let hr = unsafe {
            (fns.open)(
                &mut h,
                name.as_ptr(),
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                0xFFFF_FFFF,
            )
        };
        if hr < 0 || h.is_null() {
            bail!("Open failed {}", hr_hex(hr));
        }
        Ok(Self { fns, h })
    }

    fn subscribe(&self, id: DWord, event: &str) -> Result<()> {
        let Some(sub) = self.fns.subscribe_event else {
            return Ok(());
        };
        let ev = CString::new(event)?;
        let hr = unsafe { sub(self.h, id, ev.as_ptr()) };
        if hr < 0 {
            bail!("subscribe {} FAILED {}", event, hr_hex(hr));
        }
        Ok(())
    }

    fn add(&self, def_id: DWord, name: &str, unit: &str, datatype: DWord) -> Result<()> {
        let n = CString::new(name)?;
        let u = CString::new(unit)?;
        let hr = unsafe {
            (self.fns.add_to_def)(
                self.h,
                def_id,
                n.as_ptr(),
                u.as_ptr(),
                datatype,
                0.0,
                0xFFFF_FFFF,
            )
        };
        if hr < 0 {
            bail!("AddToDef {:?} [{}] FAILED {}", name, unit, hr_hex(hr));
        }
        Ok(())
    }

    fn request(&self, req_id: DWord, def_id: DWord, period: DWord) {
        unsafe {
            let _ = (self.fns.req_data)(self.h, req_id, def_id, USER_OBJECT_ID, period, 0, 0, 0, 0);
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        unsafe {
            let _ = (self.fns.close)(self.h);
        }
    }
}

// -----------------------------
// Data definitions
// -----------------------------

/// SimConnect element type a variable is registered with.
fn datatype(unit: Unit) -> DWord {
    if unit.is_numeric() {
        SIMCONNECT_DATATYPE_FLOAT64
    } else {
        SIMCONNECT_DATATYPE_STRING256
    }
}

/// Registers every numeric variable with `add` and returns the ones that made
/// it into the definition, in payload order.
fn register_numeric<'v>(
    vars: &'v [SimVar],
    logs: &LogBuffer,
    mut add: impl FnMut(&SimVar) -> Result<()>,
) -> Vec<&'v SimVar> {
    vars.iter()
        .filter(|v| v.unit.is_numeric())
        .filter(|v| match add(v) {
            Ok(()) => true,
            Err(e) => {
                logs.push(format!("SimConnect: {e}"));
                false
            }
        })
        .collect()
}

fn publish(snap: &mut SimSnapshot, registered: &[&SimVar], values: Vec<f64>) {
    for (var, v) in registered.iter().zip(values) {
        snap.set_number(var, v);
    }
    snap.set_ready(true);
}

// -----------------------------
// Payload decoding
// -----------------------------

/// Reads `count` values from a data packet, detecting f64 or f32 elements
/// from the payload size.
fn decode_values(payload: &[u8], count: usize) -> Option<Vec<f64>> {
    if count == 0 {
        return None;
    }
    if payload.len() >= count * 8 {
        Some(
            payload
                .chunks_exact(8)
                .take(count)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        )
    } else if payload.len() >= count * 4 {
        Some(
            payload
                .chunks_exact(4)
                .take(count)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
        )
    } else {
        None
    }
}

/// NUL-terminated string from a STRING256 field.
fn decode_string(payload: &[u8]) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    let field = &payload[..payload.len().min(256)];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    Some(String::from_utf8_lossy(&field[..end]).into_owned())
}

// -----------------------------
// Worker
// -----------------------------

#[derive(Debug)]
pub enum SimCmd {
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Connected,
    Disconnected,
}

enum SessionEnd {
    Quit,
    Shutdown,
}

pub struct SimWorker {
    pub vars: Vec<SimVar>,
    pub cache: SimVarCache,
    pub events: Sender<SimEvent>,
    pub cmds: Receiver<SimCmd>,
    pub logs: LogBuffer,
    pub client_name: String,
    pub reconnect_delay: Duration,
}

impl SimWorker {
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self) {
        self.logs.push("SimConnect: worker started");
        let fns = match load_simconnect() {
            Ok(f) => f,
            Err(e) => {
                self.logs.push(format!("SimConnect: {e:#}"));
                return;
            }
        };

        loop {
            match self.session(&fns) {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Quit) => self.logs.push("SimConnect: simulator quit"),
                Err(e) => self.logs.push(format!("SimConnect: {e:#}")),
            }
            self.cache.with_mut(|s| s.clear());
            let _ = self.events.send(SimEvent::Disconnected);

            match self.cmds.recv_timeout(self.reconnect_delay) {
                Ok(SimCmd::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.logs.push("SimConnect: worker stopped");
    }

    fn session(&self, fns: &SimConnectFns) -> Result<SessionEnd> {
        let session = Session::open(fns, &self.client_name)?;
        let _ = self.events.send(SimEvent::Connected);
        self.logs.push("SimConnect: connected");

        for (id, ev) in [(EVT_SIM_START, "SimStart"), (EVT_SIM_STOP, "SimStop")] {
            if let Err(e) = session.subscribe(id, ev) {
                self.logs.push(format!("SimConnect: {e}"));
            }
        }

        // order must match the payload layout
        let numeric = register_numeric(&self.vars, &self.logs, |var| {
            session.add(DEF_VARS, &var.key(), var.unit.as_str(), datatype(var.unit))
        });
        if let Err(e) = session.add(
            DEF_TITLE,
            &TITLE.key(),
            TITLE.unit.as_str(),
            datatype(TITLE.unit),
        ) {
            self.logs.push(format!("SimConnect: {e}"));
        }

        session.request(REQ_TITLE, DEF_TITLE, SIMCONNECT_PERIOD_ONCE);
        session.request(REQ_VARS, DEF_VARS, SIMCONNECT_PERIOD_SIM_FRAME);

        let mut data_seen = false;
        let mut last_data_rx = Instant::now();

        loop {
            match self.cmds.try_recv() {
                Ok(SimCmd::Shutdown) | Err(TryRecvError::Disconnected) => {
                    return Ok(SessionEnd::Shutdown)
                }
                Err(TryRecvError::Empty) => {}
            }

            let mut p_recv: *mut SimRecv = std::ptr::null_mut();
            let mut cb: DWord = 0;
            let hr = unsafe { (fns.next_dispatch)(session.h, &mut p_recv, &mut cb) };

            if hr >= 0 && !p_recv.is_null() && cb as usize >= std::mem::size_of::<SimRecv>() {
                let id = unsafe { (*p_recv).dw_id };
                match id {
                    SIMCONNECT_RECV_ID_QUIT => return Ok(SessionEnd::Quit),
                    SIMCONNECT_RECV_ID_EVENT => {
                        let ev = unsafe { &*(p_recv as *const SimRecvEvent) };
                        match ev.u_event_id {
                            EVT_SIM_START => {
                                session.request(REQ_TITLE, DEF_TITLE, SIMCONNECT_PERIOD_ONCE)
                            }
                            EVT_SIM_STOP => self.cache.with_mut(|s| s.set_ready(false)),
                            _ => {}
                        }
                    }
                    SIMCONNECT_RECV_ID_SIMOBJECT_DATA => {
                        let (request_id, count, payload) = unsafe {
                            let sod = &*(p_recv as *const SimRecvSimObjectData);
                            let data_ptr = addr_of!(sod.dw_data) as *const u8;
                            let header_bytes =
                                (data_ptr as usize).saturating_sub(p_recv as usize);
                            let payload_len = (cb as usize).saturating_sub(header_bytes);
                            (
                                sod.dw_request_id,
                                sod.dw_define_count as usize,
                                std::slice::from_raw_parts(data_ptr, payload_len),
                            )
                        };

                        if request_id == REQ_TITLE {
                            if let Some(title) = decode_string(payload) {
                                self.logs.push(format!("SimConnect: aircraft {title:?}"));
                                self.cache.with_mut(|s| s.set(&TITLE, SimValue::Str(title)));
                            }
                        } else if request_id == REQ_VARS {
                            data_seen = true;
                            last_data_rx = Instant::now();
                            if let Some(values) = decode_values(payload, count) {
                                self.cache.with_mut(|s| publish(s, &numeric, values));
                            }
                        }
                    }
                    _ => {}
                }
            } else {
                // No message available; gentle idle sleep
                thread::sleep(Duration::from_millis(10));
            }

            // Watchdog: re-request data if it stopped arriving
            let timeout = if data_seen {
                Duration::from_millis(2500)
            } else {
                Duration::from_millis(800)
            };
            if last_data_rx.elapsed() >= timeout {
                session.request(REQ_VARS, DEF_VARS, SIMCONNECT_PERIOD_SIM_FRAME);
                last_data_rx = Instant::now();
            }
        }
    }
}
