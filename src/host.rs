//! Host emulator bridge.
//!
//! The host registers a logging thunk and four GPIO thunks once at startup
//! (see [`crate::ffi`] for the attach entry points). Everything the core
//! wants from the outside world flows through those callbacks: [`HostGpio`]
//! implements [`GpioBridge`] over them, and a [`log::Log`] sink forwards
//! every log record to the host logger.
//!
//! All callbacks degrade safely while unattached: GPIO writes are dropped,
//! reads return 0 and log records vanish.

use std::ffi::{CString, c_char};
use std::sync::{Mutex, PoisonError};

use crate::gpio::GpioBridge;

pub type LogFn = unsafe extern "C" fn(i32, *const c_char);
pub type GpioWriteFn = unsafe extern "C" fn(u32, u32);
pub type GpioReadPinFn = unsafe extern "C" fn(u32) -> i32;
pub type GpioReadBitmapFn = unsafe extern "C" fn() -> u32;

#[derive(Clone, Copy)]
struct HostCallbacks {
    log_as_cpu: Option<LogFn>,
    set_pin_bitset: Option<GpioWriteFn>,
    set_pindir_bitset: Option<GpioWriteFn>,
    get_pin_state: Option<GpioReadPinFn>,
    get_pin_bitmap: Option<GpioReadBitmapFn>,
}

static CALLBACKS: Mutex<HostCallbacks> = Mutex::new(HostCallbacks {
    log_as_cpu: None,
    set_pin_bitset: None,
    set_pindir_bitset: None,
    get_pin_state: None,
    get_pin_bitmap: None,
});

fn callbacks() -> HostCallbacks {
    *CALLBACKS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn with_callbacks(update: impl FnOnce(&mut HostCallbacks)) {
    update(&mut CALLBACKS.lock().unwrap_or_else(PoisonError::into_inner));
}

pub(crate) fn attach_log(callback: LogFn) {
    with_callbacks(|cb| cb.log_as_cpu = Some(callback));
    install_logger();
}

pub(crate) fn attach_set_pin_bitset(callback: GpioWriteFn) {
    with_callbacks(|cb| cb.set_pin_bitset = Some(callback));
}

pub(crate) fn attach_set_pindir_bitset(callback: GpioWriteFn) {
    with_callbacks(|cb| cb.set_pindir_bitset = Some(callback));
}

pub(crate) fn attach_get_pin_state(callback: GpioReadPinFn) {
    with_callbacks(|cb| cb.get_pin_state = Some(callback));
}

pub(crate) fn attach_get_pin_bitmap(callback: GpioReadBitmapFn) {
    with_callbacks(|cb| cb.get_pin_bitmap = Some(callback));
}

/// GPIO access routed through the registered host callbacks.
#[derive(Debug, Default)]
pub struct HostGpio;

impl GpioBridge for HostGpio {
    fn set_pin_bitset(&mut self, bitset: u32, bitmap: u32) {
        if let Some(callback) = callbacks().set_pin_bitset {
            unsafe { callback(bitset, bitmap) }
        }
    }

    fn set_pindir_bitset(&mut self, bitset: u32, bitmap: u32) {
        if let Some(callback) = callbacks().set_pindir_bitset {
            unsafe { callback(bitset, bitmap) }
        }
    }

    fn pin_state(&mut self, pin: u32) -> bool {
        match callbacks().get_pin_state {
            Some(callback) => unsafe { callback(pin) != 0 },
            None => false,
        }
    }

    fn pin_bitmap(&mut self) -> u32 {
        match callbacks().get_pin_bitmap {
            Some(callback) => unsafe { callback() },
            None => 0,
        }
    }
}

/// Forwards `log` records to the host logger.
///
/// Host levels: -1 Noisy, 0 Debug, 1 Info, 2 Warning, 3 Error.
struct HostLogger;

static LOGGER: HostLogger = HostLogger;

impl log::Log for HostLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        callbacks().log_as_cpu.is_some()
    }

    fn log(&self, record: &log::Record) {
        let Some(sink) = callbacks().log_as_cpu else {
            return;
        };
        let level = match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 2,
            log::Level::Info => 1,
            log::Level::Debug => 0,
            log::Level::Trace => -1,
        };
        // A message with interior NULs cannot cross the C boundary; drop it
        // rather than panic.
        let Ok(message) = CString::new(record.args().to_string()) else {
            return;
        };
        unsafe { sink(level, message.as_ptr()) }
    }

    fn flush(&self) {}
}

/// Route the `log` macros to the host logger. Safe to call repeatedly;
/// only the first installation wins.
pub(crate) fn install_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}
