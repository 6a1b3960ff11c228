//! C ABI between the host emulator and the PIO core.
//!
//! The host calls the `pio_*_ex` entry points with a block instance id, and
//! registers its thunks once at startup through the
//! `renode_external_attach__*` functions. Every entry point completes
//! synchronously and never unwinds.

// Attach symbol names are dictated by the host-side binding generator.
#![allow(non_snake_case)]

use crate::host::{GpioReadBitmapFn, GpioReadPinFn, GpioWriteFn, LogFn};
use crate::manager;

#[unsafe(no_mangle)]
pub extern "C" fn pio_initialize_ex(id: i32) {
    manager::initialize(id);
}

#[unsafe(no_mangle)]
pub extern "C" fn pio_deinitialize_ex(id: i32) {
    manager::deinitialize(id);
}

#[unsafe(no_mangle)]
pub extern "C" fn pio_reset_ex(id: i32) {
    manager::reset(id);
}

#[unsafe(no_mangle)]
pub extern "C" fn pio_execute_ex(id: i32, number_of_cycles: u32) -> u32 {
    manager::execute(id, number_of_cycles)
}

#[unsafe(no_mangle)]
pub extern "C" fn pio_read_memory_ex(id: i32, address: u32) -> u32 {
    manager::read_memory(id, address)
}

#[unsafe(no_mangle)]
pub extern "C" fn pio_write_memory_ex(id: i32, address: u32, value: u32) {
    manager::write_memory(id, address, value);
}

#[unsafe(no_mangle)]
pub extern "C" fn renode_external_attach__ActionInt32String__LogAsCpu(callback: LogFn) {
    crate::host::attach_log(callback);
}

#[unsafe(no_mangle)]
pub extern "C" fn renode_external_attach__ActionUInt32UInt32__GpioSetPinBitset(
    callback: GpioWriteFn,
) {
    crate::host::attach_set_pin_bitset(callback);
}

#[unsafe(no_mangle)]
pub extern "C" fn renode_external_attach__ActionUInt32UInt32__GpioSetPindirBitset(
    callback: GpioWriteFn,
) {
    crate::host::attach_set_pindir_bitset(callback);
}

#[unsafe(no_mangle)]
pub extern "C" fn renode_external_attach__FuncInt32UInt32__GpioGetPinState(
    callback: GpioReadPinFn,
) {
    crate::host::attach_get_pin_state(callback);
}

#[unsafe(no_mangle)]
pub extern "C" fn renode_external_attach__FuncUInt32__GpioGetPinBitmap(
    callback: GpioReadBitmapFn,
) {
    crate::host::attach_get_pin_bitmap(callback);
}
