//! Emulation core for the RP2040 Programmable I/O (PIO) block.
//!
//! A PIO block is a deterministic four-lane state-machine engine: each
//! machine executes 16-bit instructions out of a shared 32-slot program
//! memory, shifts data between its FIFOs and shift registers, drives GPIO
//! pins and signals through a shared eight-flag IRQ bank. This crate
//! models one or more such blocks for a full-system emulator host.
//!
//! The host sees three surfaces:
//!
//! - the memory-mapped register window of each block
//!   ([`pio::PioBlock::read`]/[`pio::PioBlock::write`], offsets in
//!   [`pio::regs`]),
//! - the cycle driver [`pio::PioBlock::execute`],
//! - the C ABI in [`ffi`], which adds per-id instance management
//!   ([`manager`]) and callback-based GPIO/logging ([`host`]).
//!
//! Pin I/O is abstracted behind [`gpio::GpioBridge`], so the core can run
//! against the host callbacks or against a test double.

pub mod ffi;
pub mod gpio;
pub mod host;
pub mod manager;
pub mod pio;

pub use gpio::GpioBridge;
pub use pio::PioBlock;
