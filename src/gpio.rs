//! GPIO capability surface used by the instruction executor.
//!
//! The PIO core never owns pin state. Every pin access goes through
//! [`GpioBridge`], which the embedding side implements: the shipped plug-in
//! routes it to the host emulator callbacks (see [`crate::host`]), tests
//! substitute a recording mock to observe the exact call sequence.

/// Pin access as seen from a state machine.
///
/// `bitmap` parameters select the affected pins; `bitset` carries the new
/// values for the selected pins. Bits outside `bitmap` must be left
/// untouched by implementations.
pub trait GpioBridge {
    /// Drive output values of the pins selected by `bitmap`.
    fn set_pin_bitset(&mut self, bitset: u32, bitmap: u32);

    /// Drive pin directions of the pins selected by `bitmap`.
    fn set_pindir_bitset(&mut self, bitset: u32, bitmap: u32);

    /// Sample a single pin.
    fn pin_state(&mut self, pin: u32) -> bool;

    /// Sample all 32 pins at once.
    fn pin_bitmap(&mut self) -> u32;
}
