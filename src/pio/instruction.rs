//! PIO instruction word decoding.
//!
//! Every instruction is 16 bits: a 3-bit opcode, a 5-bit field shared
//! between delay and side-set (split according to `PINCTRL.SIDESET_COUNT`),
//! and an 8-bit immediate whose layout depends on the opcode.

use arbitrary_int::{u2, u3, u5};

#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum Opcode {
    Jmp = 0x0,
    Wait = 0x1,
    In = 0x2,
    Out = 0x3,
    PushPull = 0x4,
    Mov = 0x5,
    Irq = 0x6,
    Set = 0x7,
}

/// JMP condition codes (immediate bits 7:5).
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum JmpCondition {
    Always = 0,
    XZero = 1,
    /// Jump while X is non-zero, decrementing it afterwards.
    XNonZeroPostDec = 2,
    YZero = 3,
    /// Jump while Y is non-zero, decrementing it afterwards.
    YNonZeroPostDec = 4,
    XNotEqualY = 5,
    Pin = 6,
    OsrNotEmpty = 7,
}

/// WAIT sources (immediate bits 6:5).
#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum WaitSource {
    /// Absolute GPIO index.
    Gpio = 0,
    /// GPIO index relative to `PINCTRL.IN_BASE`.
    Pin = 1,
    Irq = 2,
    Reserved = 3,
}

/// Data sources shared by IN and MOV (immediate bits 7:5 / 2:0).
///
/// `Status` only produces a value for MOV; IN reads it as zero.
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum InSource {
    Pins = 0,
    X = 1,
    Y = 2,
    Null = 3,
    Reserved = 4,
    Status = 5,
    Isr = 6,
    Osr = 7,
}

/// OUT destinations (immediate bits 7:5).
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum OutDestination {
    Pins = 0,
    X = 1,
    Y = 2,
    Null = 3,
    PinDirs = 4,
    Pc = 5,
    Isr = 6,
    Exec = 7,
}

/// MOV destinations (immediate bits 7:5).
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum MovDestination {
    Pins = 0,
    X = 1,
    Y = 2,
    Reserved = 3,
    Exec = 4,
    Pc = 5,
    Isr = 6,
    Osr = 7,
}

/// MOV source transformations (immediate bits 4:3).
#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum MovOperation {
    Copy = 0,
    Invert = 1,
    BitReverse = 2,
    /// Reserved encoding, treated as a plain copy.
    Reserved = 3,
}

/// SET destinations (immediate bits 7:5). Reserved codes are no-ops.
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum SetDestination {
    Pins = 0,
    X = 1,
    Y = 2,
    Reserved3 = 3,
    PinDirs = 4,
    Reserved5 = 5,
    Reserved6 = 6,
    Reserved7 = 7,
}

/// Decoded view of one 16-bit instruction word.
#[bitbybit::bitfield(u16)]
#[derive(Debug)]
pub struct Instruction {
    #[bits(13..=15, r)]
    opcode: Opcode,
    #[bits(8..=12, r)]
    delay_or_sideset: u5,
    #[bits(0..=7, r)]
    immediate: u8,
}

impl Instruction {
    pub fn decode(word: u16) -> Self {
        Self::new_with_raw_value(word)
    }
}

#[inline]
pub(crate) fn jmp_condition(immediate: u8) -> JmpCondition {
    JmpCondition::new_with_raw_value(u3::new((immediate >> 5) & 0x7))
}

#[inline]
pub(crate) fn wait_source(immediate: u8) -> WaitSource {
    WaitSource::new_with_raw_value(u2::new((immediate >> 5) & 0x3))
}

#[inline]
pub(crate) fn in_source(immediate: u8) -> InSource {
    InSource::new_with_raw_value(u3::new((immediate >> 5) & 0x7))
}

#[inline]
pub(crate) fn out_destination(immediate: u8) -> OutDestination {
    OutDestination::new_with_raw_value(u3::new((immediate >> 5) & 0x7))
}

#[inline]
pub(crate) fn mov_destination(immediate: u8) -> MovDestination {
    MovDestination::new_with_raw_value(u3::new((immediate >> 5) & 0x7))
}

#[inline]
pub(crate) fn mov_operation(immediate: u8) -> MovOperation {
    MovOperation::new_with_raw_value(u2::new((immediate >> 3) & 0x3))
}

#[inline]
pub(crate) fn mov_source(immediate: u8) -> InSource {
    InSource::new_with_raw_value(u3::new(immediate & 0x7))
}

#[inline]
pub(crate) fn set_destination(immediate: u8) -> SetDestination {
    SetDestination::new_with_raw_value(u3::new((immediate >> 5) & 0x7))
}

/// Bit counts of 0 encode a full 32-bit transfer.
#[inline]
pub(crate) fn fold_bit_count(raw: u8) -> u32 {
    match raw & 0x1f {
        0 => 32,
        count => u32::from(count),
    }
}
