//! Register layout of one PIO block.
//!
//! Each register is a `#[bitbybit::bitfield]` over its 32-bit bus value, so
//! packing and unpacking go through `raw_value()`/`new_with_raw_value()`
//! instead of any compiler-defined bit-field layout. Offsets are relative
//! to the block base; the host addresses registers by these word offsets.

use arbitrary_int::{u3, u4, u5, u6};

/// Block-level control.
pub const CTRL: u32 = 0x000;
/// FIFO status, synthesised from the live FIFOs.
pub const FSTAT: u32 = 0x004;
/// FIFO fill levels, one byte per state machine.
pub const FLEVEL: u32 = 0x00C;
/// TX FIFO write windows, one word per state machine.
pub const TXF0: u32 = 0x010;
/// RX FIFO read windows, one word per state machine.
pub const RXF0: u32 = 0x020;
/// Program memory write window, 32 slots.
pub const INSTR_MEM0: u32 = 0x048;
/// First per-state-machine register of SM0.
pub const SM0_CLKDIV: u32 = 0x0C8;
pub const SM0_EXECCTRL: u32 = 0x0CC;
pub const SM0_SHIFTCTRL: u32 = 0x0D0;
pub const SM0_ADDR: u32 = 0x0D4;
pub const SM0_INSTR: u32 = 0x0D8;
pub const SM0_PINCTRL: u32 = 0x0DC;

/// Byte stride between consecutive state-machine register groups.
pub const SM_STRIDE: u32 = 0x18;
/// Byte stride between consecutive TXF/RXF windows.
pub const FIFO_STRIDE: u32 = 0x4;

/// Relative offsets within one state-machine register group.
pub(crate) const SM_REG_CLKDIV: u32 = 0x00;
pub(crate) const SM_REG_EXECCTRL: u32 = 0x04;
pub(crate) const SM_REG_SHIFTCTRL: u32 = 0x08;
pub(crate) const SM_REG_ADDR: u32 = 0x0C;
pub(crate) const SM_REG_INSTR: u32 = 0x10;
pub(crate) const SM_REG_PINCTRL: u32 = 0x14;

static_assertions::const_assert_eq!(TXF0 + 4 * FIFO_STRIDE, RXF0);
static_assertions::const_assert_eq!(INSTR_MEM0 + 4 * 32, SM0_CLKDIV);
static_assertions::const_assert_eq!(SM0_PINCTRL - SM0_CLKDIV, SM_REG_PINCTRL);
static_assertions::const_assert_eq!(SM_REG_PINCTRL + 4, SM_STRIDE);

/// Block control register. Restart bits read back as written.
#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug)]
pub struct Ctrl {
    #[bits(8..=11, rw)]
    clkdiv_restart: u4,
    #[bits(4..=7, rw)]
    sm_restart: u4,
    #[bits(0..=3, rw)]
    sm_enable: u4,
}

/// FIFO status, one bit per state machine in every field.
#[bitbybit::bitfield(u32, default = 0x0)]
#[derive(Debug)]
pub struct Fstat {
    #[bits(24..=27, rw)]
    tx_empty: u4,
    #[bits(16..=19, rw)]
    tx_full: u4,
    #[bits(8..=11, rw)]
    rx_empty: u4,
    #[bits(0..=3, rw)]
    rx_full: u4,
}

/// Fractional clock divider. An integer part of 0 encodes 65536.
#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct ClkDiv {
    #[bits(16..=31, rw)]
    int: u16,
    #[bits(8..=15, rw)]
    frac: u8,
}

/// Execution control. Bit 31 is a read-only stall flag; writes to it are
/// discarded before the value reaches this view.
#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct ExecCtrl {
    #[bit(31, rw)]
    exec_stalled: bool,
    #[bit(30, rw)]
    side_en: bool,
    #[bit(29, rw)]
    side_pindir: bool,
    #[bits(24..=28, rw)]
    jmp_pin: u5,
    #[bits(19..=23, rw)]
    out_en_sel: u5,
    #[bit(18, rw)]
    inline_out_en: bool,
    #[bit(17, rw)]
    out_sticky: bool,
    #[bits(12..=16, rw)]
    wrap_top: u5,
    #[bits(7..=11, rw)]
    wrap_bottom: u5,
    #[bit(4, rw)]
    status_sel: bool,
    #[bits(0..=3, rw)]
    status_n: u4,
}

/// Shift control. Thresholds encode 32 as 0; the fold happens where the
/// executor consumes them, the packed value round-trips untouched.
#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct ShiftCtrl {
    #[bit(31, rw)]
    fjoin_rx: bool,
    #[bit(30, rw)]
    fjoin_tx: bool,
    #[bits(25..=29, rw)]
    pull_threshold: u5,
    #[bits(20..=24, rw)]
    push_threshold: u5,
    #[bit(19, rw)]
    out_shiftdir: bool,
    #[bit(18, rw)]
    in_shiftdir: bool,
    #[bit(17, rw)]
    autopull: bool,
    #[bit(16, rw)]
    autopush: bool,
}

/// Pin mapping for OUT/SET/side-set/IN groups.
#[bitbybit::bitfield(u32)]
#[derive(Debug)]
pub struct PinCtrl {
    #[bits(29..=31, rw)]
    sideset_count: u3,
    #[bits(26..=28, rw)]
    set_count: u3,
    #[bits(20..=25, rw)]
    out_count: u6,
    #[bits(15..=19, rw)]
    in_base: u5,
    #[bits(10..=14, rw)]
    sideset_base: u5,
    #[bits(5..=9, rw)]
    set_base: u5,
    #[bits(0..=4, rw)]
    out_base: u5,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_round_trips_all_fields() {
        let ctrl = Ctrl::new_with_raw_value(0x0000_0A53);
        assert_eq!(ctrl.sm_enable().value(), 0x3);
        assert_eq!(ctrl.sm_restart().value(), 0x5);
        assert_eq!(ctrl.clkdiv_restart().value(), 0xA);
        assert_eq!(ctrl.raw_value(), 0x0000_0A53);
    }

    #[test]
    fn clkdiv_field_placement() {
        let clkdiv = ClkDiv::new_with_raw_value(0xABCD_EF00);
        assert_eq!(clkdiv.int(), 0xABCD);
        assert_eq!(clkdiv.frac(), 0xEF);
        let rebuilt = ClkDiv::new_with_raw_value(0)
            .with_int(0xABCD)
            .with_frac(0xEF);
        assert_eq!(rebuilt.raw_value(), 0xABCD_EF00);
    }

    #[test]
    fn execctrl_field_placement() {
        let exec = ExecCtrl::new_with_raw_value(0)
            .with_wrap_bottom(u5::new(5))
            .with_wrap_top(u5::new(9))
            .with_jmp_pin(u5::new(17))
            .with_side_en(true);
        assert_eq!(exec.raw_value(), (5 << 7) | (9 << 12) | (17 << 24) | (1 << 30));
        assert!(!exec.exec_stalled());
    }

    #[test]
    fn shiftctrl_threshold_encoding_is_raw() {
        let shift = ShiftCtrl::new_with_raw_value(0);
        assert_eq!(shift.push_threshold().value(), 0);
        assert_eq!(shift.pull_threshold().value(), 0);
        let shift = shift.with_push_threshold(u5::new(8)).with_pull_threshold(u5::new(8));
        assert_eq!(shift.raw_value(), (8 << 20) | (8 << 25));
    }

    #[test]
    fn pinctrl_field_placement() {
        let pins = PinCtrl::new_with_raw_value(0)
            .with_set_base(u5::new(3))
            .with_set_count(u3::new(5))
            .with_sideset_base(u5::new(4))
            .with_sideset_count(u3::new(2))
            .with_out_count(u6::new(32));
        assert_eq!(
            pins.raw_value(),
            (3 << 5) | (5 << 26) | (4 << 10) | (2 << 29) | (32 << 20)
        );
    }

    #[test]
    fn fstat_packs_per_machine_bits() {
        let fstat = Fstat::new_with_raw_value(0)
            .with_tx_empty(u4::new(0b1111))
            .with_rx_empty(u4::new(0b1111));
        assert_eq!(fstat.raw_value(), 0x0F00_0F00);
    }
}
