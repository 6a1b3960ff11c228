//! One emulated PIO block: four state machines over shared program memory
//! and a shared IRQ flag bank, exposed to the host through a memory-mapped
//! register window.
//!
//! The host drives a block with exactly three verbs: register writes,
//! register reads and [`PioBlock::execute`], which advances all enabled
//! state machines in lockstep by a number of PIO cycles.

use arbitrary_int::u4;
use log::warn;

pub mod fifo;
pub mod instruction;
pub mod regs;
pub mod statemachine;

use crate::gpio::GpioBridge;
use self::statemachine::StateMachine;

/// State machines per block.
pub const NUM_STATE_MACHINES: usize = 4;
/// Shared program memory slots.
pub const PROGRAM_SIZE: usize = 32;
/// Shared IRQ flags per block.
pub const NUM_IRQ_FLAGS: usize = 8;

#[derive(Debug)]
pub struct PioBlock<G: GpioBridge> {
    program: [u16; PROGRAM_SIZE],
    irq_flags: [bool; NUM_IRQ_FLAGS],
    ctrl: regs::Ctrl,
    sm: [StateMachine; NUM_STATE_MACHINES],
    gpio: G,
}

impl<G: GpioBridge> PioBlock<G> {
    pub fn new(gpio: G) -> Self {
        Self {
            program: [0; PROGRAM_SIZE],
            irq_flags: [false; NUM_IRQ_FLAGS],
            ctrl: regs::Ctrl::new_with_raw_value(0),
            sm: std::array::from_fn(StateMachine::new),
            gpio,
        }
    }

    /// Advance every enabled state machine by up to `cycles` cycles.
    ///
    /// Machines step in id order within each cycle, so GPIO and IRQ
    /// updates from a lower-numbered machine are visible to higher ones in
    /// the same cycle. Stalled machines retry their instruction without
    /// advancing. Always reports the full cycle count.
    pub fn execute(&mut self, cycles: u32) -> u32 {
        let Self {
            program,
            irq_flags,
            sm,
            gpio,
            ..
        } = self;
        for _ in 0..cycles {
            for machine in sm.iter_mut() {
                machine.step(program, irq_flags, gpio);
            }
        }
        cycles
    }

    //==============================================================================================
    // Register window
    //==============================================================================================

    pub fn write(&mut self, address: u32, value: u32) {
        match address {
            regs::CTRL => self.write_ctrl(value),
            a if Self::fifo_index(a, regs::TXF0).is_some() => {
                let index = Self::fifo_index(a, regs::TXF0).unwrap_or(0);
                self.sm[index].push_tx(value);
            }
            a if Self::program_slot(a).is_some() => {
                let slot = Self::program_slot(a).unwrap_or(0);
                self.program[slot] = value as u16;
            }
            a if Self::sm_register(a).is_some() => {
                let (index, offset) = Self::sm_register(a).unwrap_or((0, 0));
                self.write_sm_register(index, offset, value);
            }
            _ => warn!("unhandled write at 0x{address:03x}, value 0x{value:08x}"),
        }
    }

    pub fn read(&mut self, address: u32) -> u32 {
        match address {
            regs::CTRL => self.ctrl.raw_value(),
            regs::FSTAT => self.read_fstat(),
            regs::FLEVEL => self.read_flevel(),
            a if Self::fifo_index(a, regs::RXF0).is_some() => {
                let index = Self::fifo_index(a, regs::RXF0).unwrap_or(0);
                self.sm[index].pop_rx()
            }
            a if Self::sm_register(a).is_some() => {
                let (index, offset) = Self::sm_register(a).unwrap_or((0, 0));
                self.read_sm_register(index, offset)
            }
            _ => {
                warn!("unhandled read from 0x{address:03x}");
                0
            }
        }
    }

    /// TXF/RXF window lookup: four word-aligned slots from `base`.
    fn fifo_index(address: u32, base: u32) -> Option<usize> {
        let span = NUM_STATE_MACHINES as u32 * regs::FIFO_STRIDE;
        if !(base..base + span).contains(&address) || address % 4 != 0 {
            return None;
        }
        Some(((address - base) / regs::FIFO_STRIDE) as usize)
    }

    fn program_slot(address: u32) -> Option<usize> {
        let span = PROGRAM_SIZE as u32 * 4;
        if !(regs::INSTR_MEM0..regs::INSTR_MEM0 + span).contains(&address) || address % 4 != 0 {
            return None;
        }
        Some(((address - regs::INSTR_MEM0) / 4) as usize)
    }

    /// Per-machine register lookup: `(machine index, offset within group)`.
    fn sm_register(address: u32) -> Option<(usize, u32)> {
        let span = NUM_STATE_MACHINES as u32 * regs::SM_STRIDE;
        if !(regs::SM0_CLKDIV..regs::SM0_CLKDIV + span).contains(&address) || address % 4 != 0 {
            return None;
        }
        let relative = address - regs::SM0_CLKDIV;
        Some((
            (relative / regs::SM_STRIDE) as usize,
            relative % regs::SM_STRIDE,
        ))
    }

    fn write_sm_register(&mut self, index: usize, offset: u32, value: u32) {
        match offset {
            regs::SM_REG_CLKDIV => self.sm[index].set_clkdiv_raw(value),
            regs::SM_REG_EXECCTRL => self.sm[index].set_exec_ctrl_raw(value),
            regs::SM_REG_SHIFTCTRL => self.sm[index].set_shift_ctrl_raw(value),
            regs::SM_REG_INSTR => {
                let Self {
                    irq_flags,
                    sm,
                    gpio,
                    ..
                } = self;
                sm[index].execute_immediately(value as u16, irq_flags, gpio);
            }
            regs::SM_REG_PINCTRL => self.sm[index].set_pin_ctrl_raw(value),
            _ => warn!(
                "unhandled write to read-only SM{index} register at offset 0x{offset:02x}, value 0x{value:08x}"
            ),
        }
    }

    fn read_sm_register(&self, index: usize, offset: u32) -> u32 {
        match offset {
            regs::SM_REG_CLKDIV => self.sm[index].clkdiv_raw(),
            regs::SM_REG_EXECCTRL => self.sm[index].exec_ctrl_raw(),
            regs::SM_REG_SHIFTCTRL => self.sm[index].shift_ctrl_raw(),
            regs::SM_REG_ADDR => u32::from(self.sm[index].pc()),
            regs::SM_REG_INSTR => u32::from(self.sm[index].current_instruction()),
            regs::SM_REG_PINCTRL => self.sm[index].pin_ctrl_raw(),
            _ => 0,
        }
    }

    fn write_ctrl(&mut self, value: u32) {
        self.ctrl = regs::Ctrl::new_with_raw_value(value & 0xFFF);
        let enable = self.ctrl.sm_enable().value();
        let restart = self.ctrl.sm_restart().value();
        let clkdiv_restart = self.ctrl.clkdiv_restart().value();
        for (index, machine) in self.sm.iter_mut().enumerate() {
            let bit = 1 << index;
            machine.set_enabled(enable & bit != 0);
            if restart & bit != 0 {
                machine.restart();
            }
            if clkdiv_restart & bit != 0 {
                machine.clock_divider_restart();
            }
        }
    }

    fn read_fstat(&self) -> u32 {
        let mut rx_full = 0u8;
        let mut rx_empty = 0u8;
        let mut tx_full = 0u8;
        let mut tx_empty = 0u8;
        for (index, machine) in self.sm.iter().enumerate() {
            let bit = 1 << index;
            rx_full |= if machine.rx().is_full() { bit } else { 0 };
            rx_empty |= if machine.rx().is_empty() { bit } else { 0 };
            tx_full |= if machine.tx().is_full() { bit } else { 0 };
            tx_empty |= if machine.tx().is_empty() { bit } else { 0 };
        }
        regs::Fstat::new_with_raw_value(0)
            .with_rx_full(u4::new(rx_full))
            .with_rx_empty(u4::new(rx_empty))
            .with_tx_full(u4::new(tx_full))
            .with_tx_empty(u4::new(tx_empty))
            .raw_value()
    }

    fn read_flevel(&self) -> u32 {
        let mut level = 0u32;
        for (index, machine) in self.sm.iter().enumerate() {
            let shift = index as u32 * 8;
            level |= ((machine.tx().len() as u32) & 0xF) << shift;
            level |= ((machine.rx().len() as u32) & 0xF) << (shift + 4);
        }
        level
    }

    //==============================================================================================
    // Introspection
    //==============================================================================================

    pub fn state_machine(&self, index: usize) -> &StateMachine {
        &self.sm[index]
    }

    pub fn irq_flags(&self) -> &[bool; NUM_IRQ_FLAGS] {
        &self.irq_flags
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }
}
