//! Single PIO state machine: architectural registers, the per-cycle
//! delay/fetch/decode pipeline and all instruction handlers.
//!
//! A state machine never owns the shared block resources. Program memory,
//! the IRQ flag bank and the GPIO bridge are borrowed from the block for
//! the duration of each call, which keeps the cross-machine visibility
//! rules (machine `i` publishes to machine `j > i` within the same cycle)
//! a direct consequence of the stepping order.

use arbitrary_int::u5;
use log::debug;

use super::fifo::{DEFAULT_DEPTH, Fifo, MAX_DEPTH};
use super::instruction::{
    InSource, Instruction, JmpCondition, MovDestination, MovOperation, Opcode, OutDestination,
    SetDestination, WaitSource, fold_bit_count, in_source, jmp_condition, mov_destination,
    mov_operation, mov_source, out_destination, set_destination, wait_source,
};
use super::regs::{ClkDiv, ExecCtrl, PinCtrl, ShiftCtrl};
use super::{NUM_IRQ_FLAGS, PROGRAM_SIZE};
use crate::gpio::GpioBridge;

/// Program addresses fit in five bits.
const PC_MASK: u8 = 0x1f;

/// Mask of the low `bits` bits, defined for the full 0..=32 range.
#[inline]
fn bit_mask(bits: u32) -> u32 {
    ((1u64 << bits) - 1) as u32
}

/// Rotate `data` left by `base` and keep `count` bits starting at `base`.
/// Pin groups that would wrap past bit 31 are truncated at the top, which
/// is how the bus-facing masks behave.
#[inline]
fn rotate_left_masked(data: u32, base: u32, count: u32) -> u32 {
    let base = base % 32;
    let mask = ((u64::from(bit_mask(count)) << base) & 0xFFFF_FFFF) as u32;
    data.rotate_left(base) & mask
}

/// Rotate `data` right by `base` and keep the low `count` bits.
#[inline]
fn rotate_right_masked(data: u32, base: u32, count: u32) -> u32 {
    data.rotate_right(base % 32) & bit_mask(count)
}

#[derive(Debug)]
pub struct StateMachine {
    id: usize,

    enabled: bool,
    stalled: bool,
    sideset_done: bool,
    ignore_delay: bool,

    pc: u8,
    x: u32,
    y: u32,
    osr: u32,
    isr: u32,
    osr_counter: u32,
    isr_counter: u32,

    delay: u32,
    delay_counter: u32,

    wait_for_irq: Option<usize>,
    /// Instruction latched by OUT EXEC / MOV EXEC, consumed in place of the
    /// next program fetch.
    exec_latch: Option<u16>,
    current_instruction: u16,

    clkdiv: ClkDiv,
    exec_ctrl: ExecCtrl,
    shift_ctrl: ShiftCtrl,
    pin_ctrl: PinCtrl,
    /// Fractional divisor derived from CLKDIV. Reported for diagnostics;
    /// instruction pacing is cycle-counted by the host, never wall-clocked.
    divider: f64,

    tx: Fifo,
    rx: Fifo,
}

impl StateMachine {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            enabled: false,
            stalled: false,
            sideset_done: false,
            ignore_delay: false,
            pc: 0,
            x: 0,
            y: 0,
            osr: 0,
            isr: 0,
            // An empty OSR reads as fully shifted out.
            osr_counter: 32,
            isr_counter: 0,
            delay: 0,
            delay_counter: 0,
            wait_for_irq: None,
            exec_latch: None,
            current_instruction: 0,
            clkdiv: ClkDiv::new_with_raw_value(0).with_int(1),
            exec_ctrl: ExecCtrl::new_with_raw_value(0).with_wrap_top(u5::new(31)),
            shift_ctrl: ShiftCtrl::new_with_raw_value(0)
                .with_in_shiftdir(true)
                .with_out_shiftdir(true),
            pin_ctrl: PinCtrl::new_with_raw_value(0).with_set_count(arbitrary_int::u3::new(5)),
            divider: 1.0,
            tx: Fifo::new(),
            rx: Fifo::new(),
        }
    }

    //==============================================================================================
    // Lifecycle
    //==============================================================================================

    pub fn set_enabled(&mut self, enable: bool) {
        if enable != self.enabled {
            debug!("SM{}: enabled -> {}", self.id, enable);
            self.enabled = enable;
        }
    }

    /// Clear transient execution state. Scratch registers, shift registers,
    /// FIFOs, PC and the program survive a restart.
    pub fn restart(&mut self) {
        self.stalled = false;
        self.sideset_done = false;
        self.ignore_delay = false;
        self.wait_for_irq = None;
        self.exec_latch = None;
        self.osr_counter = 32;
        self.isr_counter = 0;
        self.delay = 0;
        self.delay_counter = 0;
    }

    /// The divisor never gates execution, so there is no phase to rewind;
    /// the hook exists for the CTRL.CLKDIV_RESTART contract.
    pub fn clock_divider_restart(&mut self) {
        log::trace!("SM{}: clock divider restart (divisor {})", self.id, self.divider);
    }

    //==============================================================================================
    // Host-facing register access
    //==============================================================================================

    pub fn clkdiv_raw(&self) -> u32 {
        self.clkdiv.raw_value()
    }

    pub fn set_clkdiv_raw(&mut self, value: u32) {
        self.clkdiv = ClkDiv::new_with_raw_value(value & 0xFFFF_FF00);
        let int = match self.clkdiv.int() {
            0 => 65536.0,
            int => f64::from(int),
        };
        self.divider = int + f64::from(self.clkdiv.frac()) / 256.0;
        debug!("SM{}: clock divisor -> {}", self.id, self.divider);
    }

    pub fn exec_ctrl_raw(&self) -> u32 {
        // Bit 31 reflects the live stall flag.
        self.exec_ctrl.raw_value() | (u32::from(self.stalled) << 31)
    }

    pub fn set_exec_ctrl_raw(&mut self, value: u32) {
        self.exec_ctrl = ExecCtrl::new_with_raw_value(value & 0x7FFF_FFFF);
    }

    pub fn shift_ctrl_raw(&self) -> u32 {
        self.shift_ctrl.raw_value()
    }

    pub fn set_shift_ctrl_raw(&mut self, value: u32) {
        self.shift_ctrl = ShiftCtrl::new_with_raw_value(value & 0xFFFF_0000);
        // FJOIN steals the partner FIFO's storage. RX join wins when both
        // are set; a capacity change discards queued words.
        let (tx_depth, rx_depth) = if self.shift_ctrl.fjoin_rx() {
            (0, MAX_DEPTH)
        } else if self.shift_ctrl.fjoin_tx() {
            (MAX_DEPTH, 0)
        } else {
            (DEFAULT_DEPTH, DEFAULT_DEPTH)
        };
        if self.tx.capacity() != tx_depth {
            self.tx.resize(tx_depth);
        }
        if self.rx.capacity() != rx_depth {
            self.rx.resize(rx_depth);
        }
    }

    pub fn pin_ctrl_raw(&self) -> u32 {
        self.pin_ctrl.raw_value()
    }

    pub fn set_pin_ctrl_raw(&mut self, value: u32) {
        self.pin_ctrl = PinCtrl::new_with_raw_value(value);
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn current_instruction(&self) -> u16 {
        self.current_instruction
    }

    pub fn push_tx(&mut self, data: u32) {
        self.tx.push(data);
    }

    pub fn pop_rx(&mut self) -> u32 {
        self.rx.pop()
    }

    pub fn tx(&self) -> &Fifo {
        &self.tx
    }

    pub fn rx(&self) -> &Fifo {
        &self.rx
    }

    //==============================================================================================
    // Introspection
    //==============================================================================================

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn stalled(&self) -> bool {
        self.stalled
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn osr(&self) -> u32 {
        self.osr
    }

    pub fn isr(&self) -> u32 {
        self.isr
    }

    pub fn osr_counter(&self) -> u32 {
        self.osr_counter
    }

    pub fn isr_counter(&self) -> u32 {
        self.isr_counter
    }

    pub fn divider(&self) -> f64 {
        self.divider
    }

    //==============================================================================================
    // Decoded configuration
    //==============================================================================================

    /// Thresholds are stored with 32 encoded as 0; the executor always sees
    /// the folded value.
    fn push_threshold(&self) -> u32 {
        match self.shift_ctrl.push_threshold().value() {
            0 => 32,
            value => u32::from(value),
        }
    }

    fn pull_threshold(&self) -> u32 {
        match self.shift_ctrl.pull_threshold().value() {
            0 => 32,
            value => u32::from(value),
        }
    }

    fn sideset_count(&self) -> u32 {
        // More than five side-set bits cannot be encoded; clamp so the
        // delay-bit split stays well defined under hostile PINCTRL values.
        u32::from(self.pin_ctrl.sideset_count().value()).min(5)
    }

    fn out_count(&self) -> u32 {
        u32::from(self.pin_ctrl.out_count().value()).min(32)
    }

    fn set_count(&self) -> u32 {
        u32::from(self.pin_ctrl.set_count().value())
    }

    fn wrap_top(&self) -> u8 {
        self.exec_ctrl.wrap_top().value()
    }

    fn wrap_bottom(&self) -> u8 {
        self.exec_ctrl.wrap_bottom().value()
    }

    fn in_base(&self) -> u32 {
        u32::from(self.pin_ctrl.in_base().value())
    }

    //==============================================================================================
    // Cycle engine
    //==============================================================================================

    /// Advance this machine by one PIO cycle.
    pub fn step<G: GpioBridge>(
        &mut self,
        program: &[u16; PROGRAM_SIZE],
        irqs: &mut [bool; NUM_IRQ_FLAGS],
        gpio: &mut G,
    ) {
        if !self.enabled {
            return;
        }

        let retry = self.stalled;
        if retry {
            self.stalled = false;
        } else if self.delay_counter < self.delay {
            self.delay_counter += 1;
            return;
        } else {
            self.delay = 0;
            self.delay_counter = 0;
        }

        let word = if retry {
            self.current_instruction
        } else if let Some(latched) = self.exec_latch.take() {
            latched
        } else {
            program[usize::from(self.pc & PC_MASK)]
        };
        self.current_instruction = word;
        self.run_instruction(word, irqs, gpio);
    }

    /// Run a host-injected instruction (SMx_INSTR write) outside the normal
    /// fetch/delay flow. Side effects land immediately; a stall leaves no
    /// retry state behind and pending delay accounting is untouched.
    pub fn execute_immediately<G: GpioBridge>(
        &mut self,
        word: u16,
        irqs: &mut [bool; NUM_IRQ_FLAGS],
        gpio: &mut G,
    ) {
        let saved_delay = (self.delay, self.delay_counter);
        self.current_instruction = word;
        self.run_instruction(word, irqs, gpio);
        (self.delay, self.delay_counter) = saved_delay;
        self.stalled = false;
        self.sideset_done = false;
        self.ignore_delay = false;
    }

    fn run_instruction<G: GpioBridge>(
        &mut self,
        word: u16,
        irqs: &mut [bool; NUM_IRQ_FLAGS],
        gpio: &mut G,
    ) -> bool {
        let insn = Instruction::decode(word);
        let field = insn.delay_or_sideset().value();
        self.apply_sideset(field, gpio);

        let immediate = insn.immediate();
        let finished = match insn.opcode() {
            Opcode::Jmp => self.exec_jmp(immediate, gpio),
            Opcode::Wait => self.exec_wait(immediate, irqs, gpio),
            Opcode::In => self.exec_in(immediate, gpio),
            Opcode::Out => self.exec_out(immediate, gpio),
            Opcode::PushPull => {
                if immediate & 0x80 == 0 {
                    self.exec_push(immediate)
                } else {
                    self.exec_pull(immediate)
                }
            }
            Opcode::Mov => self.exec_mov(immediate, gpio),
            Opcode::Irq => self.exec_irq(immediate, irqs),
            Opcode::Set => self.exec_set(immediate, gpio),
        };

        if finished {
            if !self.ignore_delay {
                self.schedule_delay(field);
            }
            self.ignore_delay = false;
            self.sideset_done = false;
            self.stalled = false;
        } else {
            self.stalled = true;
        }
        finished
    }

    fn increment_pc(&mut self) {
        if self.pc == self.wrap_top() {
            self.pc = self.wrap_bottom() & PC_MASK;
        } else {
            self.pc = (self.pc + 1) & PC_MASK;
        }
    }

    fn schedule_delay(&mut self, field: u8) {
        let delay = u32::from(field) & bit_mask(5 - self.sideset_count());
        if delay != 0 {
            self.delay = delay;
            self.delay_counter = 0;
        }
    }

    /// Drive the side-set pins once per instruction, including across
    /// stall retries.
    fn apply_sideset<G: GpioBridge>(&mut self, field: u8, gpio: &mut G) {
        if self.sideset_done {
            return;
        }
        self.sideset_done = true;

        let count = self.sideset_count();
        if count == 0 {
            return;
        }
        let delay_bits = 5 - count;
        let sideset_field = u32::from(field) >> delay_bits;

        let effective = if self.exec_ctrl.side_en() {
            // The top field bit gates the write, the rest carry data.
            if field & 0x10 == 0 {
                return;
            }
            count - 1
        } else {
            count
        };
        if effective == 0 {
            return;
        }

        let base = u32::from(self.pin_ctrl.sideset_base().value());
        let bitset = rotate_left_masked(sideset_field & bit_mask(effective), base, effective);
        let bitmap = rotate_left_masked(bit_mask(effective), base, 32);
        if self.exec_ctrl.side_pindir() {
            gpio.set_pindir_bitset(bitset, bitmap);
        } else {
            gpio.set_pin_bitset(bitset, bitmap);
        }
    }

    //==============================================================================================
    // Shift plumbing
    //==============================================================================================

    fn shift_into_isr(&mut self, bits: u32, data: u32) {
        let data = data & bit_mask(bits);
        self.isr = if self.shift_ctrl.in_shiftdir() {
            // Shift right: new data enters at the top.
            ((u64::from(self.isr) >> bits) as u32) | ((u64::from(data) << (32 - bits)) as u32)
        } else {
            ((u64::from(self.isr) << bits) as u32) | data
        };
        self.isr_counter = 32.min(self.isr_counter + bits);
    }

    fn shift_out_of_osr(&mut self, bits: u32) -> u32 {
        let mask = bit_mask(bits);
        let data = if self.shift_ctrl.out_shiftdir() {
            let data = self.osr & mask;
            self.osr = (u64::from(self.osr) >> bits) as u32;
            data
        } else {
            let data = ((u64::from(self.osr) >> (32 - bits)) as u32) & mask;
            self.osr = (u64::from(self.osr) << bits) as u32;
            data
        };
        self.osr_counter = 32.min(self.osr_counter + bits);
        // A refill that lines up with the threshold happens in place; only
        // the refill at instruction entry costs a cycle.
        if self.shift_ctrl.autopull()
            && self.osr_counter >= self.pull_threshold()
            && !self.tx.is_empty()
        {
            self.osr = self.tx.pop();
            self.osr_counter = 0;
        }
        data
    }

    fn push_isr(&mut self) -> bool {
        if self.rx.is_full() {
            return false;
        }
        self.rx.push(self.isr);
        self.isr = 0;
        self.isr_counter = 0;
        true
    }

    /// Map an IRQ index operand onto the shared flag bank, applying the
    /// relative rewrite when bit 4 is set.
    fn irq_index(&self, index: u32) -> usize {
        let id = if index & 0x10 != 0 {
            (self.id as u32 + index) % 4
        } else {
            index
        };
        (id & 0x7) as usize
    }

    fn status_word(&self) -> u32 {
        let level = if self.exec_ctrl.status_sel() {
            self.rx.len()
        } else {
            self.tx.len()
        };
        if level < usize::from(self.exec_ctrl.status_n().value()) {
            u32::MAX
        } else {
            0
        }
    }

    fn input_value<G: GpioBridge>(&mut self, source: InSource, gpio: &mut G) -> u32 {
        match source {
            InSource::Pins => rotate_right_masked(gpio.pin_bitmap(), self.in_base(), 32),
            InSource::X => self.x,
            InSource::Y => self.y,
            InSource::Isr => self.isr,
            InSource::Osr => self.osr,
            InSource::Null | InSource::Reserved | InSource::Status => 0,
        }
    }

    fn write_out_pins<G: GpioBridge>(&mut self, data: u32, directions: bool, gpio: &mut G) {
        let base = u32::from(self.pin_ctrl.out_base().value());
        let count = self.out_count();
        let bitset = rotate_left_masked(data, base, count);
        let bitmap = rotate_left_masked(bit_mask(count), base, 32);
        if directions {
            gpio.set_pindir_bitset(bitset, bitmap);
        } else {
            gpio.set_pin_bitset(bitset, bitmap);
        }
    }

    //==============================================================================================
    // Instruction handlers
    //==============================================================================================

    fn exec_jmp<G: GpioBridge>(&mut self, immediate: u8, gpio: &mut G) -> bool {
        let address = immediate & PC_MASK;
        let take = match jmp_condition(immediate) {
            JmpCondition::Always => true,
            JmpCondition::XZero => self.x == 0,
            JmpCondition::XNonZeroPostDec => {
                let take = self.x != 0;
                if take {
                    self.x -= 1;
                }
                take
            }
            JmpCondition::YZero => self.y == 0,
            JmpCondition::YNonZeroPostDec => {
                let take = self.y != 0;
                if take {
                    self.y -= 1;
                }
                take
            }
            JmpCondition::XNotEqualY => self.x != self.y,
            JmpCondition::Pin => {
                gpio.pin_state(u32::from(self.exec_ctrl.jmp_pin().value()))
            }
            JmpCondition::OsrNotEmpty => self.osr_counter < self.pull_threshold(),
        };
        if take {
            self.pc = address;
        } else {
            self.increment_pc();
        }
        true
    }

    fn exec_wait<G: GpioBridge>(
        &mut self,
        immediate: u8,
        irqs: &mut [bool; NUM_IRQ_FLAGS],
        gpio: &mut G,
    ) -> bool {
        let polarity = immediate & 0x80 != 0;
        let index = u32::from(immediate & 0x1f);
        let met = match wait_source(immediate) {
            WaitSource::Gpio => gpio.pin_state(index % 32) == polarity,
            WaitSource::Pin => gpio.pin_state((index + self.in_base()) % 32) == polarity,
            WaitSource::Irq => {
                // The flag being set is the wake condition either way;
                // polarity 1 additionally consumes it.
                let irq = self.irq_index(index);
                if irqs[irq] {
                    if polarity {
                        irqs[irq] = false;
                    }
                    true
                } else {
                    false
                }
            }
            WaitSource::Reserved => false,
        };
        if met {
            self.increment_pc();
            true
        } else {
            false
        }
    }

    fn exec_in<G: GpioBridge>(&mut self, immediate: u8, gpio: &mut G) -> bool {
        let bits = fold_bit_count(immediate);
        let source = in_source(immediate);
        let data = match source {
            // STATUS is a MOV-only source; IN reads it as zero.
            InSource::Status => 0,
            source => self.input_value(source, gpio),
        };
        self.shift_into_isr(bits, data);

        if self.shift_ctrl.autopush() && self.isr_counter >= self.push_threshold() {
            if !self.push_isr() {
                return false;
            }
        }
        self.increment_pc();
        true
    }

    fn exec_out<G: GpioBridge>(&mut self, immediate: u8, gpio: &mut G) -> bool {
        let bits = fold_bit_count(immediate);

        if self.shift_ctrl.autopull() && self.osr_counter >= self.pull_threshold() {
            if !self.tx.is_empty() {
                // Refilling costs the cycle; the shift happens on retry.
                self.osr = self.tx.pop();
                self.osr_counter = 0;
                return false;
            }
            // Nothing to refill from: keep shifting the stale OSR.
        }

        let data = self.shift_out_of_osr(bits);
        match out_destination(immediate) {
            OutDestination::Pins => self.write_out_pins(data, false, gpio),
            OutDestination::X => self.x = data,
            OutDestination::Y => self.y = data,
            OutDestination::Null => {}
            OutDestination::PinDirs => self.write_out_pins(data, true, gpio),
            OutDestination::Pc => {
                self.pc = (data as u8) & PC_MASK;
                return true;
            }
            OutDestination::Isr => {
                self.isr = data;
                self.isr_counter = bits;
            }
            OutDestination::Exec => {
                self.exec_latch = Some(data as u16);
                self.ignore_delay = true;
                return true;
            }
        }
        self.increment_pc();
        true
    }

    fn exec_push(&mut self, immediate: u8) -> bool {
        let if_full = immediate & 0x40 != 0;
        let block = immediate & 0x20 != 0;

        if if_full && self.isr_counter < self.push_threshold() {
            self.increment_pc();
            return true;
        }
        if self.rx.is_full() {
            if block {
                return false;
            }
            // Non-blocking push against a full FIFO drops the word.
        } else {
            self.push_isr();
        }
        self.increment_pc();
        true
    }

    fn exec_pull(&mut self, immediate: u8) -> bool {
        let if_empty = immediate & 0x40 != 0;
        let block = immediate & 0x20 != 0;

        if if_empty && self.osr_counter < self.pull_threshold() {
            self.increment_pc();
            return true;
        }
        if self.tx.is_empty() {
            if block {
                return false;
            }
            // Documented fallback: a non-blocking pull from an empty FIFO
            // loads X.
            self.osr = self.x;
            self.osr_counter = 0;
        } else {
            self.osr = self.tx.pop();
            self.osr_counter = 0;
        }
        self.increment_pc();
        true
    }

    fn exec_mov<G: GpioBridge>(&mut self, immediate: u8, gpio: &mut G) -> bool {
        let source = mov_source(immediate);
        let mut data = match source {
            InSource::Status => self.status_word(),
            source => self.input_value(source, gpio),
        };
        match mov_operation(immediate) {
            MovOperation::Copy | MovOperation::Reserved => {}
            MovOperation::Invert => data = !data,
            MovOperation::BitReverse => data = data.reverse_bits(),
        }

        match mov_destination(immediate) {
            MovDestination::Pins => self.write_out_pins(data, false, gpio),
            MovDestination::X => self.x = data,
            MovDestination::Y => self.y = data,
            MovDestination::Reserved => {}
            MovDestination::Exec => {
                self.exec_latch = Some(data as u16);
                self.ignore_delay = true;
                return true;
            }
            MovDestination::Pc => {
                self.pc = (data as u8) & PC_MASK;
                return true;
            }
            MovDestination::Isr => {
                self.isr = data;
                self.isr_counter = 0;
            }
            MovDestination::Osr => {
                self.osr = data;
                self.osr_counter = 0;
            }
        }
        self.increment_pc();
        true
    }

    fn exec_irq(&mut self, immediate: u8, irqs: &mut [bool; NUM_IRQ_FLAGS]) -> bool {
        if let Some(irq) = self.wait_for_irq {
            if irqs[irq] {
                return false;
            }
            self.wait_for_irq = None;
            self.increment_pc();
            return true;
        }

        let clear = immediate & 0x40 != 0;
        let wait = immediate & 0x20 != 0;
        let irq = self.irq_index(u32::from(immediate & 0x1f));

        if clear {
            irqs[irq] = false;
            self.increment_pc();
            return true;
        }
        irqs[irq] = true;
        if wait {
            self.wait_for_irq = Some(irq);
            return false;
        }
        self.increment_pc();
        true
    }

    fn exec_set<G: GpioBridge>(&mut self, immediate: u8, gpio: &mut G) -> bool {
        let data = u32::from(immediate & 0x1f);
        match set_destination(immediate) {
            SetDestination::Pins => self.write_set_pins(data, false, gpio),
            SetDestination::X => self.x = data,
            SetDestination::Y => self.y = data,
            SetDestination::PinDirs => self.write_set_pins(data, true, gpio),
            SetDestination::Reserved3 | SetDestination::Reserved5 | SetDestination::Reserved6
            | SetDestination::Reserved7 => {}
        }
        self.increment_pc();
        true
    }

    fn write_set_pins<G: GpioBridge>(&mut self, data: u32, directions: bool, gpio: &mut G) {
        let base = u32::from(self.pin_ctrl.set_base().value());
        let count = self.set_count();
        let bitset = rotate_left_masked(data, base, count);
        let bitmap = rotate_left_masked(bit_mask(count), base, 32);
        if directions {
            gpio.set_pindir_bitset(bitset, bitmap);
        } else {
            gpio.set_pin_bitset(bitset, bitmap);
        }
    }
}
