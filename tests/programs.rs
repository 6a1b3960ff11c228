//! End-to-end program scenarios driven through the register window with a
//! recording GPIO double.

mod common;

use common::{GpioCall, RecordingGpio, block, enable, inject, load_at, load_program, sm_addr};
use piosim::pio::{PioBlock, regs};
use pretty_assertions::assert_eq;

fn pin_calls(pio: &PioBlock<RecordingGpio>) -> &[GpioCall] {
    &pio.gpio().calls
}

#[test]
fn square_wave_alternates_one_pin() {
    let mut pio = block();
    // set pins, 1 ; set pins, 0 ; jmp 0
    load_program(&mut pio, &[0xE001, 0xE000, 0x0000]);
    pio.write(regs::SM0_PINCTRL, 1 << 26); // set_base 0, set_count 1
    enable(&mut pio, 1);

    // Three cycles per period: two SETs plus the jump.
    pio.execute(12);
    let expected: Vec<GpioCall> = (0..4)
        .flat_map(|_| {
            [
                GpioCall::Pins { bitset: 1, bitmap: 1 },
                GpioCall::Pins { bitset: 0, bitmap: 1 },
            ]
        })
        .collect();
    assert_eq!(pin_calls(&pio), expected.as_slice());
}

#[test]
fn echo_drains_one_word_as_four_bytes() {
    let mut pio = block();
    // out x, 8 ; in x, 8 ; jmp 0
    load_program(&mut pio, &[0x6028, 0x4028, 0x0000]);
    // autopush + autopull, both thresholds 8, both shift directions right.
    pio.write(
        regs::SM0_SHIFTCTRL,
        (1 << 16) | (1 << 17) | (3 << 18) | (8 << 20) | (8 << 25),
    );
    pio.write(regs::TXF0, 0xDEAD_BEEF);
    enable(&mut pio, 1);
    pio.execute(20);

    assert_eq!(pio.read(regs::RXF0), 0xEF00_0000);
    assert_eq!(pio.read(regs::RXF0), 0xBE00_0000);
    assert_eq!(pio.read(regs::RXF0), 0xAD00_0000);
    assert_eq!(pio.read(regs::RXF0), 0xDE00_0000);
}

#[test]
fn jmp_with_decrement_counts_x_to_zero() {
    let mut pio = block();
    // set x, 3 ; L: jmp x-- L
    load_program(&mut pio, &[0xE023, 0x0041]);
    enable(&mut pio, 1);
    pio.execute(5);

    assert_eq!(pio.state_machine(0).x(), 0);
    assert_eq!(pio.read(regs::SM0_ADDR), 2);
    assert_eq!(pin_calls(&pio), &[]);
}

#[test]
fn wait_on_irq_released_by_other_machine() {
    let mut pio = block();
    // slot 0: wait 1 irq 2 (machine 0) ; slot 1: irq set 2 (machine 1)
    load_program(&mut pio, &[0x20C2, 0xC002]);
    inject(&mut pio, 1, 0x0001); // park machine 1 at slot 1

    enable(&mut pio, 0b01);
    pio.execute(3);
    assert!(pio.state_machine(0).stalled());
    assert_eq!(pio.read(regs::SM0_ADDR), 0);
    assert!(!pio.irq_flags()[2]);

    enable(&mut pio, 0b10);
    pio.execute(1);
    assert!(pio.irq_flags()[2]);
    assert_eq!(pio.read(sm_addr(regs::SM0_ADDR, 1)), 2);

    enable(&mut pio, 0b01);
    pio.execute(1);
    // Polarity 1 consumes the flag on wake-up.
    assert!(!pio.irq_flags()[2]);
    assert_eq!(pio.read(regs::SM0_ADDR), 1);
}

#[test]
fn irq_set_by_lower_machine_is_seen_same_cycle() {
    let mut pio = block();
    // slot 0: irq set 2 (machine 0) ; slot 1: wait 1 irq 2 (machine 1)
    load_program(&mut pio, &[0xC002, 0x20C2]);
    inject(&mut pio, 1, 0x0001);
    enable(&mut pio, 0b11);

    // Machine 0 raises the flag early in the cycle; machine 1 consumes it
    // within the same cycle because it steps later.
    pio.execute(1);
    assert!(!pio.irq_flags()[2]);
    assert_eq!(pio.read(sm_addr(regs::SM0_ADDR, 1)), 2);
}

#[test]
fn gated_sideset_writes_only_when_gate_is_high() {
    let mut pio = block();
    // nop (mov y, y) with side-set field 0b11001: gate high, data 0b1,
    // delay 1.
    load_program(&mut pio, &[0xB942]);
    pio.write(regs::SM0_PINCTRL, (4 << 10) | (2 << 29));
    pio.write(regs::SM0_EXECCTRL, (1 << 30) | (31 << 12));
    enable(&mut pio, 1);
    pio.execute(2); // instruction plus its delay cycle
    assert_eq!(
        pin_calls(&pio),
        &[GpioCall::Pins {
            bitset: 0x10,
            bitmap: 0x10
        }]
    );

    // Same instruction with the gate bit low: no GPIO traffic at all.
    let mut pio = block();
    load_program(&mut pio, &[0xA942]);
    pio.write(regs::SM0_PINCTRL, (4 << 10) | (2 << 29));
    pio.write(regs::SM0_EXECCTRL, (1 << 30) | (31 << 12));
    enable(&mut pio, 1);
    pio.execute(2);
    assert_eq!(pin_calls(&pio), &[]);
}

#[test]
fn execution_wraps_from_wrap_top_to_wrap_bottom() {
    let mut pio = block();
    for slot in 5..=9 {
        load_at(&mut pio, slot, 0xA042); // nop
    }
    pio.write(regs::SM0_EXECCTRL, (5 << 7) | (9 << 12));
    inject(&mut pio, 0, 0x0005); // jmp 5
    enable(&mut pio, 1);

    pio.execute(1);
    assert_eq!(pio.read(regs::SM0_ADDR), 6);
    pio.execute(4);
    assert_eq!(pio.read(regs::SM0_ADDR), 5);
}

#[test]
fn nonblocking_pull_on_empty_tx_loads_x() {
    let mut pio = block();
    load_program(&mut pio, &[0x8080]); // pull noblock
    inject(&mut pio, 0, 0xE035); // set x, 21
    enable(&mut pio, 1);
    pio.execute(1);

    assert_eq!(pio.state_machine(0).osr(), 21);
    assert_eq!(pio.state_machine(0).osr_counter(), 0);
    assert_eq!(pio.read(regs::SM0_ADDR), 1);
}

#[test]
fn blocking_push_holds_pc_until_rx_drains() {
    let mut pio = block();
    load_program(&mut pio, &[0x8020]); // push block
    for _ in 0..4 {
        inject(&mut pio, 0, 0x8000); // fill RX from the zeroed ISR
    }
    enable(&mut pio, 1);

    pio.execute(3);
    assert!(pio.state_machine(0).stalled());
    assert_eq!(pio.read(regs::SM0_ADDR), 0);

    pio.read(regs::RXF0);
    pio.execute(1);
    assert_eq!(pio.read(regs::SM0_ADDR), 1);
}

#[test]
fn autopush_against_full_rx_holds_pc() {
    let mut pio = block();
    load_program(&mut pio, &[0x4028]); // in x, 8
    pio.write(regs::SM0_SHIFTCTRL, (1 << 16) | (3 << 18) | (8 << 20));
    for _ in 0..4 {
        inject(&mut pio, 0, 0x8000);
    }
    enable(&mut pio, 1);

    pio.execute(2);
    assert_eq!(pio.read(regs::SM0_ADDR), 0);
    assert!(pio.state_machine(0).stalled());

    pio.read(regs::RXF0);
    pio.execute(1);
    assert_eq!(pio.read(regs::SM0_ADDR), 1);
}

#[test]
fn out_with_full_width_window_drives_all_pins() {
    let mut pio = block();
    // mov osr, !null ; out pins, 32
    load_program(&mut pio, &[0xA0EB, 0x6000]);
    pio.write(regs::SM0_PINCTRL, 32 << 20); // out_base 0, out_count 32
    enable(&mut pio, 1);
    pio.execute(2);

    assert_eq!(
        pin_calls(&pio),
        &[GpioCall::Pins {
            bitset: 0xFFFF_FFFF,
            bitmap: 0xFFFF_FFFF
        }]
    );
}

#[test]
fn in_with_zero_count_shifts_a_full_word() {
    let mut pio = block();
    inject(&mut pio, 0, 0xA02B); // mov x, !null
    inject(&mut pio, 0, 0x4020); // in x, 32
    assert_eq!(pio.state_machine(0).isr(), 0xFFFF_FFFF);
    inject(&mut pio, 0, 0x4040); // in y, 32 (count field 0)
    assert_eq!(pio.state_machine(0).isr(), 0);
    assert_eq!(pio.state_machine(0).isr_counter(), 32);
}

#[test]
fn mov_status_tracks_tx_level() {
    let mut pio = block();
    pio.write(regs::SM0_EXECCTRL, 3 | (31 << 12)); // status_n = 3, TX select
    inject(&mut pio, 0, 0xA025); // mov x, status
    assert_eq!(pio.state_machine(0).x(), 0xFFFF_FFFF);

    for value in 0..3 {
        pio.write(regs::TXF0, value);
    }
    inject(&mut pio, 0, 0xA025);
    assert_eq!(pio.state_machine(0).x(), 0);
}

#[test]
fn mov_exec_runs_latched_instruction_next_cycle() {
    let mut pio = block();
    // pull block ; out x, 32 ; mov exec, x ; set y, 2
    load_program(&mut pio, &[0x80A0, 0x6020, 0xA081, 0xE042]);
    pio.write(regs::TXF0, 0xE021); // set x, 1
    enable(&mut pio, 1);
    pio.execute(5);

    assert_eq!(pio.state_machine(0).x(), 1);
    assert_eq!(pio.state_machine(0).y(), 2);
    assert_eq!(pio.read(regs::SM0_ADDR), 4);
}

#[test]
fn out_exec_runs_latched_instruction_next_cycle() {
    let mut pio = block();
    // pull block ; out exec, 32 ; set y, 2
    load_program(&mut pio, &[0x80A0, 0x60E0, 0xE042]);
    pio.write(regs::TXF0, 0xE021); // set x, 1
    enable(&mut pio, 1);
    pio.execute(4);

    assert_eq!(pio.state_machine(0).x(), 1);
    assert_eq!(pio.state_machine(0).y(), 2);
    assert_eq!(pio.read(regs::SM0_ADDR), 3);
}

#[test]
fn delay_cycles_suspend_execution() {
    let mut pio = block();
    // set x, 1 [3] ; set x, 2
    load_program(&mut pio, &[0xE321, 0xE022]);
    enable(&mut pio, 1);

    pio.execute(1);
    assert_eq!(pio.state_machine(0).x(), 1);
    pio.execute(3);
    assert_eq!(pio.state_machine(0).x(), 1);
    assert_eq!(pio.read(regs::SM0_ADDR), 1);
    pio.execute(1);
    assert_eq!(pio.state_machine(0).x(), 2);
}

#[test]
fn restart_clears_transients_and_keeps_data() {
    let mut pio = block();
    // set x, 1 [3] ; nop
    load_program(&mut pio, &[0xE321, 0xA042]);
    enable(&mut pio, 1);
    pio.execute(1);
    assert_eq!(pio.state_machine(0).x(), 1);

    // Restart machine 0 while keeping it enabled: the pending delay is
    // dropped, scratch data survives.
    pio.write(regs::CTRL, (1 << 4) | 1);
    pio.execute(1);
    assert_eq!(pio.state_machine(0).x(), 1);
    assert_eq!(pio.read(regs::SM0_ADDR), 2);
}

#[test]
fn wait_for_pin_stalls_until_level_changes() {
    let mut pio = block();
    // wait 1 gpio 5 ; set x, 1
    load_program(&mut pio, &[0x2085, 0xE021]);
    enable(&mut pio, 1);

    pio.execute(3);
    assert_eq!(pio.read(regs::SM0_ADDR), 0);
    assert_eq!(pio.state_machine(0).x(), 0);

    pio.gpio_mut().pins = 1 << 5;
    pio.execute(2);
    assert_eq!(pio.state_machine(0).x(), 1);
    assert_eq!(pio.read(regs::SM0_ADDR), 2);
}

#[test]
fn jmp_pin_selects_branch() {
    // jmp pin 5 ; set x, 1 ; ... slot 5: set x, 2
    let program: &[u16] = &[0x00C5, 0xE021];

    let mut pio = block();
    load_program(&mut pio, program);
    load_at(&mut pio, 5, 0xE022);
    pio.write(regs::SM0_EXECCTRL, (3 << 24) | (31 << 12)); // jmp_pin 3
    enable(&mut pio, 1);
    pio.execute(2);
    assert_eq!(pio.state_machine(0).x(), 1);

    let mut pio = block();
    load_program(&mut pio, program);
    load_at(&mut pio, 5, 0xE022);
    pio.write(regs::SM0_EXECCTRL, (3 << 24) | (31 << 12));
    pio.gpio_mut().pins = 1 << 3;
    enable(&mut pio, 1);
    pio.execute(2);
    assert_eq!(pio.state_machine(0).x(), 2);
}

#[test]
fn autopull_refill_costs_a_cycle_only_when_tx_has_data() {
    let mut pio = block();
    // out x, 8 ; jmp 0
    load_program(&mut pio, &[0x6028, 0x0000]);
    pio.write(regs::SM0_SHIFTCTRL, (1 << 17) | (3 << 18) | (8 << 25));
    pio.write(regs::TXF0, 0x11);
    pio.write(regs::TXF0, 0x22);
    enable(&mut pio, 1);

    // First word: the refill consumes a full cycle.
    pio.execute(1);
    assert_eq!(pio.state_machine(0).x(), 0);
    assert!(pio.state_machine(0).stalled());
    pio.execute(1);
    assert_eq!(pio.state_machine(0).x(), 0x11);

    // Second word: refilled in place right after the shift, so the next
    // OUT proceeds without stalling.
    pio.execute(2);
    assert_eq!(pio.state_machine(0).x(), 0x22);
}

#[test]
fn jmp_with_decrement_counts_y_to_zero() {
    let mut pio = block();
    // set y, 3 ; L: jmp y-- L
    load_program(&mut pio, &[0xE043, 0x0081]);
    enable(&mut pio, 1);
    pio.execute(5);

    assert_eq!(pio.state_machine(0).y(), 0);
    assert_eq!(pio.read(regs::SM0_ADDR), 2);
}

#[test]
fn identical_runs_are_deterministic() {
    let run = || {
        let mut pio = block();
        load_program(&mut pio, &[0x6028, 0x4028, 0x0000]);
        pio.write(
            regs::SM0_SHIFTCTRL,
            (1 << 16) | (1 << 17) | (3 << 18) | (8 << 20) | (8 << 25),
        );
        pio.write(regs::SM0_PINCTRL, 1 << 26);
        pio.write(regs::TXF0, 0xDEAD_BEEF);
        enable(&mut pio, 1);
        pio.execute(32);
        let drained: Vec<u32> = (0..4).map(|_| pio.read(regs::RXF0)).collect();
        (pio.gpio().calls.clone(), drained)
    };
    assert_eq!(run(), run());
}
