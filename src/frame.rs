//! Builds the synthetic initial stack frame for a newly created task.
//!
//! This is the one piece of the kernel that has to be bit-exact with the
//! processor's exception-return contract: the very first context restore
//! into a task must produce the same machine state the hardware would have
//! produced had it genuinely interrupted that task mid-`entry()`.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::TaskEntryFn;
use crate::stack_pusher::StackPusher;

/// `xPSR` value a freshly-created task starts with: Thumb bit set, all
/// flags clear. Arm7-M only ever runs Thumb code, but the bit still has to
/// be set or the processor will fault on entry.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Sentinel `LR` value baked into every task's hardware frame. An
/// accidental `return` from a task's entry function pops this into `PC`,
/// which is not a valid code address, so it hard-faults immediately
/// instead of running off into the weeds.
const RETURN_SENTINEL: u32 = 0xFFFF_FFFE;

/// Push the hardware exception frame and the callee-saved integer frame
/// for a task that has never run, so that its first context restore
/// starts it at `entry` in thread mode on the process stack.
///
/// All register values other than `xPSR`, `PC`, `LR`, and `R0` are
/// recognizable debug sentinels (`0xR0R0R0R0` for integer register `R`),
/// chosen so a stack dump identifies which slot is which at a glance.
pub(crate) fn push_initial_frame(pusher: &mut StackPusher, entry: TaskEntryFn) {
    // Hardware exception frame (popped automatically by exception return)
    pusher.push(INITIAL_XPSR);
    pusher.push(entry as usize as u32);
    pusher.push(RETURN_SENTINEL);
    pusher.push(0x1212_1212); // R12
    pusher.push(0x0303_0303); // R3
    pusher.push(0x0202_0202); // R2
    pusher.push(0x0101_0101); // R1
    pusher.push(0x0000_0000); // R0 - no argument

    // Callee-saved frame (popped by the PendSV handler itself)
    pusher.push(0x1111_1111); // R11
    pusher.push(0x1010_1010); // R10
    pusher.push(0x0909_0909); // R9
    pusher.push(0x0808_0808); // R8
    pusher.push(0x0707_0707); // R7
    pusher.push(0x0606_0606); // R6
    pusher.push(0x0505_0505); // R5
    pusher.push(0x0404_0404); // R4
}

/// Push the FPU callee-saved frame (`FPSCR` and `S31..S0`) below the
/// integer callee-saved frame, for hardfloat builds.
///
/// Called directly (not gated on `arm_abi`) so host unit tests can exercise
/// it even though the host is never itself built with the hardfloat cfg.
pub(crate) fn push_fpu_frame(pusher: &mut StackPusher) {
    pusher.push(0x0200_0000); // FPSCR
    // S31..S1 as the IEEE-754 single-precision encoding of 31.0..1.0,
    // and S0 as 0.0 - the same recognizable pattern as the integer regs.
    pusher.push(0x41F8_0000); // S31 = 31.0
    pusher.push(0x41F0_0000); // S30 = 30.0
    pusher.push(0x41E8_0000); // S29 = 29.0
    pusher.push(0x41E0_0000); // S28 = 28.0
    pusher.push(0x41D8_0000); // S27 = 27.0
    pusher.push(0x41D0_0000); // S26 = 26.0
    pusher.push(0x41C8_0000); // S25 = 25.0
    pusher.push(0x41C0_0000); // S24 = 24.0
    pusher.push(0x41B8_0000); // S23 = 23.0
    pusher.push(0x41B0_0000); // S22 = 22.0
    pusher.push(0x41A8_0000); // S21 = 21.0
    pusher.push(0x41A0_0000); // S20 = 20.0
    pusher.push(0x4198_0000); // S19 = 19.0
    pusher.push(0x4190_0000); // S18 = 18.0
    pusher.push(0x4188_0000); // S17 = 17.0
    pusher.push(0x4180_0000); // S16 = 16.0
    pusher.push(0x4170_0000); // S15 = 15.0
    pusher.push(0x4160_0000); // S14 = 14.0
    pusher.push(0x4150_0000); // S13 = 13.0
    pusher.push(0x4140_0000); // S12 = 12.0
    pusher.push(0x4130_0000); // S11 = 11.0
    pusher.push(0x4120_0000); // S10 = 10.0
    pusher.push(0x4110_0000); // S9 = 9.0
    pusher.push(0x4100_0000); // S8 = 8.0
    pusher.push(0x40E0_0000); // S7 = 7.0
    pusher.push(0x40C0_0000); // S6 = 6.0
    pusher.push(0x40A0_0000); // S5 = 5.0
    pusher.push(0x4080_0000); // S4 = 4.0
    pusher.push(0x4040_0000); // S3 = 3.0
    pusher.push(0x4000_0000); // S2 = 2.0
    pusher.push(0x3F80_0000); // S1 = 1.0
    pusher.push(0x0000_0000); // S0 = 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;

    fn dummy_task() -> ! {
        loop {}
    }

    /// Read back `count` words below `from`, in the order they were pushed
    /// (i.e. highest address first).
    unsafe fn words_below(from: *mut u32, count: usize) -> Vec<u32> {
        (1..=count)
            .map(|i| unsafe { from.offset(-(i as isize)).read() })
            .collect()
    }

    #[test]
    fn integer_frame_matches_the_documented_layout() {
        static STACK: Stack<256> = Stack::new();
        let top = STACK.top();
        let mut pusher = unsafe { StackPusher::new(top) };
        push_initial_frame(&mut pusher, dummy_task);

        let words = unsafe { words_below(top, 16) };
        assert_eq!(words[0], INITIAL_XPSR);
        assert_eq!(words[1], dummy_task as usize as u32);
        assert_eq!(words[2], RETURN_SENTINEL);
        assert_eq!(words[3], 0x1212_1212); // R12
        assert_eq!(words[7], 0x0000_0000); // R0
        assert_eq!(words[8], 0x1111_1111); // R11
        assert_eq!(words[15], 0x0404_0404); // R4

        // The frame pointer left over is exactly 16 words below the top.
        assert_eq!(pusher.current(), unsafe { top.offset(-16) });
    }

    #[test]
    fn fpu_frame_is_pushed_below_the_integer_frame() {
        static STACK: Stack<512> = Stack::new();
        let top = STACK.top();
        let mut pusher = unsafe { StackPusher::new(top) };
        push_initial_frame(&mut pusher, dummy_task);
        push_fpu_frame(&mut pusher);

        let all_words = unsafe { words_below(top, 16 + 33) };
        // the first 16 words are unchanged by pushing the FPU frame
        assert_eq!(all_words[0], INITIAL_XPSR);
        assert_eq!(all_words[15], 0x0404_0404); // R4

        let fpu_words = &all_words[16..];
        assert_eq!(fpu_words[0], 0x0200_0000); // FPSCR
        assert_eq!(fpu_words[1], 0x41F8_0000); // S31 = 31.0
        assert_eq!(fpu_words[32], 0x0000_0000); // S0 = 0.0

        assert_eq!(pusher.current(), unsafe { top.offset(-(16 + 33)) });
    }
}

// End of File
