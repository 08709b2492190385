//! Armv7-M / Armv8-M Mainline EABIHF (hardfloat) PendSV handler.
//!
//! Unlike a typical Cortex-M4F/M7 RTOS port, this handler does not rely
//! on the hardware's lazy FPU-context stacking (inspecting `EXC_RETURN`
//! bit 4 to decide whether a task touched the FPU since its last switch).
//! It always saves and restores the full `S0-S31`/`FPSCR` state on every
//! switch: every task's frame already carries the FPU block whenever
//! this build is hardfloat, so there is no "hasn't touched the FPU yet"
//! state worth tracking. See `DESIGN.md` for the tradeoff this gives up.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::scheduler::{self, Scheduler};
use crate::tcb::Tcb;

/// PendSV handler for hardfloat builds. See [`super::eabi`]'s handler for
/// the integer-only half of this sequence; this adds an unconditional
/// `FPSCR`/`S0-S31` save-restore around it, in the order [`crate::frame`]
/// builds the frame: integer callee-saved frame, then `FPSCR`, then
/// `S31..S0`, from high address to low.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    core::arch::naked_asm!(r#"
    // Workaround https://github.com/rust-lang/rust/issues/127269
    .fpu vfpv3

    cpsid   i

    ldr     r1, ={scheduler_ptr}
    ldr     r1, [r1]

    ldr     r2, [r1, {current_task_offset}]
    ldr     r3, [r1, {task_table_offset}]

    lsl     r2, r2, {task_size_bits}
    add     r2, r3, r2

    mrs     r0, psp
    cbz     r0, 1f

    stmdb   r0!, {{ r4 - r11 }}
    vmrs    r12, fpscr
    str     r12, [r0, #-4]!
    vstmdb  r0!, {{ s0 - s31 }}
    str     r0, [r2, {tcb_saved_sp_offset}]

    1:

    ldrb    r2, [r2, {tcb_next_offset}]
    str     r2, [r1, {current_task_offset}]

    lsl     r2, r2, {task_size_bits}
    add     r2, r3, r2

    ldr     r0, [r2, {tcb_saved_sp_offset}]
    vldmia  r0!, {{ s0 - s31 }}
    ldr     r12, [r0], #4
    vmsr    fpscr, r12
    ldmia   r0!, {{ r4 - r11 }}
    msr     psp, r0

    orr     lr, lr, #0x04
    cpsie   i
    bx      lr
    "#,
    scheduler_ptr = sym scheduler::SCHEDULER_PTR,
    current_task_offset = const Scheduler::CURRENT_TASK_OFFSET,
    task_table_offset = const Scheduler::TASK_TABLE_OFFSET,
    task_size_bits = const Tcb::SIZE_BITS,
    tcb_saved_sp_offset = const Tcb::SAVED_SP_OFFSET,
    tcb_next_offset = const Tcb::NEXT_OFFSET,
    );
}

// End of File
