//! Armv7-M / Armv8-M Mainline EABI (soft-float) PendSV handler.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::scheduler::{self, Scheduler};
use crate::tcb::Tcb;

/// PendSV handler: the context-switch routine.
///
/// On entry, the hardware has already pushed `xPSR, PC, LR, R12, R3, R2,
/// R1, R0` onto whichever stack was active (the outgoing task's process
/// stack, or the main stack on the very first entry from `Scheduler::start`).
/// We push the remaining callee-saved registers onto the outgoing task's
/// own stack, advance the ring by one link, and restore the incoming
/// task's callee-saved registers from its stack. Exception return then
/// pops the hardware frame and the incoming task resumes where it left
/// off (or, the first time, at its synthetic entry frame).
///
/// Naked so the compiler cannot spill anything of its own choosing into
/// registers we are using to carry task state across the switch.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    // NOTE: must not touch r4-r11 before they are pushed below - those are
    // exactly the registers still holding the outgoing task's state.
    core::arch::naked_asm!(r#"
    cpsid   i

    // r1 = the Scheduler's address
    ldr     r1, ={scheduler_ptr}
    ldr     r1, [r1]

    // r2 = current_task index, r3 = task table base pointer
    ldr     r2, [r1, {current_task_offset}]
    ldr     r3, [r1, {task_table_offset}]

    // r2 = address of the outgoing task's Tcb
    lsl     r2, r2, {task_size_bits}
    add     r2, r3, r2

    // r0 = the outgoing stack pointer. Zero means there is no outgoing
    // task (Scheduler::start just cleared PSP) - skip the save.
    mrs     r0, psp
    cbz     r0, 1f

    stmdb   r0!, {{ r4 - r11 }}
    str     r0, [r2, {tcb_saved_sp_offset}]

    1:

    // r2 was computed unconditionally above, so this read is valid on the
    // very first entry too: advance the ring by one link regardless.
    ldrb    r2, [r2, {tcb_next_offset}]
    str     r2, [r1, {current_task_offset}]

    // r2 = address of the incoming task's Tcb
    lsl     r2, r2, {task_size_bits}
    add     r2, r3, r2

    ldr     r0, [r2, {tcb_saved_sp_offset}]
    ldmia   r0!, {{ r4 - r11 }}
    msr     psp, r0

    // Return to thread mode using the process stack, whatever the
    // hardware set LR to on entry.
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
