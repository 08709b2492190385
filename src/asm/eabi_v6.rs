//! Armv6-M / Armv8-M Baseline EABI PendSV handler.
//!
//! Armv6-M only has the Thumb-1 instruction subset: no `stmdb`/`ldmia`
//! with `r8-r11` in the register list, no 3-register `add`/`lsl` with a
//! high register operand, no immediate form of `orr`. This handler
//! retargets `sp` at the task's own stack so ordinary `push`/`pop` can be
//! used, moving `r8-r11` through a single low register one at a time.
//!
//! `push`/`pop` only take low registers, and always store/load them at
//! ascending addresses in ascending register-number order. To land on
//! the same `R4..R11` ascending-address layout [`crate::frame`] builds
//! (shared with the other two PendSV variants), the high registers are
//! pushed first, in descending order (`r11` down to `r8`), followed by
//! the genuine `r7..r4`; restoring reverses that exactly.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::scheduler::{self, Scheduler};
use crate::tcb::Tcb;

/// PendSV handler for Armv6-M/Armv8-M Baseline. Same contract as
/// [`super::eabi`]'s handler; see there for the step-by-step rationale.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    core::arch::naked_asm!(r#"
    cpsid   i

    ldr     r1, ={scheduler_ptr}
    ldr     r1, [r1]

    ldr     r2, [r1, {current_task_offset}]
    ldr     r3, [r1, {task_table_offset}]

    // r2 = byte offset of the outgoing task's Tcb within the table
    lsls    r2, {task_size_bits}

    mrs     r0, psp
    mov     r12, sp
    cbz     r0, 1f

    mov     sp, r0

    // Push r11..r8 (one at a time, through r0) then r7..r4, so the final
    // addresses ascend r4, r5, ..., r11 - matching the stmdb/ldmia order
    // the other two PendSV variants produce.
    mov     r0, r11
    push    {{ r0 }}
    mov     r0, r10
    push    {{ r0 }}
    mov     r0, r9
    push    {{ r0 }}
    mov     r0, r8
    push    {{ r0 }}
    push    {{ r7 }}
    push    {{ r6 }}
    push    {{ r5 }}
    push    {{ r4 }}

    mov     r0, sp
    // Thumb-1 `str` has no base+base+immediate form, so this relies on
    // `saved_sp` being the Tcb's first field (`tcb::tests::saved_sp_is_the_first_field`
    // enforces that at the Rust level).
    str     r0, [r3, r2]

    1:

    // r2 still holds the outgoing Tcb's byte offset; add the `next`
    // field's own offset to read it (Thumb-1 has no base+base+immediate
    // addressing mode).
    adds    r2, {tcb_next_offset}
    ldrb    r2, [r3, r2]
    str     r2, [r1, {current_task_offset}]

    // r2 = byte offset of the incoming task's Tcb
    lsls    r2, {task_size_bits}
    ldr     r0, [r3, r2]
    mov     sp, r0

    pop     {{ r4 }}
    pop     {{ r5 }}
    pop     {{ r6 }}
    pop     {{ r7 }}
    pop     {{ r0 }}
    mov     r8, r0
    pop     {{ r0 }}
    mov     r9, r0
    pop     {{ r0 }}
    mov     r10, r0
    pop     {{ r0 }}
    mov     r11, r0

    mov     r0, sp
    msr     psp, r0
    mov     sp, r12

    // Return to thread mode using the process stack, whatever the
    // hardware set LR to on entry. Thumb-1 has no immediate `orr` and
    // cannot operate on `lr` directly, so do it through a low register.
    mov     r0, lr
    movs    r1, #0x04
    orrs    r0, r1
    mov     lr, r0

    cpsie   i
    bx      lr
    "#,
    scheduler_ptr = sym scheduler::SCHEDULER_PTR,
    current_task_offset = const Scheduler::CURRENT_TASK_OFFSET,
    task_table_offset = const Scheduler::TASK_TABLE_OFFSET,
    task_size_bits = const Tcb::SIZE_BITS,
    tcb_next_offset = const Tcb::NEXT_OFFSET,
    );
}

// End of File
