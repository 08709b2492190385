//! Holds the [`Tcb`] type and methods

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicPtr, AtomicU64, AtomicU8, Ordering};

/// The function signature for our task entry functions.
///
/// Our tasks run forever and take no arguments.
pub type TaskEntryFn = fn() -> !;

/// A task control block: one per task, owned by the scheduler's static
/// task table.
///
/// The size of this struct must be a power of 2 so the PendSV assembly
/// can turn a task index into a byte offset with a single shift instead
/// of a multiply. `wake_tick` is never touched by that assembly, but it
/// still has to pad the struct out to a power of 2, since every slot in
/// the table needs the same stride.
///
/// This TCB does not keep the task's entry function around after
/// creation: the stack frame is built once, eagerly, inside
/// `create_task`, so there is never a later point that needs to re-read
/// it.
#[repr(C)]
pub struct Tcb {
    /// The stack pointer saved for this task while it is not running.
    ///
    /// This is the value taken from PSP when the task was last suspended,
    /// and is therefore the value to put back into PSP when it is resumed.
    /// It is meaningless while this TCB is the currently-running task -
    /// the live value lives in the CPU's PSP register instead.
    saved_sp: AtomicPtr<u32>,
    /// Index, within the task table, of the next TCB in round-robin order.
    ///
    /// Forms a singly-linked circular list over the table; read directly by
    /// the PendSV handler to decide which task runs next.
    next: AtomicU8,
    /// Absolute tick at which this task should stop spinning in `delay`.
    ///
    /// Zero means "not waiting on anything". Only ever written by the task
    /// itself (from `delay`), and only ever read by the same task on its
    /// own next turn, so this needs no synchronization beyond
    /// `Ordering::Relaxed`.
    wake_tick: AtomicU64,
}

impl Tcb {
    /// The size of a [`Tcb`] is `pow(2, SIZE_BITS)` bytes.
    pub const SIZE_BITS: usize = 4;

    /// The offset, in bytes, to the `saved_sp` field - read and written
    /// directly by the PendSV assembly.
    pub(crate) const SAVED_SP_OFFSET: usize = core::mem::offset_of!(Tcb, saved_sp);

    /// The offset, in bytes, to the `next` field - read directly by the
    /// PendSV assembly to find the following task in the ring.
    pub(crate) const NEXT_OFFSET: usize = core::mem::offset_of!(Tcb, next);

    /// A compile-time check that the size of a [`Tcb`] is what we said it was.
    const _CHECK: () = const {
        assert!(core::mem::size_of::<Self>() == (1 << Self::SIZE_BITS));
    };

    /// The minimum stack we can support: space for the hardware exception
    /// frame plus the callee-saved frame (and the FPU frame, on hardfloat
    /// builds), plus some headroom for the task's own working set.
    pub(crate) const MIN_STACK_SIZE: usize = if cfg!(arm_abi = "eabihf") {
        (4 * 16) + (4 * 33) + 8
    } else {
        (4 * 16) + 8
    };

    /// Create an empty TCB, not yet associated with any task.
    ///
    /// Used to build the static task table before any task is created;
    /// [`crate::Scheduler::create_task`] fills one of these in at runtime.
    pub const fn empty() -> Tcb {
        Tcb {
            saved_sp: AtomicPtr::new(core::ptr::null_mut()),
            next: AtomicU8::new(0),
            wake_tick: AtomicU64::new(0),
        }
    }

    /// Is this slot still waiting to be claimed by `create_task`?
    pub(crate) fn is_unused(&self) -> bool {
        self.saved_sp.load(Ordering::Relaxed).is_null()
    }

    /// Get the current stack pointer for this task.
    pub(crate) fn stack(&self) -> *mut u32 {
        self.saved_sp.load(Ordering::Relaxed)
    }

    /// Set the current stack pointer for this task.
    ///
    /// # Safety
    ///
    /// The task will execute using the stack given, so it must point to the
    /// last item in a valid Arm EABI stack, with a full exception frame and
    /// callee-saved frame preceding it.
    pub(crate) unsafe fn set_stack(&self, new_stack: *mut u32) {
        self.saved_sp.store(new_stack, Ordering::Relaxed)
    }

    /// Get the index of the next TCB in round-robin order.
    pub(crate) fn next(&self) -> u8 {
        self.next.load(Ordering::Relaxed)
    }

    /// Set the index of the next TCB in round-robin order.
    pub(crate) fn set_next(&self, next: u8) {
        self.next.store(next, Ordering::Relaxed)
    }

    /// Get the absolute wake tick this task is waiting for (zero if none).
    pub(crate) fn wake_tick(&self) -> u64 {
        self.wake_tick.load(Ordering::Relaxed)
    }

    /// Set the absolute wake tick this task is waiting for.
    pub(crate) fn set_wake_tick(&self, wake_tick: u64) {
        self.wake_tick.store(wake_tick, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_a_power_of_two() {
        assert_eq!(core::mem::size_of::<Tcb>(), 1 << Tcb::SIZE_BITS);
        assert_eq!(core::mem::size_of::<Tcb>(), 16);
    }

    #[test]
    fn saved_sp_is_the_first_field() {
        // The PendSV handler relies on `offset_of!(Tcb, saved_sp) == 0`.
        assert_eq!(Tcb::SAVED_SP_OFFSET, 0);
    }

    #[test]
    fn next_offset_matches_the_field_layout() {
        assert_eq!(Tcb::NEXT_OFFSET, core::mem::offset_of!(Tcb, next));
    }

    #[test]
    fn empty_tcb_is_unused() {
        let tcb = Tcb::empty();
        assert!(tcb.is_unused());
        assert_eq!(tcb.next(), 0);
        assert_eq!(tcb.wake_tick(), 0);
    }

    #[test]
    fn becomes_used_once_a_stack_pointer_is_set() {
        let tcb = Tcb::empty();
        let mut word: u32 = 0;
        unsafe { tcb.set_stack(&mut word as *mut u32) };
        assert!(!tcb.is_unused());
    }
}

// End of File
