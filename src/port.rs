//! The hardware-specific primitives the scheduler needs.
//!
//! Everything in this module is either a one-line wrapper around
//! `cortex-m` or a host-side fake used so the rest of the crate can be
//! unit-tested with `cargo test` on a normal development machine, in the
//! same spirit as the syscall fakes in `multitimer` and `circq`.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(target_os = "none")]
mod hw {
    use cortex_m::peripheral::scb::SystemHandler;

    /// The system timer peripheral, borrowed by [`crate::Scheduler::start`].
    pub type Syst = cortex_m::peripheral::SYST;

    /// Run `f` with interrupts masked, so a reader can't observe state
    /// half-updated by an interrupt handler.
    pub fn critical_section<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        cortex_m::interrupt::free(|_cs| f())
    }

    /// Set the scheduling exception (PendSV) to the lowest priority, so it
    /// never preempts a real device interrupt.
    pub fn configure_pendsv_lowest_priority() {
        // SAFETY: called once, from `Scheduler::start`, before PendSV is
        // ever pended, and nothing else touches SCB concurrently with it.
        unsafe {
            let mut scb = cortex_m::peripheral::SCB::steal();
            scb.set_priority(SystemHandler::PendSV, 0xff);
        }
    }

    /// Zero the process stack pointer. Tells the PendSV handler there is no
    /// outgoing task to save on its very first entry.
    pub fn clear_process_stack_pointer() {
        // SAFETY: only called once, from `Scheduler::start`, before any task
        // has ever run.
        unsafe {
            core::arch::asm!("msr psp, {0}", in(reg) 0u32);
        }
    }

    /// Pend the scheduling exception (PendSV).
    pub fn trigger_switch() {
        cortex_m::peripheral::SCB::set_pendsv();
        // flush the pipeline so the exception is guaranteed to be pending
        // by the time the caller's next instruction would otherwise run
        cortex_m::asm::isb();
    }

    /// Globally enable interrupts.
    ///
    /// # Safety
    ///
    /// Must only be called once, from `Scheduler::start`, after the task
    /// table and PendSV priority have been fully configured.
    pub unsafe fn enable_interrupts() {
        // SAFETY: forwarded to the caller's contract.
        unsafe {
            cortex_m::interrupt::enable();
        }
    }

    /// Halt the core in a way visible to an attached debugger, without
    /// corrupting any shared state.
    pub fn halt() -> ! {
        loop {
            cortex_m::asm::bkpt();
        }
    }
}

#[cfg(not(target_os = "none"))]
mod hw {
    use core::cell::Cell;

    /// Host-side stand-in for `cortex_m::peripheral::SYST`; records the
    /// configuration calls `Scheduler::start` makes to it so tests can
    /// assert on them if they want to.
    #[derive(Default)]
    pub struct Syst {
        pub reload: u32,
        pub counter_enabled: bool,
        pub interrupt_enabled: bool,
    }

    impl Syst {
        pub fn set_reload(&mut self, reload: u32) {
            self.reload = reload;
        }

        pub fn clear_current(&mut self) {}

        pub fn enable_counter(&mut self) {
            self.counter_enabled = true;
        }

        pub fn enable_interrupt(&mut self) {
            self.interrupt_enabled = true;
        }
    }

    thread_local! {
        static SWITCH_COUNT: Cell<u64> = const { Cell::new(0) };
    }

    /// Tests run single-threaded, so a critical section is just a call.
    pub fn critical_section<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        f()
    }

    pub fn configure_pendsv_lowest_priority() {}

    pub fn clear_process_stack_pointer() {}

    /// Records that a switch was requested; real task switching needs a
    /// live Cortex-M core (or QEMU) and is exercised there, not on host.
    pub fn trigger_switch() {
        SWITCH_COUNT.with(|c| c.set(c.get() + 1));
    }

    /// How many times [`trigger_switch`] has been called. Test-only hook.
    #[cfg(test)]
    pub fn switch_count() -> u64 {
        SWITCH_COUNT.with(|c| c.get())
    }

    /// # Safety
    ///
    /// No safety requirements on the host fake.
    pub unsafe fn enable_interrupts() {}

    pub fn halt() -> ! {
        panic!("halt() called on host");
    }
}

pub(crate) use hw::*;

// End of File
