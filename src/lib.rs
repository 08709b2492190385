//! MinOS core: static task table, PendSV-based round-robin context switch,
//! a SysTick-driven tick counter, and a `delay` primitive for 32-bit Arm
//! Cortex-M.
//!
//! Out of scope, left to the application: clock configuration, vector
//! table wiring beyond `SysTick`/`PendSV`, inter-task communication, and
//! the linker script.

#![cfg_attr(target_os = "none", no_std)]

#[cfg(target_os = "none")]
mod asm;
mod frame;
mod logging;
mod port;
mod scheduler;
mod stack;
mod stack_pusher;
mod tcb;
mod tick;

pub use scheduler::Scheduler;
pub use stack::Stack;
pub use tcb::{TaskEntryFn, Tcb};

pub(crate) use core::cell::UnsafeCell;

/// Sentinel `now()` returns before any scheduler has called `start`.
const NOT_STARTED: u64 = u64::MAX;

/// Return the absolute tick at which a `delay(ticks)` call started at
/// `now` should stop spinning.
///
/// Pulled out of [`delay`] so it is directly host-testable without a live
/// scheduler: it is pure arithmetic, and it is where `delay(0)`'s
/// no-yield behaviour actually lives - the deadline equals `now`, so the
/// caller's `while now() < deadline` loop never runs its body.
fn deadline(now: u64, ticks: u16) -> u64 {
    now.wrapping_add(ticks as u64)
}

/// Suspend the calling task for at least `ticks` system ticks.
///
/// Must only be called from task context, after [`Scheduler::start`] has
/// run - never from an interrupt handler. Cooperatively triggers the
/// scheduling exception in a loop until the tick counter reaches the
/// computed deadline; `delay(0)` computes a deadline equal to the current
/// tick and so never yields at all.
pub fn delay(ticks: u16) {
    let Some(scheduler) = Scheduler::get_scheduler() else {
        // No scheduler running yet; nothing to delay against.
        return;
    };
    let wake_tick = deadline(scheduler.now(), ticks);
    if let Some(tcb) = scheduler.current_tcb() {
        tcb.set_wake_tick(wake_tick);
        while scheduler.now() < wake_tick {
            scheduler.yield_current_task();
        }
        tcb.set_wake_tick(0);
    }
}

/// The current monotonic tick count, or [`NOT_STARTED`] if
/// [`Scheduler::start`] has not yet run.
pub fn now() -> u64 {
    match Scheduler::get_scheduler() {
        Some(scheduler) => scheduler.now(),
        None => NOT_STARTED,
    }
}

/// `SysTick` handler. Installed in the vector table by the application;
/// advances the tick counter by exactly one and does nothing else - the
/// scheduler is otherwise only ever pended from task context.
#[cfg(target_os = "none")]
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    if let Some(scheduler) = Scheduler::get_scheduler() {
        scheduler.sched_tick();
    }
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::println!("PANIC: {}", defmt::Debug2Format(info));
    cortex_m::asm::udf();
}

#[cfg(target_os = "none")]
#[cortex_m_rt::exception]
unsafe fn HardFault(frame: &cortex_m_rt::ExceptionFrame) -> ! {
    defmt::println!("FAULT: {}", defmt::Debug2Format(frame));
    cortex_m::asm::udf();
}

#[cfg(target_os = "none")]
defmt::timestamp!("{=u64:010}", now());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tick_delay_deadline_equals_now() {
        for now in [0u64, 1, 1_000, u64::MAX] {
            assert_eq!(deadline(now, 0), now);
        }
    }

    #[test]
    fn deadline_is_now_plus_ticks() {
        for (now, ticks) in [(0u64, 1u16), (0, 2), (0, 10), (0, 1000), (500, 10)] {
            assert_eq!(deadline(now, ticks), now + ticks as u64);
        }
    }

    #[test]
    fn deadline_wraps_instead_of_panicking() {
        assert_eq!(deadline(u64::MAX, 1), 0);
        assert_eq!(deadline(u64::MAX, 2), 1);
    }

    #[test]
    fn now_before_start_is_the_not_started_sentinel() {
        // No scheduler has been started in this test binary (other tests
        // never call `Scheduler::start`, which is the only thing that
        // ever writes `SCHEDULER_PTR`), so this observes the no-scheduler
        // path deterministically.
        if scheduler::Scheduler::get_scheduler().is_none() {
            assert_eq!(now(), NOT_STARTED);
        }
    }

    #[test]
    fn delay_without_a_scheduler_returns_immediately() {
        // Must not panic or spin when called before any scheduler exists.
        // Guarded the same way as `now_before_start_is_the_not_started_sentinel`:
        // another test in this binary may have already started a (distinct,
        // static) scheduler, and `SCHEDULER_PTR` is process-wide.
        if scheduler::Scheduler::get_scheduler().is_none() {
            delay(0);
            delay(100);
        }
    }
}

// End of File
