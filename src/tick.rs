//! Holds the [`TickCounter`] type: the kernel's monotonic time source

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::UnsafeCell;

use crate::port;

/// A 64-bit tick counter, incremented by exactly one on every `SysTick`
/// interrupt.
///
/// Reads from task context take a short interrupt-free critical section
/// rather than a lock-free double-read, because the only writer is the
/// `SysTick` handler itself and disabling interrupts for a handful of
/// cycles is cheaper to get right than a retry loop here.
pub(crate) struct TickCounter {
    ticks: UnsafeCell<u64>,
}

/// SAFETY: all access to `ticks` is through `increment`/`read`, which
/// serialize with each other via `port::critical_section`.
unsafe impl Sync for TickCounter {}

impl TickCounter {
    /// Create a tick counter starting at zero.
    pub(crate) const fn new() -> Self {
        Self {
            ticks: UnsafeCell::new(0),
        }
    }

    /// Called from the `SysTick` handler. Advances the counter by one tick,
    /// wrapping at 2^64 (never happens in practice at realistic tick rates).
    pub(crate) fn increment(&self) {
        // SAFETY: SysTick cannot preempt itself, and any task-context reader
        // has masked interrupts for the duration of its read.
        unsafe {
            let ptr = self.ticks.get();
            *ptr = (*ptr).wrapping_add(1);
        }
    }

    /// Read the current tick count.
    pub(crate) fn read(&self) -> u64 {
        port::critical_section(|| {
            // SAFETY: interrupts are masked, so `SysTick` cannot be
            // observed mid-increment.
            unsafe { *self.ticks.get() }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let t = TickCounter::new();
        assert_eq!(t.read(), 0);
    }

    #[test]
    fn increments_by_exactly_one() {
        let t = TickCounter::new();
        for expected in 1..=1000u64 {
            t.increment();
            assert_eq!(t.read(), expected);
        }
    }

    #[test]
    fn reads_are_non_decreasing_across_any_sequence() {
        let t = TickCounter::new();
        let mut last = t.read();
        for _ in 0..10_000 {
            t.increment();
            let now = t.read();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn wraps_at_2_pow_64_instead_of_panicking() {
        let t = TickCounter {
            ticks: UnsafeCell::new(u64::MAX),
        };
        t.increment();
        assert_eq!(t.read(), 0);
    }
}

// End of File
