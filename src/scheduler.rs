//! Contains the [`Scheduler`] type: the task table, the current-task
//! cursor, and the tick source.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::frame::{push_fpu_frame, push_initial_frame};
use crate::stack_pusher::StackPusher;
use crate::tcb::{TaskEntryFn, Tcb};
use crate::tick::TickCounter;
use crate::{Stack, port};

/// The location of our one and only [`Scheduler`] object.
///
/// The free-standing `PendSV`/`SysTick` handlers and the `delay`/`now`
/// helpers all need to find it, and none of them can be handed a reference
/// through a normal function call, so it lives here instead.
pub(crate) static SCHEDULER_PTR: AtomicPtr<Scheduler> = AtomicPtr::new(core::ptr::null_mut());

/// A cooperative, round-robin task-switching scheduler.
///
/// Holds a fixed-capacity table of [`Tcb`]s (the application owns the
/// backing storage as a `&'static [Tcb]`), the index of the task currently
/// running, and the monotonic tick counter.
#[repr(C)]
pub struct Scheduler {
    /// Which task is currently running. `usize::MAX` before the scheduler
    /// has run its first task; read directly by the PendSV handler.
    current_task: AtomicUsize,
    /// The fixed-capacity, caller-owned task table.
    task_table: &'static [Tcb],
    /// How many of `task_table`'s slots have been claimed by `create_task`.
    task_count: AtomicUsize,
    /// The monotonic tick counter.
    tick: TickCounter,
}

impl Scheduler {
    /// The offset, in bytes, to the `current_task` field.
    pub(crate) const CURRENT_TASK_OFFSET: usize = core::mem::offset_of!(Scheduler, current_task);

    /// The offset, in bytes, to the `task_table` field.
    ///
    /// This is the offset to the *start* of the fat pointer; the PendSV
    /// handler only ever reads its first word (the data pointer), never
    /// the length, so it doesn't matter that a `&[Tcb]` isn't a single
    /// machine word.
    pub(crate) const TASK_TABLE_OFFSET: usize = core::mem::offset_of!(Scheduler, task_table);

    /// Sentinel stored in `current_task` before the first task has run.
    const NO_CURRENT_TASK: usize = usize::MAX;

    /// Build the scheduler around a caller-owned, fixed-capacity task table.
    ///
    /// The table's length is this core's `MAX_TASKS`: every slot starts out
    /// empty, and [`Scheduler::create_task`] claims them in order.
    pub const fn new(task_table: &'static [Tcb]) -> Scheduler {
        assert!(!task_table.is_empty(), "a scheduler needs at least one TCB slot");
        Scheduler {
            current_task: AtomicUsize::new(Self::NO_CURRENT_TASK),
            task_table,
            task_count: AtomicUsize::new(0),
            tick: TickCounter::new(),
        }
    }

    /// Register a new task.
    ///
    /// Must be called before [`Scheduler::start`], and at most once per
    /// slot in the task table this scheduler was built with. Calling it
    /// more times than that halts the core rather than corrupting the
    /// table.
    pub fn create_task<const N: usize>(&self, entry: TaskEntryFn, stack: &'static Stack<N>) {
        assert!(
            N > Tcb::MIN_STACK_SIZE,
            "task stack is too small to hold a full context frame"
        );

        let slot = self.task_count.load(Ordering::Relaxed);
        let Some(tcb) = self.task_table.get(slot) else {
            crate::logging::log_error!("create_task: task table is full, halting");
            port::halt();
        };
        debug_assert!(tcb.is_unused(), "slot {slot} was already claimed");

        // SAFETY: the caller-supplied stack is at least `MIN_STACK_SIZE`
        // bytes, which is enough room for one full frame.
        let mut pusher = unsafe { StackPusher::new(stack.top()) };
        push_initial_frame(&mut pusher, entry);
        if cfg!(arm_abi = "eabihf") {
            push_fpu_frame(&mut pusher);
        }

        // SAFETY: `pusher.current()` is the top of a fully-initialized
        // frame on a stack that outlives the scheduler (`'static`).
        unsafe {
            tcb.set_stack(pusher.current());
        }
        tcb.set_wake_tick(0);

        // The newest task always closes the ring back to slot 0; the
        // previous tail (which, by this same rule, still points at slot 0)
        // is retargeted at the slot we just filled.
        tcb.set_next(0);
        if slot > 0 {
            self.task_table[slot - 1].set_next(slot as u8);
        }

        crate::logging::log_info!(
            "create_task: slot {=usize}, stack top 0x{=usize:08x}, frame base 0x{=usize:08x}",
            slot,
            stack.top() as usize,
            pusher.current() as usize
        );

        self.task_count.store(slot + 1, Ordering::Relaxed);
    }

    /// Run the scheduler. Never returns: once interrupts are enabled, the
    /// pending scheduling exception fires and the first task starts
    /// running on its own stack.
    ///
    /// Must be called exactly once, after at least one task has been
    /// created, with interrupts still globally disabled.
    pub fn start(&'static self, mut syst: port::Syst, systicks_per_sched_tick: u32) -> ! {
        assert!(
            self.task_count.load(Ordering::Relaxed) > 0,
            "start() called with no tasks created"
        );
        if self
            .current_task
            .load(Ordering::SeqCst)
            != Self::NO_CURRENT_TASK
        {
            panic!("tried to restart an already-running scheduler");
        }

        crate::logging::log_info!(
            "SCHEDULER_PTR @ 0x{=usize:08x}",
            core::ptr::addr_of!(SCHEDULER_PTR) as usize
        );
        let self_addr = self as *const Scheduler as *mut Scheduler;
        crate::logging::log_info!("Scheduler @ 0x{=usize:08x}", self_addr as usize);
        SCHEDULER_PTR.store(self_addr, Ordering::Release);

        // Must happen after SCHEDULER_PTR is published - SysTick can fire
        // as soon as the counter is armed.
        syst.set_reload(systicks_per_sched_tick);
        syst.clear_current();
        syst.enable_counter();
        syst.enable_interrupt();

        // PendSV always advances `current_task = current_task->next`, even
        // on its very first invocation (only the *save* half is skipped
        // there, keyed off PSP == 0, not off `current_task`). So before that
        // first invocation, `current_task` must already name a real slot
        // whose `next` is the task that should actually run first: the most
        // recently created one, whose `next` closes the ring back to slot 0.
        let tail = self.task_count.load(Ordering::Relaxed) - 1;
        self.current_task.store(tail, Ordering::SeqCst);

        port::configure_pendsv_lowest_priority();
        port::clear_process_stack_pointer();
        port::trigger_switch();

        // SAFETY: the task table and PendSV are both fully configured, and
        // this is the one and only place interrupts are ever enabled.
        unsafe {
            port::enable_interrupts();
        }

        unreachable!("PendSV fires as soon as interrupts are enabled");
    }

    /// Called from the `SysTick` handler. Advances the tick counter; does
    /// nothing else (no task is woken here - a delayed task keeps
    /// re-triggering the scheduler itself until its own deadline passes).
    pub(crate) fn sched_tick(&self) {
        self.tick.increment();
    }

    /// The current monotonic tick count.
    pub(crate) fn now(&self) -> u64 {
        self.tick.read()
    }

    /// Cooperatively give up the CPU for one round-robin turn.
    pub(crate) fn yield_current_task(&self) {
        port::trigger_switch();
    }

    /// The TCB of the task that is (or is about to be) running, so `delay`
    /// can stamp its own wake tick into it.
    ///
    /// Returns `None` before the scheduler has run its first task.
    pub(crate) fn current_tcb(&self) -> Option<&Tcb> {
        let idx = self.current_task.load(Ordering::Relaxed);
        if idx == Self::NO_CURRENT_TASK {
            None
        } else {
            self.task_table.get(idx)
        }
    }

    /// Get the handle to the global scheduler instance, if `start` has
    /// published one.
    pub(crate) fn get_scheduler() -> Option<&'static Scheduler> {
        let scheduler_ptr = SCHEDULER_PTR.load(Ordering::Acquire);
        if scheduler_ptr.is_null() {
            None
        } else {
            // SAFETY: only `start` ever writes `SCHEDULER_PTR`, and only
            // with the address of a `&'static Scheduler` that never moves.
            Some(unsafe { &*scheduler_ptr })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_a() -> ! {
        loop {}
    }
    fn task_b() -> ! {
        loop {}
    }
    fn task_c() -> ! {
        loop {}
    }

    #[test]
    fn ring_visits_every_slot_exactly_once() {
        static TABLE: [Tcb; 4] = [Tcb::empty(), Tcb::empty(), Tcb::empty(), Tcb::empty()];
        static STACK_A: Stack<256> = Stack::new();
        static STACK_B: Stack<256> = Stack::new();
        static STACK_C: Stack<256> = Stack::new();
        let scheduler = Scheduler::new(&TABLE);

        scheduler.create_task(task_a, &STACK_A);
        scheduler.create_task(task_b, &STACK_B);
        scheduler.create_task(task_c, &STACK_C);

        // following `next` from any slot visits all N created slots
        // exactly once before returning to the start.
        for start in 0..3u8 {
            let mut seen = [false; 3];
            let mut idx = start;
            for _ in 0..3 {
                assert!(!seen[idx as usize], "slot {idx} visited twice");
                seen[idx as usize] = true;
                idx = TABLE[idx as usize].next();
            }
            assert_eq!(idx, start, "ring did not close back on slot {start}");
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn single_task_ring_is_a_self_loop() {
        static TABLE: [Tcb; 2] = [Tcb::empty(), Tcb::empty()];
        static STACK: Stack<256> = Stack::new();
        let scheduler = Scheduler::new(&TABLE);
        scheduler.create_task(task_a, &STACK);
        assert_eq!(TABLE[0].next(), 0);
    }

    #[test]
    fn newest_task_always_points_back_to_slot_zero() {
        static TABLE: [Tcb; 4] = [Tcb::empty(), Tcb::empty(), Tcb::empty(), Tcb::empty()];
        static STACK_A: Stack<256> = Stack::new();
        static STACK_B: Stack<256> = Stack::new();
        let scheduler = Scheduler::new(&TABLE);
        scheduler.create_task(task_a, &STACK_A);
        assert_eq!(TABLE[0].next(), 0);
        scheduler.create_task(task_b, &STACK_B);
        assert_eq!(TABLE[0].next(), 1);
        assert_eq!(TABLE[1].next(), 0);
    }

    #[test]
    #[should_panic(expected = "too small")]
    fn rejects_undersized_stacks() {
        static TABLE: [Tcb; 1] = [Tcb::empty()];
        static TINY_STACK: Stack<4> = Stack::new();
        let scheduler = Scheduler::new(&TABLE);
        scheduler.create_task(task_a, &TINY_STACK);
    }

    #[test]
    fn before_start_there_is_no_current_task() {
        static TABLE: [Tcb; 1] = [Tcb::empty()];
        let scheduler = Scheduler::new(&TABLE);
        assert!(scheduler.current_tcb().is_none());
    }

    #[test]
    fn start_seeds_current_task_with_the_tail_slot() {
        // `start` never returns (PendSV fires as soon as interrupts are
        // enabled), so on the host - where PendSV never actually fires -
        // it ends in `unreachable!()`. Catch that to inspect the state it
        // left behind: `current_task` must already name the most recently
        // created slot, so PendSV's first, unconditional `->next` step
        // lands on slot 0.
        static TABLE: [Tcb; 3] = [Tcb::empty(), Tcb::empty(), Tcb::empty()];
        static STACK_A: Stack<256> = Stack::new();
        static STACK_B: Stack<256> = Stack::new();
        static SCHEDULER: Scheduler = Scheduler::new(&TABLE);
        SCHEDULER.create_task(task_a, &STACK_A);
        SCHEDULER.create_task(task_b, &STACK_B);

        let result = std::panic::catch_unwind(|| {
            SCHEDULER.start(port::Syst::default(), 1_000);
        });
        assert!(result.is_err(), "start() must never return");
        assert_eq!(SCHEDULER.current_task.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn over_capacity_creation_halts_without_corrupting_the_table() {
        // The host fake for `port::halt()` panics instead of spinning
        // forever, so the over-capacity path is observable here via
        // `catch_unwind` - on target this is an infinite `bkpt` loop
        // instead, per spec.md S4.
        static TABLE: [Tcb; 1] = [Tcb::empty()];
        static STACK_A: Stack<256> = Stack::new();
        static STACK_B: Stack<256> = Stack::new();
        let scheduler = Scheduler::new(&TABLE);
        scheduler.create_task(task_a, &STACK_A);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scheduler.create_task(task_b, &STACK_B);
        }));
        assert!(result.is_err(), "create_task past capacity must halt");

        // The one slot that was validly claimed is untouched by the
        // rejected second call.
        assert_eq!(TABLE[0].next(), 0);
        assert!(!TABLE[0].is_unused());
    }
}

// End of File
