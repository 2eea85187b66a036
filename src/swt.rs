//! Software-timer multiplexer: virtualizes one periodic hardware tick into a
//! fixed table of independent one-shot or periodic timers.
//!
//! Callers supply the backing table (`&mut [TimerSlot]`) and a hardware
//! interface; no allocation happens anywhere in this module.

use crate::log::trace;

/// How a slot is driven and where its callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// Fires once; callback deferred to [`SoftwareTimers::task`].
    #[default]
    SingleFromLoop,
    /// Fires repeatedly; callback deferred to [`SoftwareTimers::task`].
    PeriodicFromLoop,
    /// Fires once; callback runs inline from [`SoftwareTimers::isr`].
    SingleFromISR,
    /// Fires repeatedly; callback runs inline from [`SoftwareTimers::isr`].
    PeriodicFromISR,
}

/// A timer's callback, discriminated at the type level rather than by a
/// separate `is_simple` flag paired with a raw pointer.
#[derive(Clone, Copy, Default)]
pub enum TimerHandler {
    #[default]
    None,
    /// Nullary callback.
    Simple(fn()),
    /// Callback receiving the slot index and two opaque caller pointers.
    Full(fn(usize, *mut (), *mut ())),
}

/// One software-timer record. Callers own the backing array; `Default`
/// produces a stopped, unconfigured slot.
#[derive(Clone, Copy, Default)]
pub struct TimerSlot {
    threshold: u32,
    counter: u32,
    mode: TimerMode,
    handler: TimerHandler,
    arg1: *mut (),
    arg2: *mut (),
    is_run: bool,
    is_waiting: bool,
}

/// The narrow capability interface this module needs from the MCU: the
/// tick period, and a way to mask the interrupt that calls [`SoftwareTimers::isr`].
///
/// `hw_start`/`hw_stop`/`hw_is_started` are optional as a group: leave all
/// three at their default (no-op / "not supported") if the hardware tick
/// runs continuously regardless of whether any slot is armed.
pub trait TimerHardware {
    /// Milliseconds represented by one call to [`SoftwareTimers::isr`].
    fn tick_ms(&self) -> u32;
    /// Mask the interrupt that invokes `isr`.
    fn isr_disable(&mut self);
    /// Unmask it.
    fn isr_enable(&mut self);

    /// Whether this implementation supports gating the hardware tick on
    /// slot activity. Defaults to unsupported (always-on tick).
    fn has_hw_control(&self) -> bool {
        false
    }
    fn hw_start(&mut self) {}
    fn hw_stop(&mut self) {}
    fn hw_is_started(&self) -> bool {
        false
    }
}

/// The software-timer multiplexer itself, borrowing its hardware handle and
/// table for its whole lifetime.
pub struct SoftwareTimers<'a, H: TimerHardware> {
    hw: &'a mut H,
    slots: &'a mut [TimerSlot],
}

impl<'a, H: TimerHardware> SoftwareTimers<'a, H> {
    /// Wire up the multiplexer. `slots` becomes the timer table; its length
    /// is the number of timers. Every slot starts stopped.
    pub fn new(hw: &'a mut H, slots: &'a mut [TimerSlot]) -> Self {
        assert!(!slots.is_empty(), "swt: timer table must have at least one slot");
        for slot in slots.iter_mut() {
            *slot = TimerSlot::default();
        }
        let mut inst = Self { hw, slots };
        inst.sync_hw_gate();
        inst
    }

    /// Stop every slot and, if supported, the hardware tick.
    pub fn deinit(&mut self) {
        for idx in 0..self.slots.len() {
            self.hw.isr_disable();
            self.slots[idx] = TimerSlot::default();
            self.hw.isr_enable();
        }
        self.sync_hw_gate();
    }

    /// (Re)arm `idx` with a two-argument callback.
    pub fn start(
        &mut self,
        idx: usize,
        ms: u32,
        mode: TimerMode,
        handler: fn(usize, *mut (), *mut ()),
        arg1: *mut (),
        arg2: *mut (),
    ) {
        self.start_inner(idx, ms, mode, TimerHandler::Full(handler), arg1, arg2);
    }

    /// (Re)arm `idx` with a nullary callback.
    pub fn start_simple(&mut self, idx: usize, ms: u32, mode: TimerMode, handler: fn()) {
        self.start_inner(
            idx,
            ms,
            mode,
            TimerHandler::Simple(handler),
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }

    /// (Re)arm `idx` with no callback at all, for callers that only poll
    /// [`Self::is_run`]. Always single-shot from the loop context.
    pub fn start_no_handler(&mut self, idx: usize, ms: u32) {
        self.start_inner(
            idx,
            ms,
            TimerMode::SingleFromLoop,
            TimerHandler::None,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }

    fn start_inner(
        &mut self,
        idx: usize,
        ms: u32,
        mode: TimerMode,
        handler: TimerHandler,
        arg1: *mut (),
        arg2: *mut (),
    ) {
        assert!(idx < self.slots.len(), "swt: slot index out of range");
        let tick_ms = self.hw.tick_ms();
        assert!(tick_ms > 0, "swt: hardware interface reported a zero tick period");
        self.stop(idx);
        let threshold = ms / tick_ms;
        {
            let slot = &mut self.slots[idx];
            slot.threshold = threshold;
            slot.mode = mode;
            slot.handler = handler;
            slot.arg1 = arg1;
            slot.arg2 = arg2;
        }
        self.hw.isr_disable();
        self.slots[idx].is_run = true;
        self.hw.isr_enable();
        self.sync_hw_gate();
        trace!("swt: slot {} armed for {} ms ({} ticks)", idx, ms, threshold);
    }

    /// Stop one slot. Idempotent.
    pub fn stop(&mut self, idx: usize) {
        assert!(idx < self.slots.len(), "swt: slot index out of range");
        self.hw.isr_disable();
        {
            let slot = &mut self.slots[idx];
            slot.is_run = false;
            slot.is_waiting = false;
            slot.counter = 0;
        }
        self.hw.isr_enable();
        self.sync_hw_gate();
    }

    /// Stop every slot.
    pub fn stop_all(&mut self) {
        for idx in 0..self.slots.len() {
            self.hw.isr_disable();
            {
                let slot = &mut self.slots[idx];
                slot.is_run = false;
                slot.is_waiting = false;
                slot.counter = 0;
            }
            self.hw.isr_enable();
        }
        self.sync_hw_gate();
    }

    /// Whether slot `idx` is running or has an undispatched expiry pending,
    /// and how many milliseconds it has been running (0 if neither).
    pub fn is_run(&mut self, idx: usize) -> (bool, u32) {
        assert!(idx < self.slots.len(), "swt: slot index out of range");
        self.hw.isr_disable();
        let (running, waiting, counter) = {
            let slot = &self.slots[idx];
            (slot.is_run, slot.is_waiting, slot.counter)
        };
        self.hw.isr_enable();
        let active = running || waiting;
        let ms = if active { counter * self.hw.tick_ms() } else { 0 };
        (active, ms)
    }

    /// Run every callback deferred by the ISR since the last call, then
    /// resync the hardware tick gate.
    pub fn task(&mut self) {
        for idx in 0..self.slots.len() {
            self.hw.isr_disable();
            let waiting = self.slots[idx].is_waiting;
            self.hw.isr_enable();
            if !waiting {
                continue;
            }
            let (handler, arg1, arg2) = {
                let slot = &self.slots[idx];
                (slot.handler, slot.arg1, slot.arg2)
            };
            trace!("swt: slot {} dispatched from task", idx);
            match handler {
                TimerHandler::Full(f) => f(idx, arg1, arg2),
                TimerHandler::Simple(f) => f(),
                TimerHandler::None => {}
            }
            self.hw.isr_disable();
            self.slots[idx].is_waiting = false;
            self.hw.isr_enable();
        }
        self.sync_hw_gate();
    }

    /// Advance every running slot by one tick. Called from the hardware
    /// timer interrupt; interrupts are assumed already masked by hardware
    /// entry, so this does not itself take the `isr_disable`/`isr_enable`
    /// bracket used by the foreground methods.
    pub fn isr(&mut self) {
        for idx in 0..self.slots.len() {
            let slot = &mut self.slots[idx];
            if !slot.is_run {
                continue;
            }
            slot.counter += 1;
            if slot.counter < slot.threshold {
                continue;
            }
            let dispatch_inline = matches!(slot.mode, TimerMode::SingleFromISR | TimerMode::PeriodicFromISR);
            match slot.mode {
                TimerMode::SingleFromLoop | TimerMode::SingleFromISR => slot.is_run = false,
                TimerMode::PeriodicFromLoop | TimerMode::PeriodicFromISR => slot.counter = 0,
            }
            trace!("swt: slot {} fired ({:?})", idx, slot.mode);
            if dispatch_inline {
                let (handler, arg1, arg2) = (slot.handler, slot.arg1, slot.arg2);
                match handler {
                    TimerHandler::Full(f) => f(idx, arg1, arg2),
                    TimerHandler::Simple(f) => f(),
                    TimerHandler::None => {}
                }
            } else if !matches!(slot.handler, TimerHandler::None) {
                slot.is_waiting = true;
            }
        }
    }

    fn sync_hw_gate(&mut self) {
        if !self.hw.has_hw_control() {
            return;
        }
        let any_active = self.slots.iter().any(|s| s.is_run || s.is_waiting);
        let started = self.hw.hw_is_started();
        if any_active && !started {
            self.hw.hw_start();
        } else if !any_active && started {
            self.hw.hw_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FakeHw {
        tick_ms: u32,
        hw_control: bool,
        started: Cell<bool>,
    }

    impl TimerHardware for FakeHw {
        fn tick_ms(&self) -> u32 {
            self.tick_ms
        }
        fn isr_disable(&mut self) {}
        fn isr_enable(&mut self) {}
        fn has_hw_control(&self) -> bool {
            self.hw_control
        }
        fn hw_start(&mut self) {
            self.started.set(true);
        }
        fn hw_stop(&mut self) {
            self.started.set(false);
        }
        fn hw_is_started(&self) -> bool {
            self.started.get()
        }
    }

    static mut HANDLER_HITS: u32 = 0;

    fn count_hit(_idx: usize, _a1: *mut (), _a2: *mut ()) {
        unsafe { HANDLER_HITS += 1 };
    }

    fn hits() -> u32 {
        unsafe { HANDLER_HITS }
    }

    fn reset_hits() {
        unsafe { HANDLER_HITS = 0 };
    }

    // S1: SingleFromLoop, N=10, threshold=2 ticks.
    #[test]
    fn single_from_loop_fires_once_after_task() {
        reset_hits();
        let mut hw = FakeHw { tick_ms: 1, hw_control: true, started: Cell::new(false) };
        let mut table = [TimerSlot::default(); 10];
        let mut swt = SoftwareTimers::new(&mut hw, &mut table);

        for i in 0..10 {
            swt.start(i, 2, TimerMode::SingleFromLoop, count_hit, core::ptr::null_mut(), core::ptr::null_mut());
        }
        for i in 0..10 {
            assert_eq!(swt.is_run(i), (true, 0));
        }
        assert!(swt.hw.hw_is_started());

        swt.isr();
        assert_eq!(swt.is_run(0).1, 1);

        swt.task();
        assert_eq!(hits(), 0);
        for i in 0..10 {
            assert_eq!(swt.is_run(i).0, true);
        }

        swt.isr();
        assert_eq!(swt.is_run(0).1, 2);

        swt.task();
        assert_eq!(hits(), 10);
        for i in 0..10 {
            assert_eq!(swt.is_run(i).0, false);
        }
        assert!(!swt.hw.hw_is_started());
    }

    // S2: PeriodicFromISR, N=10, threshold=2 ticks.
    #[test]
    fn periodic_from_isr_dispatches_inline_every_cycle() {
        reset_hits();
        let mut hw = FakeHw { tick_ms: 1, hw_control: false, started: Cell::new(false) };
        let mut table = [TimerSlot::default(); 10];
        let mut swt = SoftwareTimers::new(&mut hw, &mut table);
        for i in 0..10 {
            swt.start(i, 2, TimerMode::PeriodicFromISR, count_hit, core::ptr::null_mut(), core::ptr::null_mut());
        }

        swt.isr();
        assert_eq!(hits(), 0);
        swt.isr();
        assert_eq!(hits(), 10);
        swt.isr();
        assert_eq!(hits(), 10);
        swt.isr();
        assert_eq!(hits(), 20);
    }

    #[test]
    fn stop_clears_run_and_pending_wait() {
        let mut hw = FakeHw { tick_ms: 1, hw_control: false, started: Cell::new(false) };
        let mut table = [TimerSlot::default(); 2];
        let mut swt = SoftwareTimers::new(&mut hw, &mut table);
        swt.start(0, 1, TimerMode::SingleFromLoop, count_hit, core::ptr::null_mut(), core::ptr::null_mut());
        swt.isr();
        swt.stop(0);
        assert_eq!(swt.is_run(0), (false, 0));
    }

    #[test]
    fn start_no_handler_never_sets_waiting() {
        let mut hw = FakeHw { tick_ms: 1, hw_control: false, started: Cell::new(false) };
        let mut table = [TimerSlot::default(); 1];
        let mut swt = SoftwareTimers::new(&mut hw, &mut table);
        swt.start_no_handler(0, 1);
        swt.isr();
        let (active, ms) = swt.is_run(0);
        assert!(!active);
        assert_eq!(ms, 0);
    }

    #[test]
    #[should_panic]
    fn out_of_range_index_panics() {
        let mut hw = FakeHw { tick_ms: 1, hw_control: false, started: Cell::new(false) };
        let mut table = [TimerSlot::default(); 1];
        let mut swt = SoftwareTimers::new(&mut hw, &mut table);
        swt.stop(5);
    }
}
