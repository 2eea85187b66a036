//! LED blink sequencer: drives a GPIO output through a repeating
//! pulse/pause/wait pattern, built on one claimed [`crate::swt`] slot per LED.

use embedded_hal::digital::PinState;

use crate::log::trace;
use crate::swt::{SoftwareTimers, TimerHardware};

/// Where a LED currently sits in its blink pattern. `Pause` covers the
/// short inter-pulse gap, the long inter-series wait, and the initial delay
/// alike — the transition out of `Pause` is always "turn on, start a pulse".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlinkState {
    #[default]
    Disabled,
    Pulse,
    Pause,
}

/// One LED's configuration, pattern, and run state. `Default` produces an
/// unconfigured, disabled LED.
#[derive(Clone, Copy, Default)]
pub struct LedSlot {
    gpio_pin: usize,
    timer_id: usize,
    is_active_high: bool,
    series: u16,
    pulse_ms: u32,
    pause_ms: u32,
    wait_ms: u32,
    delay_ms: u32,
    is_inverted: bool,
    pulse_counter: u16,
    blink_state: BlinkState,
}

/// The narrow capability interface this module needs: drive or toggle one
/// GPIO line, addressed by index (one hardware interface commonly serves
/// several LEDs).
pub trait LedHardware {
    fn gpio_write(&mut self, pin_idx: usize, level: PinState);
    fn gpio_toggle(&mut self, pin_idx: usize);
}

/// The blink sequencer, owning its GPIO handle and LED table for its whole
/// lifetime. Each LED claims one software-timer slot, identified by
/// `timer_id`, on the [`SoftwareTimers`] instance passed into [`Leds::task`]
/// and the `blink*` methods.
pub struct Leds<'a, H: LedHardware> {
    hw: &'a mut H,
    slots: &'a mut [LedSlot],
}

impl<'a, H: LedHardware> Leds<'a, H> {
    pub fn new(hw: &'a mut H, slots: &'a mut [LedSlot]) -> Self {
        for slot in slots.iter_mut() {
            *slot = LedSlot::default();
        }
        Self { hw, slots }
    }

    /// Bind LED `idx` to a GPIO pin and the timer slot it will claim.
    pub fn configure(&mut self, idx: usize, gpio_pin: usize, timer_id: usize, is_active_high: bool) {
        assert!(idx < self.slots.len(), "led: index out of range");
        let slot = &mut self.slots[idx];
        slot.gpio_pin = gpio_pin;
        slot.timer_id = timer_id;
        slot.is_active_high = is_active_high;
        slot.blink_state = BlinkState::Disabled;
    }

    /// Start a plain blink pattern: `series` pulses of `pulse_ms` separated
    /// by `pause_ms`, repeating every `period_ms` (0 for a single series).
    pub fn blink<TH: TimerHardware>(
        &mut self,
        timers: &mut SoftwareTimers<'_, TH>,
        idx: usize,
        series: u16,
        pulse_ms: u32,
        pause_ms: u32,
        period_ms: u32,
    ) {
        self.blink_ext(timers, idx, series, pulse_ms, pause_ms, period_ms, 0, false);
    }

    /// Full pattern, with an initial delay before the first pulse and an
    /// optional polarity swap within the pattern.
    pub fn blink_ext<TH: TimerHardware>(
        &mut self,
        timers: &mut SoftwareTimers<'_, TH>,
        idx: usize,
        series: u16,
        pulse_ms: u32,
        pause_ms: u32,
        period_ms: u32,
        delay_ms: u32,
        is_inverted: bool,
    ) {
        assert!(idx < self.slots.len(), "led: index out of range");
        assert!(series >= 1, "led: series must be at least 1");
        assert!(pulse_ms > 0, "led: pulse_ms must be nonzero");
        let min_period = series as u32 * pulse_ms + (series as u32 - 1) * pause_ms;
        assert!(
            period_ms == 0 || period_ms >= min_period,
            "led: period_ms too small for series/pulse_ms/pause_ms"
        );
        let wait_ms = if period_ms == 0 { 0 } else { period_ms - min_period };

        {
            let slot = &mut self.slots[idx];
            slot.series = series;
            slot.pulse_ms = pulse_ms;
            slot.pause_ms = pause_ms;
            slot.wait_ms = wait_ms;
            slot.delay_ms = delay_ms;
            slot.is_inverted = is_inverted;
            slot.pulse_counter = 0;
        }
        let timer_id = self.slots[idx].timer_id;
        if delay_ms > 0 {
            self.slots[idx].blink_state = BlinkState::Pause;
            self.drive_pattern(idx, false);
            timers.start_no_handler(timer_id, delay_ms);
        } else {
            self.slots[idx].blink_state = BlinkState::Pulse;
            self.drive_pattern(idx, true);
            timers.start_no_handler(timer_id, pulse_ms);
        }
        trace!("led: slot {} pattern armed", idx);
    }

    /// Equivalent to a single 1:1 on/off series repeating forever.
    pub fn meander<TH: TimerHardware>(&mut self, timers: &mut SoftwareTimers<'_, TH>, idx: usize, duration_ms: u32) {
        assert!(duration_ms > 0, "led: meander duration must be nonzero");
        self.blink_ext(timers, idx, 1, duration_ms, duration_ms, duration_ms.saturating_mul(2), 0, false);
    }

    /// Drive the GPIO on, leaving `blink_state` untouched — a resumed
    /// pattern will overwrite this on its next expiry.
    pub fn switch_on(&mut self, idx: usize) {
        self.drive_active_high(idx, true);
    }
    pub fn switch_off(&mut self, idx: usize) {
        self.drive_active_high(idx, false);
    }
    pub fn switch_toggle(&mut self, idx: usize) {
        assert!(idx < self.slots.len(), "led: index out of range");
        let pin = self.slots[idx].gpio_pin;
        self.hw.gpio_toggle(pin);
    }

    /// Drive the GPIO and abandon the pattern (`blink_state = Disabled`).
    pub fn on(&mut self, idx: usize) {
        self.switch_on(idx);
        self.slots[idx].blink_state = BlinkState::Disabled;
    }
    pub fn off(&mut self, idx: usize) {
        self.switch_off(idx);
        self.slots[idx].blink_state = BlinkState::Disabled;
    }
    pub fn toggle(&mut self, idx: usize) {
        self.switch_toggle(idx);
        self.slots[idx].blink_state = BlinkState::Disabled;
    }

    /// Advance every LED whose claimed timer has expired since the last
    /// call. Call once per main-loop pass, after `timers.task()`.
    pub fn task<TH: TimerHardware>(&mut self, timers: &mut SoftwareTimers<'_, TH>) {
        for idx in 0..self.slots.len() {
            if matches!(self.slots[idx].blink_state, BlinkState::Disabled) {
                continue;
            }
            let timer_id = self.slots[idx].timer_id;
            let (active, _) = timers.is_run(timer_id);
            if active {
                continue;
            }
            match self.slots[idx].blink_state {
                BlinkState::Pause => {
                    self.drive_pattern(idx, true);
                    let pulse_ms = self.slots[idx].pulse_ms;
                    self.slots[idx].blink_state = BlinkState::Pulse;
                    timers.start_no_handler(timer_id, pulse_ms);
                    trace!("led: slot {} Pause -> Pulse", idx);
                }
                BlinkState::Pulse => {
                    self.drive_pattern(idx, false);
                    self.slots[idx].pulse_counter += 1;
                    let (counter, series) = (self.slots[idx].pulse_counter, self.slots[idx].series);
                    if counter < series {
                        let pause_ms = self.slots[idx].pause_ms;
                        self.slots[idx].blink_state = BlinkState::Pause;
                        timers.start_no_handler(timer_id, pause_ms);
                        trace!("led: slot {} Pulse -> Pause (pulse {}/{})", idx, counter, series);
                    } else {
                        self.slots[idx].pulse_counter = 0;
                        let wait_ms = self.slots[idx].wait_ms;
                        if wait_ms > 0 {
                            self.slots[idx].blink_state = BlinkState::Pause;
                            timers.start_no_handler(timer_id, wait_ms);
                            trace!("led: slot {} Pulse -> Pause (series wait)", idx);
                        } else {
                            self.slots[idx].blink_state = BlinkState::Disabled;
                            trace!("led: slot {} Pulse -> Disabled (series complete)", idx);
                        }
                    }
                }
                BlinkState::Disabled => unreachable!(),
            }
        }
    }

    /// Write `lamp_on`, post `is_inverted`, respecting `is_active_high`.
    fn drive_pattern(&mut self, idx: usize, lamp_on: bool) {
        let slot = &self.slots[idx];
        let effective = lamp_on ^ slot.is_inverted;
        self.write_level(idx, effective);
    }

    /// Write `logical_on` directly, respecting only `is_active_high` —
    /// used by the instantaneous overrides, which sit outside the pattern.
    fn drive_active_high(&mut self, idx: usize, logical_on: bool) {
        assert!(idx < self.slots.len(), "led: index out of range");
        self.write_level(idx, logical_on);
    }

    fn write_level(&mut self, idx: usize, logical_on: bool) {
        let slot = &self.slots[idx];
        let physical_high = logical_on == slot.is_active_high;
        let pin = slot.gpio_pin;
        self.hw.gpio_write(pin, if physical_high { PinState::High } else { PinState::Low });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swt::{SoftwareTimers, TimerSlot};
    use heapless::Vec;

    struct FakeTimerHw {
        tick_ms: u32,
    }
    impl TimerHardware for FakeTimerHw {
        fn tick_ms(&self) -> u32 {
            self.tick_ms
        }
        fn isr_disable(&mut self) {}
        fn isr_enable(&mut self) {}
    }

    struct FakeLedHw {
        writes: Vec<(usize, bool), 32>,
    }
    impl LedHardware for FakeLedHw {
        fn gpio_write(&mut self, pin_idx: usize, level: PinState) {
            let _ = self.writes.push((pin_idx, level == PinState::High));
        }
        fn gpio_toggle(&mut self, _pin_idx: usize) {}
    }

    fn run_ticks<TH: TimerHardware>(timers: &mut SoftwareTimers<'_, TH>, n: u32) {
        for _ in 0..n {
            timers.isr();
        }
    }

    // S3: series=2, pulse=50, pause=100, period=0 (single series, then off).
    #[test]
    fn simple_blink_sequence() {
        let mut timer_hw = FakeTimerHw { tick_ms: 1 };
        let mut timer_table = [TimerSlot::default(); 1];
        let mut timers = SoftwareTimers::new(&mut timer_hw, &mut timer_table);

        let mut led_hw = FakeLedHw { writes: Vec::new() };
        let mut led_table = [LedSlot::default(); 1];
        let mut leds = Leds::new(&mut led_hw, &mut led_table);

        leds.configure(0, 7, 0, true);
        leds.blink(&mut timers, 0, 2, 50, 100, 0);

        run_ticks(&mut timers, 50);
        leds.task(&mut timers);
        run_ticks(&mut timers, 100);
        leds.task(&mut timers);
        run_ticks(&mut timers, 50);
        leds.task(&mut timers);

        assert!(matches!(leds.slots[0].blink_state, BlinkState::Disabled));
        assert_eq!(led_hw.writes.as_slice(), &[(7, true), (7, false), (7, true), (7, false)]);
    }

    // S4: meander is an infinitely repeating 1:1 series.
    #[test]
    fn meander_repeats_forever() {
        let mut timer_hw = FakeTimerHw { tick_ms: 1 };
        let mut timer_table = [TimerSlot::default(); 1];
        let mut timers = SoftwareTimers::new(&mut timer_hw, &mut timer_table);

        let mut led_hw = FakeLedHw { writes: Vec::new() };
        let mut led_table = [LedSlot::default(); 1];
        let mut leds = Leds::new(&mut led_hw, &mut led_table);

        leds.configure(0, 3, 0, true);
        leds.meander(&mut timers, 0, 20);

        for _ in 0..6 {
            run_ticks(&mut timers, 20);
            leds.task(&mut timers);
            assert!(!matches!(leds.slots[0].blink_state, BlinkState::Disabled));
        }
        assert_eq!(led_hw.writes.len(), 7); // initial pulse-on + 6 toggles
    }

    #[test]
    fn instantaneous_override_leaves_pattern_disabled() {
        let mut timer_hw = FakeTimerHw { tick_ms: 1 };
        let mut timer_table = [TimerSlot::default(); 1];
        let mut timers = SoftwareTimers::new(&mut timer_hw, &mut timer_table);
        let mut led_hw = FakeLedHw { writes: Vec::new() };
        let mut led_table = [LedSlot::default(); 1];
        let mut leds = Leds::new(&mut led_hw, &mut led_table);
        leds.configure(0, 1, 0, true);
        leds.blink(&mut timers, 0, 3, 10, 10, 0);
        leds.on(0);
        assert!(matches!(leds.slots[0].blink_state, BlinkState::Disabled));
    }
}
