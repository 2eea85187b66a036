//! Debounced button event engine: synthesizes press/release/hold/double-click
//! events from a raw GPIO level, sharing one [`crate::swt`] slot per button
//! across its debounce, hold, and double-click sub-phases.

use bitflags::bitflags;

use crate::log::trace;
use crate::swt::{SoftwareTimers, TimerHardware};

bitflags! {
    /// Bits preserved at their historical values for wire/API compatibility.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ButtonEvent: u8 {
        const PRESSED = 0x01;
        const RELEASED = 0x02;
        const HOLD = 0x04;
        const DOUBLE = 0x08;
    }
}

/// How a button's raw level is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonCheckType {
    #[default]
    Disabled,
    /// `task` reads the GPIO itself every pass.
    Polling,
    /// The caller pushes level changes in via [`Buttons::isr`].
    IsrNotified,
}

/// One button's configuration and run state. `Default` produces a disabled
/// button.
#[derive(Clone, Copy, Default)]
pub struct ButtonSlot {
    gpio_pin: usize,
    timer_id: usize,
    is_pressed_low: bool,
    check_type: ButtonCheckType,
    bouncing_ms: u32,
    double_click_ms: u32,
    hold_ms: u32,
    handler: Option<fn(usize, ButtonEvent, *mut ())>,
    arg: *mut (),
    is_pressed_raw: bool,
    is_changed: bool,
    is_pressed_debounced: bool,
    is_debouncing: bool,
    is_holding: bool,
    is_double_clicking: bool,
    /// Set when a press edge arrives while `is_double_clicking` was true,
    /// carrying that resolution through the new press's debounce phase
    /// without ever letting two of {debouncing, holding, double_clicking}
    /// be true at once.
    double_pending: bool,
}

/// The narrow capability interface this module needs: read one GPIO line by
/// index, and optionally bracket access to the raw-level cache used by the
/// `IsrNotified` path.
pub trait ButtonHardware {
    fn gpio_read(&mut self, pin_idx: usize) -> bool;

    fn has_isr_guard(&self) -> bool {
        false
    }
    fn isr_enable(&mut self) {}
    fn isr_disable(&mut self) {}
}

/// The button engine, owning its GPIO handle and button table for its whole
/// lifetime. Each button claims one software-timer slot, identified by
/// `timer_id`, on the [`SoftwareTimers`] instance passed into [`Buttons::task`].
pub struct Buttons<'a, H: ButtonHardware> {
    hw: &'a mut H,
    slots: &'a mut [ButtonSlot],
}

impl<'a, H: ButtonHardware> Buttons<'a, H> {
    pub fn new(hw: &'a mut H, slots: &'a mut [ButtonSlot]) -> Self {
        for slot in slots.iter_mut() {
            *slot = ButtonSlot::default();
        }
        Self { hw, slots }
    }

    /// Configure button `idx`. `hold_ms`/`double_click_ms`/`bouncing_ms` of
    /// 0 disable the corresponding sub-feature.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        &mut self,
        idx: usize,
        gpio_pin: usize,
        timer_id: usize,
        is_pressed_low: bool,
        check_type: ButtonCheckType,
        bouncing_ms: u32,
        double_click_ms: u32,
        hold_ms: u32,
        handler: fn(usize, ButtonEvent, *mut ()),
        arg: *mut (),
    ) {
        assert!(idx < self.slots.len(), "btn: index out of range");
        let slot = &mut self.slots[idx];
        *slot = ButtonSlot {
            gpio_pin,
            timer_id,
            is_pressed_low,
            check_type,
            bouncing_ms,
            double_click_ms,
            hold_ms,
            handler: Some(handler),
            arg,
            ..ButtonSlot::default()
        };
    }

    /// Feed a raw level change in from an external GPIO-edge interrupt.
    /// Ignored unless the button is configured for [`ButtonCheckType::IsrNotified`]
    /// (a button in any other mode never accepts notifications).
    pub fn isr(&mut self, idx: usize, gpio_level_high: bool) {
        assert!(idx < self.slots.len(), "btn: index out of range");
        if !matches!(self.slots[idx].check_type, ButtonCheckType::IsrNotified) {
            return;
        }
        let pressed = resolve_pressed(gpio_level_high, self.slots[idx].is_pressed_low);
        let use_guard = self.hw.has_isr_guard();
        if use_guard {
            self.hw.isr_disable();
        }
        {
            let slot = &mut self.slots[idx];
            if slot.is_pressed_raw != pressed {
                slot.is_pressed_raw = pressed;
                slot.is_changed = true;
            }
        }
        if use_guard {
            self.hw.isr_enable();
        }
    }

    /// Advance every button's state machine by one pass, delivering at most
    /// one event mask per button via its configured handler.
    pub fn task<TH: TimerHardware>(&mut self, timers: &mut SoftwareTimers<'_, TH>) {
        for idx in 0..self.slots.len() {
            if matches!(self.slots[idx].check_type, ButtonCheckType::Disabled) {
                continue;
            }
            let edge = self.sample_edge(idx);
            let timer_id = self.slots[idx].timer_id;
            let mut event = ButtonEvent::empty();

            // Step 1: a raw change starts debouncing (or, with no debounce
            // configured, resolves immediately).
            if let Some(pressed) = edge {
                if pressed && self.slots[idx].is_double_clicking {
                    self.slots[idx].is_double_clicking = false;
                    self.slots[idx].double_pending = true;
                }
                self.slots[idx].is_holding = false;
                let bouncing_ms = self.slots[idx].bouncing_ms;
                if bouncing_ms > 0 {
                    self.slots[idx].is_debouncing = true;
                    timers.start_no_handler(timer_id, bouncing_ms);
                    trace!("btn: slot {} debounce start ({})", idx, pressed);
                } else {
                    self.slots[idx].is_pressed_debounced = pressed;
                    event |= if pressed { ButtonEvent::PRESSED } else { ButtonEvent::RELEASED };
                    event |= self.on_level_settled(timers, idx, pressed);
                }
            }

            // Step 2: debounce completion.
            if self.slots[idx].is_debouncing && !timers.is_run(timer_id).0 {
                self.slots[idx].is_debouncing = false;
                let pressed = self.slots[idx].is_pressed_raw;
                self.slots[idx].is_pressed_debounced = pressed;
                event |= if pressed { ButtonEvent::PRESSED } else { ButtonEvent::RELEASED };
                event |= self.on_level_settled(timers, idx, pressed);
            }

            // Step 3: hold completion.
            if self.slots[idx].is_holding && !timers.is_run(timer_id).0 {
                self.slots[idx].is_holding = false;
                event |= ButtonEvent::HOLD;
            }

            // Step 5: double-click window expired with no second press.
            if self.slots[idx].is_double_clicking && !timers.is_run(timer_id).0 {
                self.slots[idx].is_double_clicking = false;
            }

            debug_assert!(!(event.contains(ButtonEvent::PRESSED) && event.contains(ButtonEvent::RELEASED)));
            debug_assert!(!(event.contains(ButtonEvent::RELEASED) && event.contains(ButtonEvent::HOLD)));
            debug_assert!(!(event.contains(ButtonEvent::RELEASED) && event.contains(ButtonEvent::DOUBLE)));
            debug_assert!(!(event.contains(ButtonEvent::HOLD) && event.contains(ButtonEvent::DOUBLE)));
            debug_assert!(
                (self.slots[idx].is_debouncing as u8
                    + self.slots[idx].is_holding as u8
                    + self.slots[idx].is_double_clicking as u8)
                    <= 1
            );

            if !event.is_empty() {
                if let Some(handler) = self.slots[idx].handler {
                    let arg = self.slots[idx].arg;
                    handler(idx, event, arg);
                    trace!("btn: slot {} event {:?}", idx, event);
                }
            }
        }
    }

    /// Steps 4 and 6: once a level is settled (immediately, or after
    /// debounce), arm the next sub-phase timer, or resolve a pending
    /// double-click.
    fn on_level_settled<TH: TimerHardware>(
        &mut self,
        timers: &mut SoftwareTimers<'_, TH>,
        idx: usize,
        pressed: bool,
    ) -> ButtonEvent {
        let timer_id = self.slots[idx].timer_id;
        if pressed {
            if self.slots[idx].double_pending {
                self.slots[idx].double_pending = false;
                timers.stop(timer_id);
                trace!("btn: slot {} double-click resolved", idx);
                ButtonEvent::DOUBLE
            } else {
                let hold_ms = self.slots[idx].hold_ms;
                if hold_ms > 0 {
                    self.slots[idx].is_holding = true;
                    timers.start_no_handler(timer_id, hold_ms);
                    trace!("btn: slot {} hold armed", idx);
                }
                ButtonEvent::empty()
            }
        } else {
            let double_click_ms = self.slots[idx].double_click_ms;
            if double_click_ms > 0 {
                self.slots[idx].is_double_clicking = true;
                timers.start_no_handler(timer_id, double_click_ms);
                trace!("btn: slot {} double-click window armed", idx);
            }
            ButtonEvent::empty()
        }
    }

    fn sample_edge(&mut self, idx: usize) -> Option<bool> {
        match self.slots[idx].check_type {
            ButtonCheckType::Polling => {
                let pin = self.slots[idx].gpio_pin;
                let level_high = self.hw.gpio_read(pin);
                let pressed = resolve_pressed(level_high, self.slots[idx].is_pressed_low);
                if pressed != self.slots[idx].is_pressed_raw {
                    self.slots[idx].is_pressed_raw = pressed;
                    Some(pressed)
                } else {
                    None
                }
            }
            ButtonCheckType::IsrNotified => {
                let use_guard = self.hw.has_isr_guard();
                if use_guard {
                    self.hw.isr_disable();
                }
                let (changed, pressed) = {
                    let slot = &mut self.slots[idx];
                    let changed = slot.is_changed;
                    slot.is_changed = false;
                    (changed, slot.is_pressed_raw)
                };
                if use_guard {
                    self.hw.isr_enable();
                }
                if changed {
                    Some(pressed)
                } else {
                    None
                }
            }
            ButtonCheckType::Disabled => None,
        }
    }
}

fn resolve_pressed(level_high: bool, is_pressed_low: bool) -> bool {
    if is_pressed_low {
        !level_high
    } else {
        level_high
    }
}
