//! Software-timer multiplexing, LED blink sequencing, and debounced button
//! events for bare-metal targets with no dynamic allocation.
//!
//! The three modules are layered: [`swt`] virtualizes one hardware tick into
//! a fixed table of independent timers; [`led`] and [`btn`] each claim one
//! timer slot per LED/button and drive GPIO through a small caller-supplied
//! hardware interface.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

pub mod btn;
pub mod led;
pub mod swt;

pub use btn::{ButtonCheckType, ButtonEvent, ButtonHardware, ButtonSlot, Buttons};
pub use led::{LedHardware, LedSlot, Leds};
pub use swt::{SoftwareTimers, TimerHandler, TimerHardware, TimerMode, TimerSlot};
