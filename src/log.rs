//! Internal tracing hooks, compiled away unless the `defmt` feature is on.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    };
}

pub(crate) use trace;
