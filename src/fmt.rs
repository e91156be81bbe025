// Logging shim after esp-hal's fmt.rs: https://github.com/esp-rs/esp-hal/blob/main/esp-hal/src/fmt.rs
//
// Every macro forwards to `log` or `defmt`, whichever feature is enabled, and otherwise
// swallows its arguments so call sites never need a `cfg`.

#![macro_use]
#![allow(unused_macros)]

macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(feature = "log")] {
                    ::log::$level!($s $(, $x)*);
                } else if #[cfg(feature = "defmt")] {
                    ::defmt::$level!($s $(, $x)*);
                } else {
                    let _ = ($( & $x ),*);
                }
            }
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        log_at!(trace, $($arg)*)
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log_at!(debug, $($arg)*)
    };
}

macro_rules! info {
    ($($arg:tt)*) => {
        log_at!(info, $($arg)*)
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log_at!(warn, $($arg)*)
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        log_at!(error, $($arg)*)
    };
}
