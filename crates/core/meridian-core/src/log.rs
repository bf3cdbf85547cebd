//! Logging interface for the Meridian kernel.
//!
//! Provides [`kprint!`] / [`kprintln!`] macros for raw output and [`klog!`] /
//! convenience macros (`kinfo!`, `kdebug!`, etc.) for leveled logging.
//! Before [`set_print_fn`] / [`set_log_fn`] are called, output is silently
//! discarded. Leveled messages above [`MAX_LOG_LEVEL`] never reach the sink.
//!
//! [`MAX_LOG_LEVEL`]: crate::config::MAX_LOG_LEVEL

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::config::MAX_LOG_LEVEL;

// ---------------------------------------------------------------------------
// Log levels (lower is more severe)
// ---------------------------------------------------------------------------

/// Kernel log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Fatal: unrecoverable error, the processor will halt.
    Fatal = 0,
    /// Error: something failed but the system may continue.
    Error = 1,
    /// Warning: unexpected condition, not necessarily an error.
    Warn = 2,
    /// Informational: high-level progress messages.
    Info = 3,
    /// Debug: detailed diagnostic information.
    Debug = 4,
    /// Trace: very verbose, low-level tracing.
    Trace = 5,
}

impl LogLevel {
    /// Returns the human-readable name (fixed-width for aligned output).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Returns `true` if messages at this level pass the compile-time filter.
    pub const fn is_enabled(self) -> bool {
        self as u8 <= MAX_LOG_LEVEL as u8
    }
}

// ---------------------------------------------------------------------------
// Raw print function (kprint! / kprintln!), unleveled and unfiltered
// ---------------------------------------------------------------------------

/// The signature of the global print function.
pub type PrintFn = fn(fmt::Arguments<'_>);

fn null_print(_args: fmt::Arguments<'_>) {}

static PRINT_FN: AtomicPtr<()> = AtomicPtr::new(null_print as *mut ());

/// Registers the global print function.
///
/// # Safety
///
/// The provided function must be safe to call from any context, including
/// with interrupts disabled at dispatch level. May be called more than once.
pub unsafe fn set_print_fn(f: PrintFn) {
    PRINT_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn load_print_fn() -> PrintFn {
    let ptr = PRINT_FN.load(Ordering::Acquire);
    // SAFETY: We only ever store valid `PrintFn` function pointers into PRINT_FN.
    unsafe { core::mem::transmute::<*mut (), PrintFn>(ptr) }
}

/// Implementation detail for [`kprint!`] / [`kprintln!`]. Not public API.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    load_print_fn()(args);
}

/// Prints to the kernel log sink (raw, no level).
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => { $crate::log::_print(format_args!($($arg)*)) };
}

/// Prints to the kernel log sink with a trailing newline (raw, no level).
#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => { $crate::kprint!("{}\n", format_args!($($arg)*)) };
}

// ---------------------------------------------------------------------------
// Leveled log function (klog! and convenience macros)
// ---------------------------------------------------------------------------

/// The signature of the global leveled log function.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the global leveled log function.
///
/// # Safety
///
/// Same requirements as [`set_print_fn`].
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: We only ever store valid `LogFn` function pointers into LOG_FN.
    unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) }
}

/// Implementation detail for [`klog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level.is_enabled() {
        load_log_fn()(level, args);
    }
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs a fatal-level message (level 0).
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs a fatal-level message, then stops the processor by panicking.
///
/// Used for broken scheduler invariants: there is no safe place to unwind
/// to from the switch path.
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {
        match format_args!($($arg)*) {
            args => {
                $crate::log::_log($crate::log::LogLevel::Fatal, args);
                panic!("{}", args)
            }
        }
    };
}

/// Logs an error-level message (level 1).
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message (level 2).
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message (level 3).
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message (level 4).
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message (level 5).
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::Mutex;
    use std::vec::Vec;

    static CAPTURED: Mutex<Vec<(LogLevel, String)>> = Mutex::new(Vec::new());

    fn capture(level: LogLevel, args: fmt::Arguments<'_>) {
        CAPTURED.lock().unwrap().push((level, format!("{args}")));
    }

    #[test]
    fn level_names_fixed_width() {
        for level in [
            LogLevel::Fatal,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.name().len(), 5);
        }
    }

    #[test]
    fn severity_ordering() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn registered_sink_receives_enabled_levels() {
        // SAFETY: `capture` only takes a host mutex.
        unsafe { set_log_fn(capture) };
        crate::kfatal!("switch precondition violated on cpu {}", 3);
        crate::ktrace!("very chatty");

        let captured = CAPTURED.lock().unwrap();
        assert!(captured.contains(&(
            LogLevel::Fatal,
            String::from("switch precondition violated on cpu 3")
        )));
        let trace_seen = captured.iter().any(|(l, _)| *l == LogLevel::Trace);
        assert_eq!(trace_seen, LogLevel::Trace.is_enabled());
    }

    #[test]
    #[should_panic(expected = "owner mismatch on cpu 1")]
    fn kpanic_panics_with_message() {
        crate::kpanic!("owner mismatch on cpu {}", 1);
    }

    #[test]
    fn kpanic_formats_arguments_once() {
        use core::sync::atomic::AtomicUsize;

        static EVALUATED: AtomicUsize = AtomicUsize::new(0);
        fn cpu() -> usize {
            EVALUATED.fetch_add(1, Ordering::Relaxed)
        }

        let result = std::panic::catch_unwind(|| crate::kpanic!("fatal on cpu {}", cpu()));
        assert!(result.is_err());
        assert_eq!(EVALUATED.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unregistered_print_is_discarded() {
        crate::kprintln!("nobody is listening");
    }
}
