//! Runtime checks for the preconditions of unsafe hardware primitives.
//!
//! [`assert_unsafe_precondition!`] guards conditions that must hold before
//! handing raw state to the architecture layer: an extended-state buffer
//! with the alignment the save instruction demands, two distinct saved
//! contexts for the swap primitive, and similar. Violations would corrupt a
//! thread's register image rather than fail loudly, so the checks stay on
//! in debug builds and in hardened release builds.
//!
//! | Build configuration | Result |
//! |---------------------|--------|
//! | Debug (`debug_assertions`) | Panics on failure |
//! | Release + `meridian_hardened` cfg | Panics on failure |
//! | Release (default) | Compiled away (condition still type-checked) |

/// Checks a precondition that must hold for subsequent `unsafe` code to be
/// sound.
///
/// Use `debug_assert!` for logic invariants whose violation is a bug but
/// not undefined behavior.
///
/// # Examples
///
/// ```ignore
/// assert_unsafe_precondition!(ptr.is_aligned());
/// assert_unsafe_precondition!(!core::ptr::eq(old, new), "swap with itself");
/// ```
#[macro_export]
macro_rules! assert_unsafe_precondition {
    ($cond:expr $(,)?) => {
        #[cfg(any(debug_assertions, meridian_hardened))]
        {
            if !$cond {
                panic!(
                    "unsafe precondition violated: {}",
                    stringify!($cond),
                );
            }
        }
        #[cfg(not(any(debug_assertions, meridian_hardened)))]
        {
            if false {
                let _ = $cond;
            }
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        #[cfg(any(debug_assertions, meridian_hardened))]
        {
            if !$cond {
                panic!($($arg)+);
            }
        }
        #[cfg(not(any(debug_assertions, meridian_hardened)))]
        {
            if false {
                let _ = $cond;
            }
        }
    };
}
