//! Compile-time static assertion macro.

/// Asserts a condition at compile time.
///
/// Used to pin the layout of structures shared with assembly, such as the
/// saved extended-state image.
///
/// # Examples
///
/// ```ignore
/// static_assert!(core::mem::size_of::<VfpState>() == 272);
/// static_assert!(core::mem::align_of::<VfpState>() >= 8, "vstm needs 8-byte alignment");
/// ```
#[macro_export]
macro_rules! static_assert {
    ($cond:expr $(,)?) => {
        const _: () = assert!($cond);
    };
    ($cond:expr, $msg:expr $(,)?) => {
        const _: () = assert!($cond, $msg);
    };
}
