//! Error-related macros

/// Compare two errors by their `Display` rendering.
///
/// NOTE: used for testing only!
#[doc(hidden)]
#[macro_export]
macro_rules! assert_error_eq {
    ($left:expr, $right:expr) => {
        assert_eq!(format!("{}", $left), format!("{}", $right));
    };
    ($left:expr, $right:expr, $($arg:tt)+) => {
        assert_eq!(format!("{}", $left), format!("{}", $right), $($arg)+);
    };
}
