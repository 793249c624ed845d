pub use log::debug;

/// Debug message which is either logged at debug level or, if the leading flag is set, written
/// straight to stderr
///
/// The stderr route is used to trace a single sample's clustering without turning on the global
/// debug log level.
///
/// ```ignore
/// let debug = false;
/// debug_msg!(debug, "segment: {index} rho: {rho:.4}");
/// ```
macro_rules! debug_msg {
    ($flag:expr, $($arg:tt)+) => {
        if $flag {
            eprintln!($($arg)+);
        } else {
            $crate::log_utils::debug!($($arg)+);
        }
    }
}

pub(crate) use debug_msg;
