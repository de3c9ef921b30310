// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Logging for the tree and its node database.
//!
//! With the `logger` feature these are the `log` crate's macros. Without it
//! they expand to nothing at runtime; the level is always left to the
//! embedding application.

#[cfg(feature = "logger")]
pub use log::{debug, trace};

/// Returns true if trace records would be emitted. Use it to skip building
/// expensive trace arguments, such as hex dumps of keys and values.
#[cfg(feature = "logger")]
#[must_use]
pub fn trace_enabled() -> bool {
    log::log_enabled!(log::Level::Trace)
}

#[cfg(not(feature = "logger"))]
pub use disabled::{debug, trace, trace_enabled};

#[cfg(not(feature = "logger"))]
mod disabled {
    /// Type checks its arguments and discards them
    #[macro_export]
    macro_rules! iavl_discard_log {
        ($($arg:tt)+) => {
            if $crate::logger::trace_enabled() {
                let _ = format!($($arg)+);
            }
        };
    }

    pub use iavl_discard_log as debug;
    pub use iavl_discard_log as trace;

    /// Always false without the `logger` feature
    #[inline]
    #[must_use]
    pub const fn trace_enabled() -> bool {
        false
    }
}
