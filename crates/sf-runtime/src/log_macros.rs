/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need
/// to remember the string literal. Domains: `sys` (lifecycle), `cycle`
/// (update coordination), `eval` (formula evaluation), `conf`
/// (configuration), `res` (resolution and host reads).
///
/// # Usage
///
/// ```ignore
/// use crate::log_macros::*;
///
/// sf_info!(sys, sensors = 4, "engine registered sensor set");
/// sf_warn!(cycle, sensor = %uid, error = %e, "sensor evaluation failed");
/// sf_debug!(res, entity = %id, "host read");
/// ```
///
/// The macros accept any tracing-compatible field syntax after the domain
/// identifier. The domain identifier is **not** a string — it is a bare
/// identifier that the macro converts to a `&str` literal.

// ---------------------------------------------------------------------------
// Core macro — dispatches to the matching tracing level macro.
// ---------------------------------------------------------------------------

/// Internal helper. Do not call directly; use `sf_error!` … `sf_trace!`.
#[doc(hidden)]
macro_rules! sf_log {
    // With fields and message
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

// ---------------------------------------------------------------------------
// Public per-level macros
// ---------------------------------------------------------------------------

/// Log at ERROR level with an automatic `domain` field.
macro_rules! sf_error {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
macro_rules! sf_warn {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
macro_rules! sf_info {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
macro_rules! sf_debug {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! sf_trace {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(trace, $domain, $($rest)*)
    };
}
