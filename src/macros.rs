//! This module contains utility macros that are not STM32-specific, or specific
//! to this library.

/// Syntax helper for getting global variables of the form `Mutex<RefCell<Option>>>` from an interrupt-free
/// context - eg in interrupt handlers.
///
/// Example: `access_global!(EXTI_HANDLERS, handlers, cs)`
#[macro_export]
macro_rules! access_global {
    ($NAME_GLOBAL:ident, $name_local:ident, $cs:expr) => {
        let mut part1 = $NAME_GLOBAL.borrow($cs).borrow_mut();
        let $name_local = part1.as_mut().unwrap();
    };
}

/// Syntax helper for setting global variables of the form `Mutex<RefCell<Option>>>`.
/// eg in interrupt handlers. Ideal for non-copy-type variables that can't be initialized
/// immediatiately.
///
/// Example: `make_globals!(
///     (EXTI_HANDLERS, HandlerTable<23>),
///     (DELAY, Delay<SYST>),
/// )`
#[macro_export]
macro_rules! make_globals {
    ($(($NAME:ident, $type:ty)),+ $(,)?) => {
        $(
            static $NAME: ::critical_section::Mutex<core::cell::RefCell<Option<$type>>> = ::critical_section::Mutex::new(core::cell::RefCell::new(None));
        )+
    };
}

/// Initialize one or more globals inside a critical section.
///
/// Usage:
/// ```ignore
/// init_globals!(
///     (EXTI_HANDLERS, handlers),
///     (RTC, ds1307),
/// );
/// ```
#[macro_export]
macro_rules! init_globals {
    ($(($NAME:ident, $val:expr)),* $(,)?) => {
        ::critical_section::with(|cs| {
            $(
                $NAME.borrow(cs).replace(Some($val));
            )*
        });
    };
}

/// Spin while `$cond` holds, at most `$limit` times, returning `Err($err)` from the enclosing
/// function if it's still true after that. The optional block runs on each iteration; eg to
/// check error flags.
macro_rules! bounded_loop {
    ($cond:expr, $err:expr, $limit:expr) => {
        $crate::macros::bounded_loop!($cond, $err, $limit, {})
    };
    ($cond:expr, $err:expr, $limit:expr, $body:block) => {{
        let mut i: u32 = 0;
        while $cond {
            $body
            i += 1;
            if i >= $limit {
                return Err($err);
            }
        }
    }};
}

pub(crate) use bounded_loop;

// Internal logging. These forward to `defmt` on firmware builds. Host test builds have no
// global logger to link against, so the statements compile out there.

macro_rules! log_debug {
    ($($arg:tt)+) => {{
        #[cfg(not(test))]
        defmt::debug!($($arg)+);
    }};
}

macro_rules! log_warn {
    ($($arg:tt)+) => {{
        #[cfg(not(test))]
        defmt::warn!($($arg)+);
    }};
}

macro_rules! log_error {
    ($($arg:tt)+) => {{
        #[cfg(not(test))]
        defmt::error!($($arg)+);
    }};
}

pub(crate) use {log_debug, log_error, log_warn};
