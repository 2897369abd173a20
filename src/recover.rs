//! Run a closure once and turn a panic into an ordinary return value.

use std::{
    any::Any,
    backtrace::Backtrace,
    panic::{self, AssertUnwindSafe},
};

/// Payload of a caught panic.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Runs `f` exactly once. If it panics, `handler` receives the payload and
/// its result is returned; otherwise `handler` is never called.
pub fn with_recover<F, H, E>(f: F, handler: H) -> Result<(), E>
where
    F: FnOnce(),
    H: FnOnce(PanicPayload) -> Result<(), E>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => Ok(()),
        Err(payload) => handler(payload),
    }
}

/// Runs `f` exactly once, logging and swallowing a panic.
pub fn recover<F: FnOnce()>(f: F) {
    let _ = with_recover(f, |payload| {
        tracing::error!(
            target: "strict_queues::recover",
            recover_at = %Backtrace::force_capture(),
            "recover from panic: {}",
            panic_message(&payload)
        );
        Ok::<(), std::convert::Infallible>(())
    });
}

/// The message a panic was raised with, for `&str` and `String` payloads.
pub fn panic_message(payload: &PanicPayload) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "Box<dyn Any>"
    }
}
