//! Fatal runtime errors.
use core::fmt;

/// Report a violation of a runtime invariant and abort the current context.
///
/// This logs the message at the `error` level and panics. In a task, the
/// kernel treats the panic as fatal and shuts down.
#[track_caller]
#[cold]
pub fn trap(message: impl fmt::Display) -> ! {
    log::error!("fatal: {message}");
    panic!("fatal: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "fatal: queue vanished")]
    fn panics_with_message() {
        trap("queue vanished");
    }
}
