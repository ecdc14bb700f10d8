//! Error types for task submission and completion.
//!
//! Failures raised inside a task never unwind the worker that ran it: they
//! are captured into the task's completion channel and surface when the
//! paired handle is joined. The enum is `#[non_exhaustive]` to allow adding
//! variants without breaking callers; consumers should include a fallback
//! match arm.

use std::any::Any;
use std::error;
use std::fmt;

/// Why a joined handle carries no value.
#[non_exhaustive]
pub enum JoinError {
    /// The task's callable panicked. Carries the raw panic payload.
    Panicked(Box<dyn Any + Send + 'static>),

    /// The task was destroyed before it ran: the pool was torn down with the
    /// task still unexecuted, or the task was dropped without ever being
    /// submitted.
    Abandoned,

    /// The submission was rejected because the pool had already been told to
    /// shut down.
    ShutDown,
}

impl JoinError {
    /// Best-effort view of a panic payload as a string.
    ///
    /// Panic payloads are almost always `&str` or `String`; anything else
    /// yields `None`.
    pub fn panic_message(&self) -> Option<&str> {
        let JoinError::Panicked(payload) = self else {
            return None;
        };
        if let Some(s) = payload.downcast_ref::<&str>() {
            Some(s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Returns `true` when this error carries a panic payload.
    pub fn is_panic(&self) -> bool {
        matches!(self, JoinError::Panicked(_))
    }
}

// Manual Debug: panic payloads are `Box<dyn Any>` and have no Debug impl.
impl fmt::Debug for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Panicked(_) => match self.panic_message() {
                Some(msg) => write!(f, "Panicked({msg:?})"),
                None => f.write_str("Panicked(..)"),
            },
            JoinError::Abandoned => f.write_str("Abandoned"),
            JoinError::ShutDown => f.write_str("ShutDown"),
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Panicked(_) => match self.panic_message() {
                Some(msg) => write!(f, "task panicked: {msg}"),
                None => f.write_str("task panicked"),
            },
            JoinError::Abandoned => f.write_str("task was dropped before it ran"),
            JoinError::ShutDown => f.write_str("pool is shut down"),
        }
    }
}

impl error::Error for JoinError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_str_and_string() {
        let e = JoinError::Panicked(Box::new("boom"));
        assert_eq!(e.panic_message(), Some("boom"));
        assert!(e.is_panic());

        let e = JoinError::Panicked(Box::new(String::from("kaput")));
        assert_eq!(e.panic_message(), Some("kaput"));

        let e = JoinError::Panicked(Box::new(17u32));
        assert_eq!(e.panic_message(), None);
        assert_eq!(format!("{e}"), "task panicked");
    }

    #[test]
    fn non_panic_variants_have_no_message() {
        assert_eq!(JoinError::Abandoned.panic_message(), None);
        assert!(!JoinError::ShutDown.is_panic());
        assert_eq!(format!("{:?}", JoinError::Abandoned), "Abandoned");
    }
}
