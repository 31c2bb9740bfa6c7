//! Failure values and the detail reported to a protected call's caller.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

/// How much a protected call wants to know about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detail {
    /// Only the numeric code. No message is formatted or allocated.
    #[default]
    CodeOnly,
    /// Code, formatted message and reporting program name.
    Message,
}

/// A failure travelling towards the nearest protected call.
///
/// Only `Context` can create one, which guarantees a frame was active when
/// it was raised. Return it with `?` (or the `fail!` macro); the boundary
/// that receives it tears down everything acquired since it began.
#[must_use = "a failure must be returned to the nearest protected call"]
#[derive(Debug, thiserror::Error)]
#[error("{}", describe(.code, .message))]
pub struct Failure {
    pub(crate) code: i32,
    pub(crate) message: Option<Cow<'static, str>>,
    pub(crate) program: Option<Rc<str>>,
    pub(crate) depth: usize,
}

impl Failure {
    /// Platform error code, 0 when unspecified.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The formatted message, if the active frame asked for one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub(crate) fn into_info(self) -> ErrorInfo {
        ErrorInfo {
            code: self.code,
            message: self.message,
            program: self.program,
        }
    }
}

/// What a protected call reports when its body failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Platform error code, 0 when unspecified.
    pub code: i32,
    /// Formatted message; `None` unless `Detail::Message` was requested, or
    /// the failure was memory exhaustion (which carries a static message).
    pub message: Option<Cow<'static, str>>,
    /// Program name at the time of the failure, if the message was requested.
    pub program: Option<Rc<str>>,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(program) = &self.program {
            write!(f, "{program}: ")?;
        }
        f.write_str(&describe(&self.code, &self.message))
    }
}

impl std::error::Error for ErrorInfo {}

fn describe<'a>(code: &i32, message: &'a Option<Cow<'static, str>>) -> Cow<'a, str> {
    match message {
        Some(message) => Cow::Borrowed(message.as_ref()),
        None if *code == 0 => Cow::Borrowed("unspecified failure"),
        None => Cow::Owned(format!("failed with error code {code}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_display_with_program() {
        let info = ErrorInfo {
            code: libc::ENOENT,
            message: Some(Cow::Borrowed("open(\"/nope\"): No such file or directory")),
            program: Some(Rc::from("cat")),
        };
        assert_eq!(
            info.to_string(),
            "cat: open(\"/nope\"): No such file or directory"
        );
    }

    #[test]
    fn test_error_info_display_code_only() {
        let info = ErrorInfo {
            code: libc::EINVAL,
            message: None,
            program: None,
        };
        assert_eq!(
            info.to_string(),
            format!("failed with error code {}", libc::EINVAL)
        );

        let unspecified = ErrorInfo {
            code: 0,
            message: None,
            program: None,
        };
        assert_eq!(unspecified.to_string(), "unspecified failure");
    }
}
