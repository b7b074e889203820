use std::{error, fmt, io};

use arcstr::ArcStr;

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The server generated an invalid response, or returned a general error.
    ResponseError,
    /// A script that was requested is not cached on the node that received it.
    NoScript,
    /// A transaction was aborted by the server.
    ExecAbort,
    /// The connection to the store failed.
    IoError,
    /// Operation failed because of a type mismatch.
    TypeError,
    /// The caller passed arguments the operation cannot work with.
    ClientError,
    /// The requested script name is not registered, or has an empty source.
    UnknownOperation,
    /// The fingerprint echoed by the store after a load differs from the
    /// locally computed one.
    ScriptIntegrityMismatch,
}

/// Represents a store error.
///
/// For the most part you should be using the Error trait to interact with this
/// rather than the actual struct.
pub struct StoreError {
    repr: ErrorRepr,
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, ArcStr),
    IntegrityMismatch {
        script: ArcStr,
        expected: ArcStr,
        actual: ArcStr,
    },
    IoError(io::Error),
}

/// Library generic result type.
pub type StoreResult<T> = Result<T, StoreError>;

impl PartialEq for StoreError {
    fn eq(&self, other: &StoreError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::WithDescription(kind_a, _), &ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                &ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                &ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (
                ErrorRepr::IntegrityMismatch {
                    script: a,
                    actual: actual_a,
                    ..
                },
                ErrorRepr::IntegrityMismatch {
                    script: b,
                    actual: actual_b,
                    ..
                },
            ) => a == b && actual_a == actual_b,
            _ => false,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> StoreError {
        StoreError {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<(ErrorKind, &'static str)> for StoreError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> StoreError {
        StoreError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for StoreError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> StoreError {
        StoreError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.into()),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::IntegrityMismatch {
                script,
                expected,
                actual,
            } => write!(
                f,
                "Script fingerprint differs from the one returned by the store - \
                 ScriptIntegrityMismatch: {script}: expected {expected}, got {actual}"
            ),
            ErrorRepr::IoError(err) => err.fmt(f),
        }
    }
}

/// Indicates a general failure in the library.
impl StoreError {
    pub(crate) fn integrity_mismatch(script: &str, expected: &str, actual: &str) -> StoreError {
        StoreError {
            repr: ErrorRepr::IntegrityMismatch {
                script: script.into(),
                expected: expected.into(),
                actual: actual.into(),
            },
        }
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
            ErrorRepr::IntegrityMismatch { .. } => ErrorKind::ScriptIntegrityMismatch,
            ErrorRepr::IoError(_) => ErrorKind::IoError,
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, detail) => Some(detail.as_str()),
            _ => None,
        }
    }

    /// For an integrity mismatch, the locally computed fingerprint and the one
    /// the store echoed back, in that order.
    pub fn fingerprints(&self) -> Option<(&str, &str)> {
        match &self.repr {
            ErrorRepr::IntegrityMismatch {
                expected, actual, ..
            } => Some((expected.as_str(), actual.as_str())),
            _ => None,
        }
    }

    /// Returns true if the store reported that it does not know the script
    /// fingerprint that was sent. Stores that only surface a generic error
    /// are recognised by the `NOSCRIPT` marker in the error text, in any case.
    pub fn is_no_script(&self) -> bool {
        if self.kind() == ErrorKind::NoScript {
            return true;
        }
        match &self.repr {
            ErrorRepr::WithDescription(_, desc) => contains_no_script_marker(desc),
            ErrorRepr::WithDescriptionAndDetail(_, desc, detail) => {
                contains_no_script_marker(desc) || contains_no_script_marker(detail)
            }
            ErrorRepr::IoError(err) => contains_no_script_marker(&err.to_string()),
            ErrorRepr::IntegrityMismatch { .. } => false,
        }
    }

    /// Returns true for errors that point at a programming or deployment
    /// problem. These are never swallowed by the scripted operation path.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownOperation | ErrorKind::ScriptIntegrityMismatch | ErrorKind::ClientError
        )
    }

    /// Returns true if this error indicates that the connection was
    /// refused or dropped.
    pub fn is_connection_dropped(&self) -> bool {
        match &self.repr {
            ErrorRepr::IoError(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

fn contains_no_script_marker(text: &str) -> bool {
    text.as_bytes()
        .windows(NO_SCRIPT_MARKER.len())
        .any(|window| window.eq_ignore_ascii_case(NO_SCRIPT_MARKER))
}

const NO_SCRIPT_MARKER: &[u8] = b"NOSCRIPT";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_script_is_recognised_by_kind() {
        let err = StoreError::from((ErrorKind::NoScript, "No matching script"));
        assert!(err.is_no_script());
        assert!(!err.is_fatal());
    }

    #[test]
    fn no_script_is_recognised_by_marker_in_any_case() {
        let err = StoreError::from((
            ErrorKind::ResponseError,
            "An error was signalled by the server",
            "noScript No matching script. Please use EVAL.".to_string(),
        ));
        assert!(err.is_no_script());

        let err = StoreError::from((
            ErrorKind::ResponseError,
            "An error was signalled by the server",
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        ));
        assert!(!err.is_no_script());
    }

    #[test]
    fn io_errors_are_transient() {
        let err = StoreError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(err.is_connection_dropped());
        assert!(!err.is_fatal());
        assert!(!err.is_no_script());
    }

    #[test]
    fn integrity_mismatch_carries_both_fingerprints() {
        let err = StoreError::integrity_mismatch("incr", "aaaa", "bbbb");
        assert_eq!(err.kind(), ErrorKind::ScriptIntegrityMismatch);
        assert!(err.is_fatal());
        assert_eq!(err.fingerprints(), Some(("aaaa", "bbbb")));
        let rendered = err.to_string();
        assert!(rendered.contains("incr"));
        assert!(rendered.contains("aaaa"));
        assert!(rendered.contains("bbbb"));
    }

    #[test]
    fn display_includes_kind_and_detail() {
        let err = StoreError::from((ErrorKind::UnknownOperation, "Unknown script", "nope".to_string()));
        assert_eq!(err.to_string(), "Unknown script - UnknownOperation: nope");
        assert_eq!(err.detail(), Some("nope"));
    }
}
