use std::borrow::Cow;
use std::fmt::Display;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct Error {
    data: ErrorData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// An argument was rejected before any native call was made.
    InvalidArgument,
    /// The handle is zero, of the wrong kind, or has already been released.
    InvalidHandle,
    /// An index was out of range for the currently enumerated set.
    NotFound,
    /// The operation requires a connected peripheral.
    NotConnected,
    /// The native library reported a failure.
    NativeFailure,
    /// A handle could not be decoded without loss.
    Internal,
}

#[derive(Debug, Clone)]
enum ErrorData {
    Simple(ErrorKind),
    Message(ErrorKind, Cow<'static, str>),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ErrorData::Simple(kind) => kind.fmt(f),
            ErrorData::Message(kind, message) => write!(f, "{kind}: {message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            data: ErrorData::Simple(kind),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Error {
            data: ErrorData::Message(kind, message.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.data {
            ErrorData::Simple(kind) | ErrorData::Message(kind, _) => *kind,
        }
    }

    /// Returns the detail message, if one was attached.
    pub fn message(&self) -> Option<&str> {
        match &self.data {
            ErrorData::Simple(_) => None,
            ErrorData::Message(_, message) => Some(message),
        }
    }

    pub(crate) fn native(operation: &'static str) -> Self {
        Error::new(ErrorKind::NativeFailure, operation)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidArgument => f.write_str("invalid argument"),
            ErrorKind::InvalidHandle => f.write_str("invalid handle"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::NotConnected => f.write_str("not connected"),
            ErrorKind::NativeFailure => f.write_str("native call failed"),
            ErrorKind::Internal => f.write_str("internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_message() {
        let error = Error::new(ErrorKind::NotConnected, "read called before connect");
        assert_eq!(error.kind(), ErrorKind::NotConnected);
        assert_eq!(error.message(), Some("read called before connect"));
        assert_eq!(
            error.to_string(),
            "not connected: read called before connect"
        );
    }

    #[test]
    fn test_simple_error_from_kind() {
        let error = Error::from(ErrorKind::InvalidHandle);
        assert_eq!(error.message(), None);
        assert_eq!(error.to_string(), "invalid handle");
    }
}
