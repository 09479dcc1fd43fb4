use std::borrow::Cow;
use std::fmt::Display;

use simpleble::ErrorKind;

pub type HostResult<T> = std::result::Result<T, HostError>;

/// The exception class a host raises for a [`HostError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostErrorKind {
    TypeError,
    RangeError,
    Error,
}

/// An exception to raise in the host.
#[derive(Debug, Clone)]
pub struct HostError {
    kind: HostErrorKind,
    message: Cow<'static, str>,
    source: Option<ErrorKind>,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn type_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(HostErrorKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(HostErrorKind::RangeError, message)
    }

    pub fn kind(&self) -> HostErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The core error kind this was converted from, if any.
    pub fn source_kind(&self) -> Option<ErrorKind> {
        self.source
    }
}

impl Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HostError {}

impl From<simpleble::Error> for HostError {
    fn from(error: simpleble::Error) -> Self {
        let kind = match error.kind() {
            ErrorKind::InvalidArgument | ErrorKind::NotFound => HostErrorKind::RangeError,
            ErrorKind::InvalidHandle | ErrorKind::Internal => HostErrorKind::TypeError,
            ErrorKind::NotConnected | ErrorKind::NativeFailure => HostErrorKind::Error,
        };
        let message = match error.message() {
            Some(message) => Cow::Owned(message.to_owned()),
            None => Cow::Owned(error.kind().to_string()),
        };
        Self {
            kind,
            message,
            source: Some(error.kind()),
        }
    }
}
