/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io::{Error as IoError, ErrorKind};

/// The error type for **btls** operations
///
/// Every fallible operation in this crate reports a `TlsError`. Failures that
/// originate in the operating system or in the TLS layer carry the underlying
/// [`std::io::Error`](std::io::Error), so that the OS error code (where one
/// exists) remains available via [`raw_os_error()`](std::io::Error::raw_os_error).
/// TLS-layer failures are wrapped as `ErrorKind::InvalidData` errors with the
/// original [`rustls::Error`](rustls::Error) as their inner error.
pub enum TlsError {
    /// The textual address did not parse as a dotted-decimal IPv4 address.
    InvalidAddress(String),
    /// Hostname resolution failed or returned no usable records.
    ResolutionFailed(String),
    /// The certificate or private key file could not be read or parsed.
    Certificate(IoError),
    /// An OS socket or TLS-layer failure, carrying the underlying error.
    Transport(IoError),
    /// The operation is not valid for the stream's current role, e.g.
    /// `accept()` on a non-listener stream.
    InvalidState(&'static str),
    /// A malformed request, e.g. two wait sets of the same readiness kind.
    InvalidArgument(&'static str),
}

impl TlsError {
    pub(crate) fn tls(error: rustls::Error) -> Self {
        Self::Transport(IoError::new(ErrorKind::InvalidData, error))
    }

    pub(crate) fn certificate(error: rustls::Error) -> Self {
        Self::Certificate(IoError::new(ErrorKind::InvalidData, error))
    }

    pub(crate) fn closed() -> Self {
        Self::Transport(IoError::new(ErrorKind::UnexpectedEof, "connection closed by peer"))
    }
}

impl From<IoError> for TlsError {
    fn from(error: IoError) -> Self {
        Self::Transport(error)
    }
}

impl From<rustls::Error> for TlsError {
    fn from(error: rustls::Error) -> Self {
        Self::tls(error)
    }
}

impl Debug for TlsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(text) => write!(f, "TlsError::InvalidAddress({:?})", text),
            Self::ResolutionFailed(host) => write!(f, "TlsError::ResolutionFailed({:?})", host),
            Self::Certificate(error) => write!(f, "TlsError::Certificate({:?})", error),
            Self::Transport(error) => write!(f, "TlsError::Transport({:?})", error),
            Self::InvalidState(detail) => write!(f, "TlsError::InvalidState({:?})", detail),
            Self::InvalidArgument(detail) => write!(f, "TlsError::InvalidArgument({:?})", detail),
        }
    }
}

impl Display for TlsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(text) => write!(f, "Invalid address string: {:?}", text),
            Self::ResolutionFailed(host) => write!(f, "Failed to resolve host: {}", host),
            Self::Certificate(error) => write!(f, "Certificate or key rejected: {}", error),
            Self::Transport(error) => match error.raw_os_error() {
                Some(code) => write!(f, "Transport failure (code {}): {}", code, error),
                None => write!(f, "Transport failure: {}", error),
            },
            Self::InvalidState(detail) => write!(f, "Invalid state: {}", detail),
            Self::InvalidArgument(detail) => write!(f, "Invalid argument: {}", detail),
        }
    }
}

impl Error for TlsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Certificate(error) | Self::Transport(error) => Some(error),
            _ => None,
        }
    }
}
