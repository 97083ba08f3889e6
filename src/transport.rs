/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use crate::{ReadinessSet, TlsError};

/// The contract every byte-stream transport satisfies
///
/// Callers typically construct a concrete stream (currently
/// [`SecureStream`](crate::SecureStream), with a plaintext variant being an
/// obvious future addition) and thereafter interact with it only through this
/// trait, plus [`Listener::accept()`](Listener::accept) for listener-role
/// instances.
///
/// **Readiness caveat:** the readiness bridge registers the *OS handle*; data
/// that the TLS layer has already received and decrypted is invisible to OS
/// readiness polling. [`is_readiness_signaled()`](Transport::is_readiness_signaled)
/// can therefore report `false` while [`available()`](Transport::available) is
/// nonzero, and a robust consumer polls `available`/`try_read` even when the
/// OS reports no new readiness.
///
/// **Mode caveat:** [`read()`](Transport::read) and
/// [`try_read()`](Transport::try_read) switch the underlying socket between
/// blocking and non-blocking mode as a per-handle side effect. Interleaving
/// the two concurrently from different threads on the *same* stream is unsafe
/// and must be serialized by the caller.
pub trait Transport {
    /// Lower bound on the number of bytes readable without blocking.
    ///
    /// Non-blocking and infallible; at least 1 if any data is pending.
    fn available(&mut self) -> usize;

    /// Writes all of `data` to the transport.
    ///
    /// Blocking. Partial sends are retried internally until the whole buffer
    /// is on the wire or a fatal transport error occurs.
    fn write(&mut self, data: &[u8]) -> Result<(), TlsError>;

    /// Blocking read.
    ///
    /// If `min_bytes` is 0, returns whatever data the first successful
    /// underlying receive produces. Otherwise blocks until exactly
    /// `min_bytes` bytes have been accumulated. Never returns an empty
    /// buffer on success.
    fn read(&mut self, min_bytes: usize) -> Result<Vec<u8>, TlsError>;

    /// Non-blocking read.
    ///
    /// Returns an empty buffer immediately if no data is available,
    /// otherwise returns everything that could be read without blocking –
    /// including bytes the TLS layer had already decrypted and buffered
    /// before the socket signaled "would block".
    fn try_read(&mut self) -> Result<Vec<u8>, TlsError>;

    /// Adds this transport's underlying OS handle to a readiness set.
    fn register_readiness(&self, set: &mut ReadinessSet);

    /// Queries the readiness flag of this transport's underlying OS handle.
    fn is_readiness_signaled(&self, set: &ReadinessSet) -> bool;

    /// Removes this transport's underlying OS handle from a readiness set.
    fn unregister_readiness(&self, set: &mut ReadinessSet);
}

/// The listener capability: accepting incoming connections
///
/// Deliberately separate from [`Transport`]: a type opts into being a
/// listener explicitly, and only listener-role *instances* may accept.
/// Calling [`accept()`](Listener::accept) on anything else fails with
/// [`TlsError::InvalidState`](crate::TlsError::InvalidState).
pub trait Listener: Transport {
    /// Blocks until a connection is available and returns it as a new,
    /// fully-established instance of the same type.
    fn accept(&self) -> Result<Self, TlsError>
    where
        Self: Sized;
}
