/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */

//! **btls** provides a "blocking" implementation of TLS 1.2 secured byte
//! streams and listeners, plus a ***readiness multiplexing*** primitive so a
//! single thread can wait on many connections at once.
//!
//! The crate is a small transport layer meant to sit underneath an HTTP-style
//! framing layer without depending on that layer's semantics. Its surface is
//! four pieces:
//!
//! - [`btls_rs::Endpoint`](Endpoint) – an immutable IPv4 address+port, either
//!   a *wildcard* bind target created from a bare port, or a *specific* peer
//!   created from a dotted-decimal literal or a (blockingly resolved)
//!   hostname.
//! - [`btls_rs::ReadinessSet`](ReadinessSet) – a set of registered socket
//!   handles with a blocking [`wait()`](ReadinessSet::wait) over up to three
//!   independent sets (read, write, error) and an optional timeout, backed by
//!   the [**`mio`**](mio) polling machinery.
//! - [`btls_rs::Transport`](Transport) – the contract every concrete stream
//!   satisfies: `available`, `write`, `read`, `try_read` and readiness
//!   bridging; [`btls_rs::Listener`](Listener) is the separate, explicitly
//!   opted-in capability of accepting connections.
//! - [`btls_rs::SecureStream`](SecureStream) – the concrete implementation:
//!   one owned OS socket plus one TLS session, created as a *client* (which
//!   handshakes during construction), a *listener* (which binds and listens)
//!   or an *accepted connection* (returned by
//!   [`accept()`](SecureStream::accept)).
//!
//! All potentially-blocking operations (connect, accept, handshake, `write`,
//! `read`, `wait`) block the calling thread; there is no internal threading.
//! Concurrency is achieved by callers using one thread per connection, or by
//! multiplexing many streams through a single `ReadinessSet` and issuing
//! non-blocking operations (`try_read`, `available`) in response.
//!
//! # Usage
//!
//! A server binds a [`SecureStream`](SecureStream) listener with PEM
//! certificate/key files and accepts connections; a client connects a
//! [`SecureStream`](SecureStream) to an [`Endpoint`](Endpoint). Both sides
//! then talk through the [`Transport`](Transport) trait.
//!
//! # Examples
//!
//! Runnable demo programs can be found in the `demos` sub-directory.

mod endpoint;
mod error;
mod readiness;
mod stream;
mod transport;
mod utilities;

pub use endpoint::Endpoint;
pub use error::TlsError;
pub use readiness::{ReadinessSet, WaitSet};
pub use stream::SecureStream;
pub use transport::{Listener, Transport};
