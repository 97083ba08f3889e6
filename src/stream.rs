/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io::{BufReader, Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::{Arc, Once};

use log::debug;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, Connection as TlsSession, ServerConfig, ServerConnection};

use crate::transport::{Listener, Transport};
use crate::utilities::RecvBuffer;
use crate::{Endpoint, ReadinessSet, TlsError};

static CRYPTO_INIT: Once = Once::new();

/// A TLS 1.2 secured byte stream over one owned OS socket
///
/// A `SecureStream` is created in one of three roles:
///
/// - **Client**: [`connect()`](SecureStream::connect) performs a blocking TCP
///   connect followed by a blocking TLS handshake; the returned stream is
///   established and ready for I/O.
/// - **Listener**: [`bind()`](SecureStream::bind) loads a PEM certificate and
///   private key, binds the endpoint and listens. A listener never becomes a
///   data channel itself; it only spawns connections via
///   [`accept()`](SecureStream::accept).
/// - **Accepted connection**: returned by `accept()`, established after the
///   blocking server-side handshake, carrying the peer's endpoint.
///
/// All connections derived from a listener share its TLS server
/// configuration; the configuration is released only when the listener *and*
/// every accepted connection have been dropped.
///
/// The socket and TLS session are owned exclusively; moving a `SecureStream`
/// transfers both. All I/O is exposed through the [`Transport`] trait.
pub struct SecureStream {
    inner: Inner,
    endpoint: Endpoint,
}

enum Inner {
    Client {
        socket: TcpStream,
        session: TlsSession,
    },
    Accepted {
        socket: TcpStream,
        session: TlsSession,
    },
    Listener {
        listener: TcpListener,
        config: Arc<ServerConfig>,
    },
}

impl SecureStream {
    /// Connects to `endpoint` and completes the TLS handshake, blocking for
    /// both. Fails with [`TlsError::Transport`] on any socket or TLS failure;
    /// resources acquired by then are released before the error surfaces.
    ///
    /// The client does not verify the server's certificate, matching the TLS
    /// library's behavior in the absence of any configured trust anchors.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, TlsError> {
        let mut socket = TcpStream::connect(endpoint.socket_addr())?;

        let server_name = ServerName::IpAddress(IpAddr::V4(endpoint.ip()).into());
        let client = ClientConnection::new(client_config(), server_name).map_err(TlsError::tls)?;
        let mut session = TlsSession::from(client);

        drive_handshake(&mut session, &mut socket)?;
        debug!("TLS handshake completed with {}", endpoint);

        Ok(Self {
            inner: Inner::Client { socket, session },
            endpoint: *endpoint,
        })
    }

    /// Binds a listener on `endpoint` with the given PEM certificate and
    /// private key files.
    ///
    /// The certificate and key are loaded *before* any socket is created, so a
    /// bad file fails with [`TlsError::Certificate`] and leaves nothing bound.
    /// Socket failures (bind/listen) fail with [`TlsError::Transport`].
    pub fn bind(
        endpoint: &Endpoint,
        cert_file: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
    ) -> Result<Self, TlsError> {
        let config = server_config(cert_file.as_ref(), key_file.as_ref())?;

        let listener = TcpListener::bind(endpoint.socket_addr())?;
        debug!("Listening on {:?}", listener.local_addr().ok());

        Ok(Self {
            inner: Inner::Listener { listener, config },
            endpoint: *endpoint,
        })
    }

    /// Blocks until a client connects, completes the server-side handshake
    /// and returns the established connection, which carries the peer's
    /// endpoint.
    ///
    /// Fails with [`TlsError::InvalidState`] unless this stream is a
    /// listener.
    pub fn accept(&self) -> Result<Self, TlsError> {
        let (listener, config) = match &self.inner {
            Inner::Listener { listener, config } => (listener, config),
            _ => return Err(TlsError::InvalidState("accept() requires a listener-role stream")),
        };

        let (mut socket, peer) = listener.accept()?;

        let server = ServerConnection::new(config.clone()).map_err(TlsError::tls)?;
        let mut session = TlsSession::from(server);

        drive_handshake(&mut session, &mut socket)?;
        debug!("Accepted TLS connection from {}", peer);

        Ok(Self {
            inner: Inner::Accepted { socket, session },
            endpoint: Endpoint::from_peer(peer),
        })
    }

    /// The endpoint this stream was created for: the connect target for a
    /// client, the bind address for a listener, the peer for an accepted
    /// connection.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_listener(&self) -> bool {
        matches!(self.inner, Inner::Listener { .. })
    }

    /// Get the *local* socket address of this stream.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            Inner::Client { socket, .. } | Inner::Accepted { socket, .. } => {
                socket.local_addr().ok()
            }
            Inner::Listener { listener, .. } => listener.local_addr().ok(),
        }
    }

    /// Get the *peer* socket address of this stream; `None` for listeners.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            Inner::Client { socket, .. } | Inner::Accepted { socket, .. } => {
                socket.peer_addr().ok()
            }
            Inner::Listener { .. } => None,
        }
    }

    fn raw_fd(&self) -> RawFd {
        match &self.inner {
            Inner::Client { socket, .. } | Inner::Accepted { socket, .. } => socket.as_raw_fd(),
            Inner::Listener { listener, .. } => listener.as_raw_fd(),
        }
    }

    fn stream_parts(&mut self) -> Result<(&mut TlsSession, &mut TcpStream), TlsError> {
        match &mut self.inner {
            Inner::Client { socket, session } | Inner::Accepted { socket, session } => {
                Ok((session, socket))
            }
            Inner::Listener { .. } => {
                Err(TlsError::InvalidState("listener streams carry no data channel"))
            }
        }
    }
}

impl Transport for SecureStream {
    fn available(&mut self) -> usize {
        match &mut self.inner {
            Inner::Client { session, .. } | Inner::Accepted { session, .. } => session
                .process_new_packets()
                .map(|state| state.plaintext_bytes_to_read())
                .unwrap_or(0),
            Inner::Listener { .. } => 0,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TlsError> {
        let (session, socket) = self.stream_parts()?;
        socket.set_nonblocking(false)?;

        let mut sent = 0;
        while sent < data.len() {
            let queued = session.writer().write(&data[sent..])?;
            if queued == 0 {
                return Err(TlsError::closed());
            }
            sent += queued;
            flush_tls(session, socket)?;
        }
        Ok(())
    }

    fn read(&mut self, min_bytes: usize) -> Result<Vec<u8>, TlsError> {
        let (session, socket) = self.stream_parts()?;
        socket.set_nonblocking(false)?;

        let mut buffer = RecvBuffer::new();
        loop {
            if min_bytes != 0 && buffer.len() >= min_bytes {
                break;
            }
            buffer.ensure_headroom();
            let filled = buffer.len();
            let spare = buffer.spare_mut();
            // Reads are capped at the remaining need, so the result is exactly
            // min_bytes long whenever min_bytes is nonzero.
            let cap = match min_bytes {
                0 => spare.len(),
                wanted => spare.len().min(wanted - filled),
            };
            match session.reader().read(&mut spare[..cap]) {
                Ok(0) => return Err(TlsError::closed()),
                Ok(count) => {
                    buffer.commit(count);
                    if min_bytes == 0 {
                        break;
                    }
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => {
                    // No decrypted data buffered; pull more off the socket.
                    if pull_tls(session, socket)? == 0 {
                        return Err(TlsError::closed());
                    }
                    session.process_new_packets().map_err(TlsError::tls)?;
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(buffer.into_bytes())
    }

    fn try_read(&mut self) -> Result<Vec<u8>, TlsError> {
        let (session, socket) = self.stream_parts()?;
        socket.set_nonblocking(true)?;

        let mut buffer = RecvBuffer::new();
        loop {
            buffer.ensure_headroom();
            let spare = buffer.spare_mut();
            match session.reader().read(spare) {
                Ok(0) => return Err(TlsError::closed()),
                Ok(count) => buffer.commit(count),
                Err(error) if error.kind() == ErrorKind::WouldBlock => {
                    // Decrypted data is exhausted; poll the socket once more
                    // and stop as soon as it would block.
                    match pull_tls(session, socket) {
                        Ok(0) => return Err(TlsError::closed()),
                        Ok(_) => session.process_new_packets().map_err(TlsError::tls).map(drop)?,
                        Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                        Err(error) => return Err(error.into()),
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(buffer.into_bytes())
    }

    fn register_readiness(&self, set: &mut ReadinessSet) {
        set.register(self.raw_fd());
    }

    fn is_readiness_signaled(&self, set: &ReadinessSet) -> bool {
        set.is_ready(self.raw_fd())
    }

    fn unregister_readiness(&self, set: &mut ReadinessSet) {
        set.unregister(self.raw_fd());
    }
}

impl Listener for SecureStream {
    fn accept(&self) -> Result<Self, TlsError> {
        SecureStream::accept(self)
    }
}

impl Debug for SecureStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let role = match self.inner {
            Inner::Client { .. } => "client",
            Inner::Accepted { .. } => "accepted",
            Inner::Listener { .. } => "listener",
        };
        f.debug_struct("SecureStream")
            .field("role", &role)
            .field("endpoint", &self.endpoint)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Runs the blocking handshake loop: flush pending TLS records, then feed the
/// session more ciphertext until it leaves the handshaking state.
fn drive_handshake(session: &mut TlsSession, socket: &mut TcpStream) -> Result<(), TlsError> {
    while session.is_handshaking() {
        flush_tls(session, socket)?;
        if !session.is_handshaking() {
            break;
        }
        if pull_tls(session, socket)? == 0 {
            return Err(TlsError::closed());
        }
        session.process_new_packets().map_err(TlsError::tls)?;
    }
    // The session may still hold the final flight (e.g. Finished).
    flush_tls(session, socket)
}

fn flush_tls(session: &mut TlsSession, socket: &mut TcpStream) -> Result<(), TlsError> {
    while session.wants_write() {
        if write_tls_retrying(session, socket)? == 0 {
            return Err(TlsError::closed());
        }
    }
    Ok(())
}

fn write_tls_retrying(session: &mut TlsSession, socket: &mut TcpStream) -> IoResult<usize> {
    loop {
        match session.write_tls(socket) {
            Ok(count) => return Ok(count),
            Err(error) if error.kind() == ErrorKind::Interrupted => (),
            Err(error) => return Err(error),
        }
    }
}

fn pull_tls(session: &mut TlsSession, socket: &mut TcpStream) -> IoResult<usize> {
    loop {
        match session.read_tls(socket) {
            Ok(count) => return Ok(count),
            Err(error) if error.kind() == ErrorKind::Interrupted => (),
            Err(error) => return Err(error),
        }
    }
}

fn init_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn client_config() -> Arc<ClientConfig> {
    init_crypto();
    let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    Arc::new(config)
}

fn server_config(cert_file: &Path, key_file: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    init_crypto();
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;
    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(TlsError::certificate)?;
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(TlsError::Certificate)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<IoResult<Vec<_>>>()
        .map_err(TlsError::Certificate)?;
    if certs.is_empty() {
        return Err(TlsError::Certificate(IoError::new(
            ErrorKind::InvalidData,
            "no certificates found in PEM file",
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(TlsError::Certificate)?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(TlsError::Certificate)?
        .ok_or_else(|| {
            TlsError::Certificate(IoError::new(
                ErrorKind::InvalidData,
                "no private key found in PEM file",
            ))
        })
}

/// Certificate verification policy is out of scope for this transport; the
/// TLS library still requires a verifier object, so this one accepts any
/// server certificate.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
