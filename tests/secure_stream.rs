/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */

//! Live loopback tests: every connection below performs a real TLS handshake
//! between two threads of this process, using a freshly generated
//! self-signed certificate.

use std::fs;
use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use btls_rs::{Endpoint, Listener, ReadinessSet, SecureStream, TlsError, Transport, WaitSet};

static CERT_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes a self-signed certificate and matching PKCS#8 key to the temp
/// directory and returns their paths.
fn write_test_cert() -> (PathBuf, PathBuf) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("certificate generation failed");
    let tag = format!(
        "btls-test-{}-{}",
        process::id(),
        CERT_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let cert_path = std::env::temp_dir().join(format!("{}.crt.pem", tag));
    let key_path = std::env::temp_dir().join(format!("{}.key.pem", tag));
    fs::write(&cert_path, certified.cert.pem()).expect("failed to write certificate");
    fs::write(&key_path, certified.key_pair.serialize_pem()).expect("failed to write key");
    (cert_path, key_path)
}

fn bind_local() -> SecureStream {
    let (cert_path, key_path) = write_test_cert();
    SecureStream::bind(&Endpoint::from_port(0), cert_path, key_path).expect("bind failed")
}

fn local_port(listener: &SecureStream) -> u16 {
    listener.local_addr().expect("no local address").port()
}

fn connect_loopback(port: u16) -> SecureStream {
    let endpoint = Endpoint::from_address("127.0.0.1", port).expect("endpoint failed");
    SecureStream::connect(&endpoint).expect("connect failed")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn ping_round_trip_and_peer_address() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    let client = thread::spawn(move || {
        let mut stream = connect_loopback(port);
        stream.write(b"ping").expect("client write failed");
        let reply = stream.read(4).expect("client read failed");
        assert_eq!(reply, b"pong");
    });

    let mut connection = listener.accept().expect("accept failed");
    assert_eq!(connection.endpoint().ip(), Ipv4Addr::LOCALHOST);
    assert!(!connection.endpoint().is_listening());

    let request = connection.read(4).expect("server read failed");
    assert_eq!(request, b"ping");
    connection.write(b"pong").expect("server write failed");

    client.join().expect("client thread panicked");
}

#[test]
fn round_trips_across_buffer_boundaries() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    // Lengths spanning the 4096-byte initial buffer and its growth margin.
    let lengths = [1usize, 2, 512, 1023, 1024, 4095, 4096, 4097, 5000];

    let client = thread::spawn(move || {
        let mut stream = connect_loopback(port);
        for len in lengths {
            let payload = pattern(len);
            stream.write(&payload).expect("client write failed");
            let echoed = stream.read(len).expect("client read failed");
            assert_eq!(echoed, payload, "echo mismatch at length {}", len);
        }
    });

    let mut connection = listener.accept().expect("accept failed");
    for len in lengths {
        let received = connection.read(len).expect("server read failed");
        assert_eq!(received.len(), len);
        connection.write(&received).expect("server write failed");
    }

    client.join().expect("client thread panicked");
}

#[test]
fn split_writes_match_combined_transfer() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    let client = thread::spawn(move || {
        let mut stream = connect_loopback(port);
        // Two separate writes, read back as two matching-sized reads.
        stream.write(b"ping").expect("write failed");
        stream.write(b"pong").expect("write failed");
        // One combined write, read back as two halves.
        stream.write(b"wxyzabcd").expect("write failed");
        let done = stream.read(2).expect("read failed");
        assert_eq!(done, b"ok");
    });

    let mut connection = listener.accept().expect("accept failed");
    assert_eq!(connection.read(4).expect("read failed"), b"ping");
    assert_eq!(connection.read(4).expect("read failed"), b"pong");
    assert_eq!(connection.read(4).expect("read failed"), b"wxyz");
    assert_eq!(connection.read(4).expect("read failed"), b"abcd");
    connection.write(b"ok").expect("write failed");

    client.join().expect("client thread panicked");
}

#[test]
fn try_read_accumulates_from_concurrent_sender() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    let total = pattern(10_000);
    let (go_tx, go_rx) = crossbeam_channel::bounded::<()>(0);

    let payload = total.clone();
    let client = thread::spawn(move || {
        let mut stream = connect_loopback(port);
        go_rx.recv().expect("go signal lost");
        for chunk in payload.chunks(1500) {
            stream.write(chunk).expect("client write failed");
            thread::sleep(Duration::from_millis(1));
        }
        // Hold the connection open until the receiver is done.
        let done = stream.read(2).expect("client read failed");
        assert_eq!(done, b"ok");
    });

    let mut connection = listener.accept().expect("accept failed");

    // Nothing has been sent yet: a non-blocking read returns empty at once.
    let empty = connection.try_read().expect("try_read failed");
    assert!(empty.is_empty());

    go_tx.send(()).expect("client thread gone");

    let mut read_set = ReadinessSet::new();
    connection.register_readiness(&mut read_set);

    let mut accumulated = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(30);
    while accumulated.len() < total.len() {
        assert!(Instant::now() < deadline, "receiver timed out");
        {
            let mut sets = [WaitSet::Read(&mut read_set)];
            ReadinessSet::wait_timeout(Duration::from_millis(100), &mut sets)
                .expect("wait failed");
        }
        // OS readiness can lag behind TLS-buffered data, so always drain.
        accumulated.extend(connection.try_read().expect("try_read failed"));
    }
    assert_eq!(accumulated, total);

    connection.unregister_readiness(&mut read_set);
    assert!(read_set.is_empty());

    connection.write(b"ok").expect("server write failed");
    client.join().expect("client thread panicked");
}

#[test]
fn short_read_leaves_remainder_available() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    let client = thread::spawn(move || {
        let mut stream = connect_loopback(port);
        stream.write(&pattern(10)).expect("client write failed");
        let done = stream.read(2).expect("client read failed");
        assert_eq!(done, b"ok");
    });

    let mut connection = listener.accept().expect("accept failed");

    let head = connection.read(4).expect("read failed");
    assert_eq!(head, &pattern(10)[..4]);

    // The rest of the record is decrypted and buffered, invisible to the OS.
    assert_eq!(connection.available(), 6);
    assert!(!connection.is_readiness_signaled(&ReadinessSet::new()));

    let tail = connection.read(6).expect("read failed");
    assert_eq!(tail, &pattern(10)[4..]);
    assert_eq!(connection.available(), 0);

    connection.write(b"ok").expect("server write failed");
    client.join().expect("client thread panicked");
}

#[test]
fn read_zero_returns_first_receive() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    let client = thread::spawn(move || {
        let mut stream = connect_loopback(port);
        stream.write(b"hello").expect("client write failed");
        let done = stream.read(2).expect("client read failed");
        assert_eq!(done, b"ok");
    });

    let mut connection = listener.accept().expect("accept failed");
    let received = connection.read(0).expect("read failed");
    assert!(!received.is_empty());
    assert_eq!(received, &b"hello"[..received.len()]);

    connection.write(b"ok").expect("server write failed");
    client.join().expect("client thread panicked");
}

#[test]
fn missing_certificate_fails_without_binding() {
    init_logging();
    let endpoint = Endpoint::from_port(0);
    let error = SecureStream::bind(&endpoint, "/nonexistent/cert.pem", "/nonexistent/key.pem")
        .unwrap_err();
    assert!(matches!(error, TlsError::Certificate(_)));
}

#[test]
fn bad_certificate_leaves_port_unbound() {
    init_logging();
    // Grab a concrete free port first, then show a failed bind left it free.
    let probe = TcpListener::bind("0.0.0.0:0").expect("probe bind failed");
    let port = probe.local_addr().expect("no local address").port();
    drop(probe);

    let endpoint = Endpoint::from_port(port);
    let error = SecureStream::bind(&endpoint, "/nonexistent/cert.pem", "/nonexistent/key.pem")
        .unwrap_err();
    assert!(matches!(error, TlsError::Certificate(_)));

    TcpListener::bind(("0.0.0.0", port)).expect("port was left bound");
}

#[test]
fn key_file_with_no_key_is_certificate_error() {
    init_logging();
    let (cert_path, _key_path) = write_test_cert();
    // The certificate file contains no private key.
    let error = SecureStream::bind(&Endpoint::from_port(0), &cert_path, &cert_path).unwrap_err();
    assert!(matches!(error, TlsError::Certificate(_)));
}

#[test]
fn accept_on_client_stream_is_invalid_state() {
    init_logging();
    let listener = bind_local();
    let port = local_port(&listener);

    let client = thread::spawn(move || {
        let stream = connect_loopback(port);
        let error = Listener::accept(&stream).unwrap_err();
        assert!(matches!(error, TlsError::InvalidState(_)));
    });

    let _connection = listener.accept().expect("accept failed");
    client.join().expect("client thread panicked");
}

#[test]
fn data_operations_on_listener_are_invalid_state() {
    init_logging();
    let mut listener = bind_local();
    assert!(listener.is_listener());
    assert_eq!(listener.available(), 0);
    assert!(matches!(listener.write(b"x"), Err(TlsError::InvalidState(_))));
    assert!(matches!(listener.read(1), Err(TlsError::InvalidState(_))));
    assert!(matches!(listener.try_read(), Err(TlsError::InvalidState(_))));
    assert!(listener.peer_addr().is_none());
}
