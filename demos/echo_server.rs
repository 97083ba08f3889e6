/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::env;
use std::process::exit;

use btls_rs::{Endpoint, SecureStream, Transport};

use log::{error, info, warn};

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    /* Initialize the log output */
    env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    /* Print logo */
    info!("btls - Example TLS Echo Server [Version {}]", PKG_VERSION);

    let mut args = env::args().skip(1);
    let (cert_file, key_file) = match (args.next(), args.next()) {
        (Some(cert), Some(key)) => (cert, key),
        _ => {
            error!("Usage: echo_server <cert.pem> <key.pem> [port]");
            exit(1);
        }
    };
    let port: u16 = args.next().map(|arg| arg.parse().expect("Invalid port number!")).unwrap_or(8443);

    let listener = match SecureStream::bind(&Endpoint::from_port(port), &cert_file, &key_file) {
        Ok(listener) => listener,
        Err(error) => {
            error!("Failed to bind listener: {}", error);
            exit(1);
        }
    };
    info!("Listening on {:?}", listener.local_addr());

    loop {
        match listener.accept() {
            Ok(connection) => serve(connection),
            Err(error) => warn!("Failed to accept connection: {}", error),
        }
    }
}

fn serve(mut connection: SecureStream) {
    info!("Connection from {}", connection.endpoint());
    loop {
        let data = match connection.read(0) {
            Ok(data) => data,
            Err(error) => {
                info!("Connection ended: {}", error);
                return;
            }
        };
        info!("Echoing {} byte(s)", data.len());
        if let Err(error) = connection.write(&data) {
            warn!("Failed to write echo: {}", error);
            return;
        }
    }
}
