/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::env;
use std::process::exit;

use btls_rs::{Endpoint, SecureStream, Transport};

use log::{error, info};

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    /* Initialize the log output */
    env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    /* Print logo */
    info!("btls - Example TLS Echo Client [Version {}]", PKG_VERSION);

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());
    let port: u16 = args.next().map(|arg| arg.parse().expect("Invalid port number!")).unwrap_or(8443);
    let message = args.next().unwrap_or_else(|| "Hello, btls!".to_owned());

    let endpoint = match Endpoint::from_address(&host, port) {
        Ok(endpoint) => endpoint,
        Err(error) => {
            error!("Failed to create endpoint: {}", error);
            exit(1);
        }
    };

    info!("Connecting to {}", endpoint);
    let mut stream = match SecureStream::connect(&endpoint) {
        Ok(stream) => stream,
        Err(error) => {
            error!("Failed to connect: {}", error);
            exit(1);
        }
    };
    info!("Connected: {:?} -> {:?}", stream.local_addr(), stream.peer_addr());

    if let Err(error) = stream.write(message.as_bytes()) {
        error!("Failed to send message: {}", error);
        exit(1);
    }

    match stream.read(message.len()) {
        Ok(reply) => info!("Received echo: {:?}", String::from_utf8_lossy(&reply)),
        Err(error) => {
            error!("Failed to read echo: {}", error);
            exit(1);
        }
    }

    info!("That's it, goodbye!");
}
