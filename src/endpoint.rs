/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use dns_lookup::lookup_host;

use crate::TlsError;

/// An IPv4 address and port identifying a network peer or a local bind target
///
/// An `Endpoint` is immutable once constructed. It comes in two forms: a
/// *wildcard* endpoint created via [`from_port()`](Endpoint::from_port), which
/// is only suitable for binding a listener, and a *specific* endpoint created
/// via [`from_address()`](Endpoint::from_address) from a dotted-decimal IPv4
/// literal or a resolvable hostname.
///
/// Only IPv4 is supported; hostname resolution ignores any non-IPv4 records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    addr: SocketAddrV4,
}

impl Endpoint {
    /// Creates a wildcard endpoint for the given port (host byte order),
    /// accepting clients from any address. Always succeeds.
    pub fn from_port(port: u16) -> Self {
        Self {
            addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
        }
    }

    /// Creates an endpoint from an IPv4 literal or a hostname plus a port
    /// (host byte order).
    ///
    /// A string that looks like a dotted-decimal literal (digits and exactly
    /// three dots) is parsed directly and fails with
    /// [`TlsError::InvalidAddress`] if malformed. Anything else is treated as
    /// a hostname and resolved with a *blocking* DNS lookup, failing with
    /// [`TlsError::ResolutionFailed`] if the lookup errors or returns no IPv4
    /// records. The first IPv4 record is used.
    pub fn from_address(addr: &str, port: u16) -> Result<Self, TlsError> {
        let ip = if looks_like_ipv4(addr) {
            addr.parse::<Ipv4Addr>()
                .map_err(|_| TlsError::InvalidAddress(addr.to_owned()))?
        } else {
            resolve_first_v4(addr)?
        };
        Ok(Self {
            addr: SocketAddrV4::new(ip, port),
        })
    }

    pub(crate) fn from_peer(addr: SocketAddr) -> Self {
        let addr = match addr {
            SocketAddr::V4(v4) => v4,
            // v4-mapped peers can show up on dual-stack hosts
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(ip) => SocketAddrV4::new(ip, v6.port()),
                None => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, v6.port()),
            },
        };
        Self { addr }
    }

    /// Returns `true` if this endpoint is the wildcard ("any address") form,
    /// i.e. it was created for binding a listener.
    pub fn is_listening(&self) -> bool {
        self.addr.ip().is_unspecified()
    }

    /// The native socket address representation, for use in socket calls.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.addr)
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.addr.ip()
    }

    /// The port in host byte order.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}

fn looks_like_ipv4(addr: &str) -> bool {
    addr.bytes().filter(|byte| *byte == b'.').count() == 3
        && addr.bytes().all(|byte| byte == b'.' || byte.is_ascii_digit())
}

fn resolve_first_v4(host: &str) -> Result<Ipv4Addr, TlsError> {
    let records = lookup_host(host).map_err(|_| TlsError::ResolutionFailed(host.to_owned()))?;
    records
        .into_iter()
        .find_map(|record| match record {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| TlsError::ResolutionFailed(host.to_owned()))
}
