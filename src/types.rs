//! Address primitives shared across the crate.
//!
//! A tunnel target may be an IP literal or a domain name that the proxy
//! resolves on our behalf, so `Host` keeps the distinction instead of
//! forcing early resolution.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A host that is either an IP address or a domain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ip(IpAddr),
    Name(Box<str>),
}

impl Host {
    /// Parse a host from a string, preferring the IP interpretation.
    pub fn parse(s: &str) -> Self {
        match s.parse::<IpAddr>() {
            Ok(ip) => Host::Ip(ip),
            Err(_) => Host::Name(s.into()),
        }
    }

    pub fn is_ip(&self) -> bool {
        matches!(self, Host::Ip(_))
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Host::Ip(ip) => Some(*ip),
            Host::Name(_) => None,
        }
    }

    pub fn as_domain(&self) -> Option<&str> {
        match self {
            Host::Name(d) => Some(d),
            Host::Ip(_) => None,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Ip(ip) => write!(f, "{ip}"),
            Host::Name(d) => write!(f, "{d}"),
        }
    }
}

impl From<IpAddr> for Host {
    fn from(ip: IpAddr) -> Self {
        Host::Ip(ip)
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host::parse(s)
    }
}

impl From<String> for Host {
    fn from(s: String) -> Self {
        Host::parse(&s)
    }
}

/// Host plus port: a connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: Host,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<Host>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        self.host.as_ip().map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for Endpoint {
    /// `host:port`, with IPv6 addresses bracketed so the result is
    /// valid in a CONNECT request line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            Host::Ip(IpAddr::V6(v6)) => write!(f, "[{v6}]:{}", self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: Host::Ip(addr.ip()),
            port: addr.port(),
        }
    }
}
