//! Error taxonomy for chain construction and hop negotiation.
//!
//! Configuration problems surface when the chain is built, before any
//! connection is attempted. Handshake failures surface exactly once, to
//! the caller of the connect operation, and are never retried here;
//! timeouts get their own variant so callers can tell a misbehaving
//! proxy from an unreachable one.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::proto::ProxyKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed proxy spec string, unknown scheme, or unresolvable
    /// host. Fatal to chain construction; no connection is attempted.
    #[error("config: {0}")]
    Config(String),

    /// Transport-level failure while dialing or talking to a hop.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The hop answered, but not with a success reply (bad status line,
    /// rejected request, malformed reply bytes).
    #[error("{kind} handshake: {msg}")]
    Protocol { kind: ProxyKind, msg: String },

    /// No success reply arrived within the handshake window for the
    /// given hop.
    #[error("{kind} handshake timeout after {timeout:?} (hop {hop})")]
    HandshakeTimeout {
        kind: ProxyKind,
        hop: usize,
        timeout: Duration,
    },
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn protocol(kind: ProxyKind, msg: impl Into<String>) -> Self {
        Error::Protocol {
            kind,
            msg: msg.into(),
        }
    }

    /// True for handshake timeouts (not generic I/O timeouts).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::HandshakeTimeout { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let e = Error::config("bad spec");
        assert_eq!(e.to_string(), "config: bad spec");
        assert!(e.is_config());

        let e = Error::protocol(ProxyKind::Http, "status 403");
        assert_eq!(e.to_string(), "http handshake: status 403");
        assert!(!e.is_timeout());

        let e = Error::HandshakeTimeout {
            kind: ProxyKind::Socks5,
            hop: 1,
            timeout: Duration::from_millis(4000),
        };
        assert!(e.is_timeout());
        assert!(e.to_string().contains("socks5"));
        assert!(e.to_string().contains("hop 1"));
    }
}
