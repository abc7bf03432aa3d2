//! Per-protocol proxy operations and the static protocol registry.
//!
//! Each supported protocol contributes exactly one immutable
//! [`ProxyOps`] instance. The registry maps a spec-string scheme prefix
//! to that instance once, at configuration time; handshakes then go
//! through plain trait dispatch with no per-event lookups.

pub mod http;
pub mod socks4;
pub mod socks5;

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::context::ChainContext;
use crate::error::Result;
use crate::node::ProxyNode;

/// Byte stream a handshake runs over. Blanket-implemented so both real
/// sockets and in-memory pipes qualify.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> Stream for T {}

/// Supported proxy protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Http,
    Socks4,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks4 => "socks4",
            ProxyKind::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-private per-connection scratch state, reset whenever the
/// chain advances to a new hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoInfo {
    /// HTTP CONNECT keeps no negotiation state.
    Http,
    Socks4,
    Socks5(socks5::Socks5Info),
}

/// One protocol's capability set: spec parsing, scratch-state
/// construction, the hop handshake, and payload wrapping.
///
/// Exactly one `&'static` instance exists per [`ProxyKind`]; all nodes
/// of that protocol share it read-only.
#[async_trait]
pub trait ProxyOps: Send + Sync {
    /// Scheme prefix this protocol claims in spec strings, e.g. `"http://"`.
    fn prefix(&self) -> &'static str;

    fn kind(&self) -> ProxyKind;

    /// Build an immutable node from `scheme://[user:pass@]host[:port]`.
    fn node_from_spec(&'static self, spec: &str) -> Result<ProxyNode>;

    /// Fresh scratch state for one hop of one connection.
    fn info_new(&self) -> ProtoInfo;

    /// Drive this hop from `Initial` to `TunnelEstablished`, tunneling
    /// toward [`ChainContext::next_target`]. Runs over the stream the
    /// previous hops already established; must suspend (`.await`)
    /// rather than block.
    async fn establish(
        &self,
        stream: &mut dyn Stream,
        ctx: &mut ChainContext<'_>,
    ) -> Result<()>;

    /// Wrap application bytes for transmission through the established
    /// tunnel. Identity for protocols that relay raw bytes.
    fn encode(&self, payload: &[u8], _info: &ProtoInfo) -> Vec<u8> {
        payload.to_vec()
    }

    /// Inverse of [`encode`](ProxyOps::encode).
    fn decode(&self, payload: &[u8], _info: &ProtoInfo) -> Result<Vec<u8>> {
        Ok(payload.to_vec())
    }
}

/// The one instance per protocol, in registration order.
static REGISTRY: &[&(dyn ProxyOps)] = &[&http::HttpOps, &socks4::Socks4Ops, &socks5::Socks5Ops];

/// Look up the protocol claiming `spec`'s scheme prefix.
pub fn ops_for_spec(spec: &str) -> Option<&'static dyn ProxyOps> {
    REGISTRY.iter().copied().find(|ops| {
        spec.get(..ops.prefix().len())
            .is_some_and(|head| head.eq_ignore_ascii_case(ops.prefix()))
    })
}

pub fn ops_for_kind(kind: ProxyKind) -> &'static dyn ProxyOps {
    match kind {
        ProxyKind::Http => &http::HttpOps,
        ProxyKind::Socks4 => &socks4::Socks4Ops,
        ProxyKind::Socks5 => &socks5::Socks5Ops,
    }
}
