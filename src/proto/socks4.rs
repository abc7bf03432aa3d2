//! SOCKS4 (and SOCKS4a for domain targets).
//!
//! Fixed-format connect request, fixed 8-byte reply. The user-id field
//! carries the node's configured username, empty otherwise. Targets
//! that are domain names use the 4a extension (address 0.0.0.1 plus the
//! hostname after the user-id); IPv6 targets cannot be expressed in
//! this protocol at all.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ProtoInfo, ProxyKind, ProxyOps, Stream};
use crate::context::{ChainContext, HandshakeState};
use crate::error::{Error, Result};
use crate::node::ProxyNode;
use crate::types::Host;

const DEFAULT_PORT: u16 = 1080;

const VERSION: u8 = 0x04;
const CMD_CONNECT: u8 = 0x01;
const REP_GRANTED: u8 = 0x5a;

pub struct Socks4Ops;

#[async_trait]
impl ProxyOps for Socks4Ops {
    fn prefix(&self) -> &'static str {
        "socks4://"
    }

    fn kind(&self) -> ProxyKind {
        ProxyKind::Socks4
    }

    fn node_from_spec(&'static self, spec: &str) -> Result<ProxyNode> {
        ProxyNode::parse_with(self, spec, DEFAULT_PORT)
    }

    fn info_new(&self) -> ProtoInfo {
        ProtoInfo::Socks4
    }

    async fn establish(
        &self,
        stream: &mut dyn Stream,
        ctx: &mut ChainContext<'_>,
    ) -> Result<()> {
        let next = ctx.next_target();
        let user = ctx.current_node().auth().map(|(u, _)| u).unwrap_or("");

        let mut req = Vec::with_capacity(9 + user.len());
        req.push(VERSION);
        req.push(CMD_CONNECT);
        req.extend_from_slice(&next.port.to_be_bytes());
        let hostname_tail = match &next.host {
            Host::Ip(std::net::IpAddr::V4(v4)) => {
                req.extend_from_slice(&v4.octets());
                None
            }
            Host::Ip(std::net::IpAddr::V6(_)) => {
                return Err(Error::protocol(
                    ProxyKind::Socks4,
                    "IPv6 targets cannot be expressed in SOCKS4",
                ));
            }
            // SOCKS4a: invalid address 0.0.0.x signals "hostname follows".
            Host::Name(name) => {
                req.extend_from_slice(&[0, 0, 0, 1]);
                Some(name.as_ref())
            }
        };
        req.extend_from_slice(user.as_bytes());
        req.push(0);
        if let Some(name) = hostname_tail {
            req.extend_from_slice(name.as_bytes());
            req.push(0);
        }

        stream.write_all(&req).await?;
        ctx.set_state(HandshakeState::RequestSent);

        let mut reply = [0u8; 8];
        stream.read_exact(&mut reply).await?;
        // Reply version is 0, not 4.
        if reply[0] != 0 {
            return Err(Error::protocol(
                ProxyKind::Socks4,
                format!("bad reply version {:#04x}", reply[0]),
            ));
        }
        if reply[1] != REP_GRANTED {
            return Err(Error::protocol(
                ProxyKind::Socks4,
                format!("request rejected: {}", reject_reason(reply[1])),
            ));
        }

        ctx.set_state(HandshakeState::TunnelEstablished);
        Ok(())
    }
}

fn reject_reason(code: u8) -> &'static str {
    match code {
        0x5b => "rejected or failed",
        0x5c => "identd unreachable",
        0x5d => "identd user mismatch",
        _ => "unknown status",
    }
}
