//! SOCKS5 (RFC 1928), with RFC 1929 username/password auth.
//!
//! The only protocol in the family with a negotiation sub-phase before
//! the connect request, and the only one whose payload encode/decode do
//! real work: when a method that encapsulates the stream has been
//! negotiated, application bytes travel in length-prefixed frames.

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ProtoInfo, ProxyKind, ProxyOps, Stream};
use crate::context::{ChainContext, HandshakeState};
use crate::error::{Error, Result};
use crate::node::ProxyNode;
use crate::types::{Endpoint, Host};

const DEFAULT_PORT: u16 = 1080;

const VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;
const METHOD_NONE: u8 = 0x00;
const METHOD_USERPASS: u8 = 0x02;
const METHOD_UNACCEPTABLE: u8 = 0xff;
const ATYP_V4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_V6: u8 = 0x04;

/// Negotiated state for one SOCKS5 hop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Socks5Info {
    /// Authentication method the server selected.
    pub method: u8,
    /// Whether the negotiated method encapsulates the stream, turning
    /// [`ProxyOps::encode`]/[`ProxyOps::decode`] into frame wrapping.
    pub framed: bool,
    /// Server-side bound address from the connect reply.
    pub bound: Option<Endpoint>,
}

pub struct Socks5Ops;

#[async_trait]
impl ProxyOps for Socks5Ops {
    fn prefix(&self) -> &'static str {
        "socks5://"
    }

    fn kind(&self) -> ProxyKind {
        ProxyKind::Socks5
    }

    fn node_from_spec(&'static self, spec: &str) -> Result<ProxyNode> {
        ProxyNode::parse_with(self, spec, DEFAULT_PORT)
    }

    fn info_new(&self) -> ProtoInfo {
        ProtoInfo::Socks5(Socks5Info::default())
    }

    async fn establish(
        &self,
        stream: &mut dyn Stream,
        ctx: &mut ChainContext<'_>,
    ) -> Result<()> {
        let auth = ctx
            .current_node()
            .auth()
            .map(|(u, p)| (u.to_string(), p.to_string()));

        // Method greeting.
        let greeting: &[u8] = if auth.is_some() {
            &[VERSION, 2, METHOD_NONE, METHOD_USERPASS]
        } else {
            &[VERSION, 1, METHOD_NONE]
        };
        stream.write_all(greeting).await?;
        ctx.set_state(HandshakeState::GreetingSent);

        let mut choice = [0u8; 2];
        stream.read_exact(&mut choice).await?;
        if choice[0] != VERSION {
            return Err(Error::protocol(
                ProxyKind::Socks5,
                format!("bad version {:#04x} in method reply", choice[0]),
            ));
        }
        match choice[1] {
            METHOD_NONE => {}
            METHOD_USERPASS => {
                let (user, pass) = auth.ok_or_else(|| {
                    Error::protocol(
                        ProxyKind::Socks5,
                        "server demands username/password but none configured",
                    )
                })?;
                subnegotiate_userpass(stream, ctx, &user, &pass).await?;
            }
            METHOD_UNACCEPTABLE => {
                return Err(Error::protocol(
                    ProxyKind::Socks5,
                    "no acceptable authentication method",
                ));
            }
            other => {
                return Err(Error::protocol(
                    ProxyKind::Socks5,
                    format!("server selected unsupported method {other:#04x}"),
                ));
            }
        }
        if let ProtoInfo::Socks5(info) = ctx.info_mut() {
            info.method = choice[1];
        }

        // Connect request.
        let next = ctx.next_target();
        let mut req = Vec::with_capacity(22);
        req.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00]);
        match &next.host {
            Host::Ip(IpAddr::V4(v4)) => {
                req.push(ATYP_V4);
                req.extend_from_slice(&v4.octets());
            }
            Host::Ip(IpAddr::V6(v6)) => {
                req.push(ATYP_V6);
                req.extend_from_slice(&v6.octets());
            }
            Host::Name(name) => {
                let nb = name.as_bytes();
                if nb.len() > 255 {
                    return Err(Error::protocol(ProxyKind::Socks5, "domain name too long"));
                }
                req.push(ATYP_DOMAIN);
                req.push(nb.len() as u8);
                req.extend_from_slice(nb);
            }
        }
        req.extend_from_slice(&next.port.to_be_bytes());
        stream.write_all(&req).await?;
        ctx.set_state(HandshakeState::RequestSent);

        // Connect reply: VER REP RSV ATYP BND.ADDR BND.PORT.
        let mut head = [0u8; 4];
        stream.read_exact(&mut head).await?;
        if head[0] != VERSION {
            return Err(Error::protocol(
                ProxyKind::Socks5,
                format!("bad version {:#04x} in connect reply", head[0]),
            ));
        }
        if head[1] != 0x00 {
            return Err(Error::protocol(
                ProxyKind::Socks5,
                format!("connect refused: {}", rep_reason(head[1])),
            ));
        }
        let bound = read_bound_addr(stream, head[3]).await?;
        if let ProtoInfo::Socks5(info) = ctx.info_mut() {
            info.bound = bound;
        }

        ctx.set_state(HandshakeState::TunnelEstablished);
        Ok(())
    }

    fn encode(&self, payload: &[u8], info: &ProtoInfo) -> Vec<u8> {
        match info {
            ProtoInfo::Socks5(i) if i.framed => frame::encode(payload),
            _ => payload.to_vec(),
        }
    }

    fn decode(&self, payload: &[u8], info: &ProtoInfo) -> Result<Vec<u8>> {
        match info {
            ProtoInfo::Socks5(i) if i.framed => frame::decode(payload),
            _ => Ok(payload.to_vec()),
        }
    }
}

async fn subnegotiate_userpass(
    stream: &mut dyn Stream,
    ctx: &mut ChainContext<'_>,
    user: &str,
    pass: &str,
) -> Result<()> {
    let (ub, pb) = (user.as_bytes(), pass.as_bytes());
    if ub.len() > 255 || pb.len() > 255 {
        return Err(Error::protocol(
            ProxyKind::Socks5,
            "username or password exceeds 255 bytes",
        ));
    }
    let mut msg = Vec::with_capacity(3 + ub.len() + pb.len());
    msg.push(0x01); // subnegotiation version
    msg.push(ub.len() as u8);
    msg.extend_from_slice(ub);
    msg.push(pb.len() as u8);
    msg.extend_from_slice(pb);
    stream.write_all(&msg).await?;
    ctx.set_state(HandshakeState::AuthSent);

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(Error::protocol(
            ProxyKind::Socks5,
            "username/password rejected",
        ));
    }
    Ok(())
}

/// Consume BND.ADDR and BND.PORT from a connect reply.
async fn read_bound_addr(stream: &mut dyn Stream, atyp: u8) -> Result<Option<Endpoint>> {
    let host = match atyp {
        ATYP_V4 => {
            let mut b = [0u8; 4];
            stream.read_exact(&mut b).await?;
            Host::Ip(IpAddr::from(b))
        }
        ATYP_V6 => {
            let mut b = [0u8; 16];
            stream.read_exact(&mut b).await?;
            Host::Ip(IpAddr::from(b))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            stream.read_exact(&mut name).await?;
            match String::from_utf8(name) {
                Ok(s) => Host::Name(s.into()),
                Err(_) => {
                    return Err(Error::protocol(
                        ProxyKind::Socks5,
                        "bound address is not valid UTF-8",
                    ))
                }
            }
        }
        other => {
            return Err(Error::protocol(
                ProxyKind::Socks5,
                format!("bad ATYP {other:#04x} in connect reply"),
            ));
        }
    };
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok(Some(Endpoint::new(host, u16::from_be_bytes(port))))
}

fn rep_reason(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

/// Length-prefixed framing for encapsulating auth methods: a 4-byte
/// big-endian payload length followed by the payload.
pub mod frame {
    use crate::error::{Error, Result};
    use crate::proto::ProxyKind;

    pub const HEADER_LEN: usize = 4;

    pub fn encode(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Exact inverse of [`encode`]: rejects truncated frames and
    /// trailing bytes.
    pub fn decode(buf: &[u8]) -> Result<Vec<u8>> {
        if buf.len() < HEADER_LEN {
            return Err(Error::protocol(ProxyKind::Socks5, "frame shorter than header"));
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let body = &buf[HEADER_LEN..];
        if body.len() != len {
            return Err(Error::protocol(
                ProxyKind::Socks5,
                format!("frame length {len} does not match body length {}", body.len()),
            ));
        }
        Ok(body.to_vec())
    }
}
