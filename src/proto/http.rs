//! HTTP CONNECT tunneling.
//!
//! One request, one response: `CONNECT host:port HTTP/1.1` followed by
//! a status line we require to be `2xx`. After that the hop relays raw
//! bytes, so payload encode/decode stay identity.

use async_trait::async_trait;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ProtoInfo, ProxyKind, ProxyOps, Stream};
use crate::context::{ChainContext, HandshakeState};
use crate::error::{Error, Result};
use crate::node::ProxyNode;

const DEFAULT_PORT: u16 = 8080;

/// Response head cap; a CONNECT response has no body worth reading.
const MAX_RESPONSE_HEAD: usize = 8192;

pub struct HttpOps;

#[async_trait]
impl ProxyOps for HttpOps {
    fn prefix(&self) -> &'static str {
        "http://"
    }

    fn kind(&self) -> ProxyKind {
        ProxyKind::Http
    }

    fn node_from_spec(&'static self, spec: &str) -> Result<ProxyNode> {
        ProxyNode::parse_with(self, spec, DEFAULT_PORT)
    }

    fn info_new(&self) -> ProtoInfo {
        ProtoInfo::Http
    }

    async fn establish(
        &self,
        stream: &mut dyn Stream,
        ctx: &mut ChainContext<'_>,
    ) -> Result<()> {
        let next = ctx.next_target();
        let mut req = format!("CONNECT {next} HTTP/1.1\r\nHost: {next}\r\n");
        if let Some((user, pass)) = ctx.current_node().auth() {
            let token =
                base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            req.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
        }
        req.push_str("\r\n");

        // State tracks protocol progress, not I/O completion: the hop
        // counts as connected once the request is on its way.
        ctx.set_state(HandshakeState::TcpConnected);
        stream.write_all(req.as_bytes()).await?;

        let head = read_response_head(stream).await?;
        if !status_is_success(&head) {
            let line = head
                .split(|&b| b == b'\r' || b == b'\n')
                .next()
                .map(|l| String::from_utf8_lossy(l).into_owned())
                .unwrap_or_default();
            return Err(Error::protocol(
                ProxyKind::Http,
                format!("proxy refused CONNECT: {line:?}"),
            ));
        }

        ctx.set_state(HandshakeState::TunnelEstablished);
        Ok(())
    }
}

/// Read until the blank line ending the response head, capped at
/// [`MAX_RESPONSE_HEAD`]. Anything the proxy sends after that belongs
/// to the tunnel and must not be consumed here; reads stop at the
/// terminator rather than draining the socket.
async fn read_response_head(stream: &mut dyn Stream) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::protocol(
                ProxyKind::Http,
                "proxy closed the connection before completing CONNECT",
            ));
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            return Ok(head);
        }
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::protocol(
                ProxyKind::Http,
                "CONNECT response head exceeds 8 KiB",
            ));
        }
    }
}

/// Strict status-line check: `HTTP/1.<0|1> <2xx>`. Only the status
/// line counts; a `200 OK` elsewhere in the payload does not.
fn status_is_success(head: &[u8]) -> bool {
    let line = match head.split(|&b| b == b'\r').next() {
        Some(l) => l,
        None => return false,
    };
    let Ok(line) = std::str::from_utf8(line) else {
        return false;
    };
    let mut parts = line.splitn(3, ' ');
    let version_ok = matches!(parts.next(), Some("HTTP/1.1") | Some("HTTP/1.0"));
    let status_ok = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code));
    version_ok && status_ok
}
