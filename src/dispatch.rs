//! Chain traversal: the single place that advances hop position.
//!
//! Protocol handlers drive one hop's handshake; only the dispatcher
//! moves [`ChainContext::current`] forward and resets per-hop state.
//! Advancing is a bounded loop over the hop sequence, not recursion:
//! each iteration runs one handshake to completion under its own
//! timeout, then either steps to the next hop or hands the stream back
//! to the application untouched.
//!
//! [`ChainContext::current`]: crate::context::ChainContext::current

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::chain::ProxyChain;
use crate::context::{ChainContext, HandshakeState};
use crate::error::{Error, Result};
use crate::net::dial;
use crate::proto::Stream;
use crate::telemetry;
use crate::types::Endpoint;
use crate::util::env::env_duration_ms;

/// Per-connection dialing knobs. The defaults read `PC_CONNECT_TIMEOUT_MS`
/// (10000) and `PC_HANDSHAKE_TIMEOUT_MS` (4000); the handshake timeout is
/// applied per hop, so a chain of N hops may take up to N times it.
#[derive(Debug, Clone)]
pub struct DialOpts {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub keepalive: Option<Duration>,
}

impl Default for DialOpts {
    fn default() -> Self {
        Self {
            connect_timeout: env_duration_ms("PC_CONNECT_TIMEOUT_MS", 10_000),
            handshake_timeout: env_duration_ms("PC_HANDSHAKE_TIMEOUT_MS", 4_000),
            keepalive: Some(Duration::from_secs(30)),
        }
    }
}

impl ProxyChain {
    /// Connect to `target` through every hop of the chain in order.
    ///
    /// On success the returned stream is a plain transport: everything
    /// written or read from here on passes through the established
    /// tunnels with no transformation or added latency from this layer.
    /// Dropping the future at any suspension point cancels the attempt
    /// and releases the socket; no further hop handlers run.
    pub async fn connect(&self, target: Endpoint) -> Result<TcpStream> {
        self.connect_with(target, &DialOpts::default()).await
    }

    /// [`connect`](ProxyChain::connect) with explicit timeouts.
    pub async fn connect_with(&self, target: Endpoint, opts: &DialOpts) -> Result<TcpStream> {
        let first = self.first();
        let kind = first.kind().as_str();
        let mut stream =
            match dial::connect_with_keepalive(first.addr(), opts.connect_timeout, opts.keepalive)
                .await
            {
                Ok(s) => {
                    telemetry::chain_connect(kind, "ok", None);
                    s
                }
                Err(e) => {
                    telemetry::chain_connect(
                        kind,
                        if e.kind() == std::io::ErrorKind::TimedOut {
                            "timeout"
                        } else {
                            "error"
                        },
                        Some(telemetry::err_kind(&e)),
                    );
                    return Err(e.into());
                }
            };

        let mut ctx = ChainContext::new(self, target);
        drive(&mut stream, &mut ctx, opts.handshake_timeout).await?;
        Ok(stream)
    }
}

/// Negotiate every remaining hop of `ctx` over `stream`.
///
/// Public so the chain can be driven over transports other than a raw
/// `TcpStream` (an already-layered stream, or an in-memory pipe in
/// tests). Returns once the last hop reports its tunnel established.
pub async fn drive(
    stream: &mut dyn Stream,
    ctx: &mut ChainContext<'_>,
    handshake_timeout: Duration,
) -> Result<()> {
    loop {
        let hop = ctx.current();
        let ops = ctx.current_node().ops();
        let kind = ops.kind();
        tracing::debug!(
            target: "proxy_chain::dispatch",
            hop,
            kind = %kind,
            next = %ctx.next_target(),
            "negotiating hop"
        );

        match timeout(handshake_timeout, ops.establish(&mut *stream, &mut *ctx)).await {
            Ok(Ok(())) => {
                telemetry::chain_handshake(kind.as_str(), "ok", None);
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "proxy_chain::dispatch",
                    hop,
                    kind = %kind,
                    error = %e,
                    "hop handshake failed"
                );
                telemetry::chain_handshake(kind.as_str(), "error", Some("proto"));
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    target: "proxy_chain::dispatch",
                    hop,
                    kind = %kind,
                    timeout_ms = handshake_timeout.as_millis() as u64,
                    "hop handshake timed out"
                );
                telemetry::chain_handshake(kind.as_str(), "timeout", Some("timeout"));
                return Err(Error::HandshakeTimeout {
                    kind,
                    hop,
                    timeout: handshake_timeout,
                });
            }
        }

        // A handler returning Ok while its hop is not established can
        // only be a handler bug, never network input; negotiating the
        // next hop over a half-built tunnel would corrupt the chain.
        assert!(
            ctx.state() == HandshakeState::TunnelEstablished,
            "hop {hop} handler returned without establishing its tunnel"
        );

        if !ctx.advance() {
            tracing::debug!(
                target: "proxy_chain::dispatch",
                hops = hop + 1,
                target = %ctx.target(),
                "chain traversal complete"
            );
            return Ok(());
        }
    }
}
