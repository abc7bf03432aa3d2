//! Per-connection negotiation state.
//!
//! A [`ChainContext`] tracks which hop of a shared [`ProxyChain`] a
//! single connection is currently negotiating and how far that hop's
//! handshake has progressed. Two invariants hold for the connection's
//! lifetime: `current` only ever advances forward through the chain,
//! and `state` only ever moves forward within a hop, resetting to
//! [`HandshakeState::Initial`] when the chain advances.

use crate::chain::ProxyChain;
use crate::node::ProxyNode;
use crate::proto::ProtoInfo;
use crate::types::Endpoint;

/// Handshake progress for the hop currently being negotiated. The
/// variants cover all supported protocols; each protocol walks a
/// forward-only subset ending in [`TunnelEstablished`].
///
/// [`TunnelEstablished`]: HandshakeState::TunnelEstablished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Raw TCP to the hop is up; nothing sent yet.
    Initial,
    /// HTTP: CONNECT request issued, awaiting the response.
    TcpConnected,
    /// SOCKS5: method greeting issued.
    GreetingSent,
    /// SOCKS5: username/password subnegotiation issued.
    AuthSent,
    /// SOCKS4/SOCKS5: connect request issued, awaiting the reply.
    RequestSent,
    /// Terminal for the hop; bytes now pass through untouched.
    TunnelEstablished,
}

impl HandshakeState {
    fn rank(self) -> u8 {
        match self {
            HandshakeState::Initial => 0,
            HandshakeState::TcpConnected | HandshakeState::GreetingSent => 1,
            HandshakeState::AuthSent => 2,
            HandshakeState::RequestSent => 3,
            HandshakeState::TunnelEstablished => 4,
        }
    }
}

/// Mutable per-connection view into a shared, immutable chain.
///
/// Exclusively owned by one connection's negotiation; never shared, so
/// no locking. Dropped when the connection closes or negotiation fails.
#[derive(Debug)]
pub struct ChainContext<'c> {
    chain: &'c ProxyChain,
    current: usize,
    state: HandshakeState,
    target: Endpoint,
    info: ProtoInfo,
}

impl<'c> ChainContext<'c> {
    /// Begin negotiation at the chain's first hop, toward `target`.
    pub fn new(chain: &'c ProxyChain, target: Endpoint) -> Self {
        Self {
            chain,
            current: 0,
            state: HandshakeState::Initial,
            target,
            info: chain.first().ops().info_new(),
        }
    }

    /// Index of the hop currently being negotiated.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_node(&self) -> &ProxyNode {
        // current is bounds-checked in advance(), so this cannot miss.
        self.chain.get(self.current).expect("current hop in bounds")
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The connection's final destination, fixed at creation.
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Where the current hop should tunnel toward: the next hop's
    /// address, or the final target when this hop is the last.
    pub fn next_target(&self) -> Endpoint {
        match self.chain.get(self.current + 1) {
            Some(next) => next.endpoint(),
            None => self.target.clone(),
        }
    }

    /// True once the current hop's tunnel is up.
    pub fn established(&self) -> bool {
        self.state == HandshakeState::TunnelEstablished
    }

    pub fn info(&self) -> &ProtoInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut ProtoInfo {
        &mut self.info
    }

    /// Advance the hop's handshake. States only move forward; a
    /// regression can only come from a handler bug, never from network
    /// input, so it is treated as fatal.
    pub(crate) fn set_state(&mut self, next: HandshakeState) {
        assert!(
            next.rank() >= self.state.rank(),
            "handshake state may only move forward (hop {}): {:?} -> {:?}",
            self.current,
            self.state,
            next
        );
        tracing::trace!(
            target: "proxy_chain::context",
            hop = self.current,
            from = ?self.state,
            to = ?next,
            "state transition"
        );
        self.state = next;
    }

    /// Move to the next hop, resetting handshake state and protocol
    /// scratch info. Returns `false` when the current hop was the last,
    /// i.e. the whole chain is traversed.
    pub(crate) fn advance(&mut self) -> bool {
        debug_assert!(self.established(), "advance before tunnel established");
        if self.current + 1 >= self.chain.len() {
            return false;
        }
        self.current += 1;
        self.state = HandshakeState::Initial;
        self.info = self.current_node().ops().info_new();
        true
    }
}
