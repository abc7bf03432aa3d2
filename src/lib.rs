//! Chained proxy traversal for async socket I/O.
//!
//! A [`ProxyChain`] is an immutable, shareable sequence of proxy hops
//! (HTTP CONNECT, SOCKS4, SOCKS5) built once from spec strings of the
//! form `scheme://[user:pass@]host[:port]`. Connecting through it
//! negotiates each hop's handshake in order over a single TCP stream;
//! once the last hop's tunnel is up, the stream is handed back as a
//! plain transport with nothing added in the data path.
//!
//! ```no_run
//! use proxy_chain::{Endpoint, ProxyChain};
//!
//! # async fn demo() -> proxy_chain::Result<()> {
//! let chain = ProxyChain::from_spec("http://10.0.0.1:3128,socks5://10.0.0.2:1080")?;
//! let stream = chain.connect(Endpoint::new("example.com", 443)).await?;
//! // `stream` now reads and writes through both tunnels.
//! # Ok(())
//! # }
//! ```
//!
//! Per-hop handshake progress is observable through
//! [`ChainContext`]/[`HandshakeState`], and [`dispatch::drive`] can run
//! a chain over any established byte stream, not just a fresh TCP
//! connection.

pub mod chain;
pub mod context;
pub mod dispatch;
pub mod error;
pub(crate) mod net;
pub mod node;
pub mod proto;
pub mod telemetry;
pub mod types;
pub mod util;

pub use chain::ProxyChain;
pub use context::{ChainContext, HandshakeState};
pub use dispatch::DialOpts;
pub use error::{Error, Result};
pub use node::ProxyNode;
pub use proto::{ProtoInfo, ProxyKind, ProxyOps, Stream};
pub use types::{Endpoint, Host};
