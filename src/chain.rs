//! An ordered, immutable sequence of proxy hops.
//!
//! Built once from configuration and shared read-only across any number
//! of concurrent connections (typically behind an `Arc`). Chain
//! position for a live connection lives in [`ChainContext`], never
//! here.
//!
//! [`ChainContext`]: crate::context::ChainContext

use crate::error::{Error, Result};
use crate::node::ProxyNode;

#[derive(Debug)]
pub struct ProxyChain {
    nodes: Vec<ProxyNode>,
}

impl ProxyChain {
    /// Wrap an already-built hop sequence. Fails on an empty sequence;
    /// a chain with nothing to traverse is a configuration error.
    pub fn new(nodes: Vec<ProxyNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::config("proxy chain must contain at least one hop"));
        }
        Ok(Self { nodes })
    }

    /// Build a chain from a comma-separated list of proxy specs, first
    /// hop first: `"http://a:3128,socks5://b:1080"`.
    pub fn from_spec(spec: &str) -> Result<Self> {
        let nodes = spec
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(ProxyNode::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Self::new(nodes)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // Ruled out at construction; kept for the len/is_empty pairing.
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProxyNode> {
        self.nodes.get(index)
    }

    pub fn first(&self) -> &ProxyNode {
        &self.nodes[0]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProxyNode> {
        self.nodes.iter()
    }
}
