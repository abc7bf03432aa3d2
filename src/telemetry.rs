//! Metrics counters for dial and handshake outcomes.
//!
//! Compiled to no-ops unless the `metrics` cargo feature is enabled:
//! - `proxy_chain_connect_total{kind, result[, err]}`
//! - `proxy_chain_handshake_total{kind, result[, err]}`

use std::io;

/// Collapse an `io::Error` into a low-cardinality label.
#[inline]
pub fn err_kind(e: &io::Error) -> &'static str {
    use io::ErrorKind::*;
    match e.kind() {
        TimedOut => "timeout",
        ConnectionRefused => "refused",
        ConnectionReset | ConnectionAborted | BrokenPipe => "reset",
        AddrInUse | AddrNotAvailable | NotFound | InvalidInput => "addr",
        UnexpectedEof => "eof",
        InvalidData => "proto",
        _ => "other",
    }
}

#[cfg(feature = "metrics")]
#[inline]
fn cnt(name: &'static str, kind: &'static str, result: &'static str, err: Option<&'static str>) {
    match err {
        Some(e) => {
            metrics::counter!(name, "kind" => kind, "result" => result, "err" => e).increment(1);
        }
        None => {
            metrics::counter!(name, "kind" => kind, "result" => result).increment(1);
        }
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
const fn cnt(
    _name: &'static str,
    _kind: &'static str,
    _result: &'static str,
    _err: Option<&'static str>,
) {
}

/// Record the outcome of the raw TCP dial to the first hop.
#[inline]
pub fn chain_connect(kind: &'static str, result: &'static str, err: Option<&'static str>) {
    cnt("proxy_chain_connect_total", kind, result, err);
}

/// Record the outcome of one hop's handshake.
#[inline]
pub fn chain_handshake(kind: &'static str, result: &'static str, err: Option<&'static str>) {
    cnt("proxy_chain_handshake_total", kind, result, err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_kind_classification() {
        let e = io::Error::new(io::ErrorKind::TimedOut, "t");
        assert_eq!(err_kind(&e), "timeout");
        let e = io::Error::new(io::ErrorKind::ConnectionRefused, "r");
        assert_eq!(err_kind(&e), "refused");
        let e = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(err_kind(&e), "eof");
        let e = io::Error::other("misc");
        assert_eq!(err_kind(&e), "other");
    }
}
