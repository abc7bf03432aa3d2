//! TCP dialing with a per-attempt timeout and optional keepalive.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpSocket, TcpStream};

/// Connect to `addr` within `timeout`, with `TCP_NODELAY` set and, when
/// requested, keepalive probes enabled. The keepalive interval is
/// applied after the connect succeeds; failure to set it is not fatal.
pub(crate) async fn connect_with_keepalive(
    addr: SocketAddr,
    timeout: Duration,
    keepalive: Option<Duration>,
) -> io::Result<TcpStream> {
    let sock = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    let _ = sock.set_nodelay(true);
    let _ = sock.set_keepalive(keepalive.is_some());
    match tokio::time::timeout(timeout, sock.connect(addr)).await {
        Ok(Ok(s)) => {
            if let Some(d) = keepalive {
                let sref = SockRef::from(&s);
                let _ = sref.set_keepalive(true);
                #[allow(unused_mut)]
                let mut ka = TcpKeepalive::new().with_time(d).with_interval(d);
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    ka = ka.with_retries(5);
                }
                let _ = sref.set_tcp_keepalive(&ka);
            }
            Ok(s)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("tcp connect timeout to {addr}"),
        )),
    }
}
