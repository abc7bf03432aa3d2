//! Minimal local proxy servers for integration tests. Each listener
//! binds 127.0.0.1:0 and serves until the test process ends.

#![allow(dead_code)]

use std::net::SocketAddr;

use anyhow::Result;
use tokio::io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Echo server standing in for the final target.
pub async fn start_echo() -> Result<SocketAddr> {
    let lis = TcpListener::bind("127.0.0.1:0").await?;
    let addr = lis.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut s, _)) = lis.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                loop {
                    match s.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if s.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    Ok(addr)
}

/// HTTP CONNECT proxy that actually dials the requested target and
/// relays bytes, so multi-hop chains work end to end.
pub async fn start_connect_proxy() -> Result<SocketAddr> {
    let lis = TcpListener::bind("127.0.0.1:0").await?;
    let addr = lis.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut s, _)) = lis.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let Some(target) = read_connect_target(&mut s).await else {
                    let _ = s
                        .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                        .await;
                    return;
                };
                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    let _ = s
                        .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                        .await;
                    return;
                };
                if s.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                let _ = copy_bidirectional(&mut s, &mut upstream).await;
            });
        }
    });
    Ok(addr)
}

/// CONNECT proxy that refuses every request with 403.
pub async fn start_refusing_proxy() -> Result<SocketAddr> {
    let lis = TcpListener::bind("127.0.0.1:0").await?;
    let addr = lis.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut s, _)) = lis.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let _ = read_connect_target(&mut s).await;
                let _ = s.write_all(b"HTTP/1.1 403 Forbidden\r\n\r\n").await;
            });
        }
    });
    Ok(addr)
}

/// Accepts connections and never answers anything.
pub async fn start_silent_proxy() -> Result<SocketAddr> {
    let lis = TcpListener::bind("127.0.0.1:0").await?;
    let addr = lis.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((s, _)) = lis.accept().await else {
                continue;
            };
            // Hold the socket open, read nothing, say nothing.
            tokio::spawn(async move {
                let _keep = s;
                std::future::pending::<()>().await;
            });
        }
    });
    Ok(addr)
}

async fn read_connect_target(s: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match s.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
        if head.len() > 8192 {
            return None;
        }
    }
    let text = String::from_utf8_lossy(&head);
    let mut parts = text.split_whitespace();
    if parts.next() != Some("CONNECT") {
        return None;
    }
    parts.next().map(str::to_string)
}

/// SOCKS4/4a proxy that dials the requested target and relays.
pub async fn start_socks4_proxy() -> Result<SocketAddr> {
    let lis = TcpListener::bind("127.0.0.1:0").await?;
    let addr = lis.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut s, _)) = lis.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let mut head = [0u8; 8];
                if s.read_exact(&mut head).await.is_err() {
                    return;
                }
                if head[0] != 0x04 || head[1] != 0x01 {
                    return;
                }
                let port = u16::from_be_bytes([head[2], head[3]]);
                let ip = [head[4], head[5], head[6], head[7]];
                // user-id, NUL-terminated.
                if read_until_nul(&mut s).await.is_none() {
                    return;
                }
                let target = if ip[..3] == [0, 0, 0] && ip[3] != 0 {
                    // SOCKS4a: hostname follows.
                    let Some(name) = read_until_nul(&mut s).await else {
                        return;
                    };
                    format!("{name}:{port}")
                } else {
                    format!("{}.{}.{}.{}:{port}", ip[0], ip[1], ip[2], ip[3])
                };
                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    let _ = s.write_all(&[0, 0x5b, 0, 0, 0, 0, 0, 0]).await;
                    return;
                };
                if s.write_all(&[0, 0x5a, 0, 0, 0, 0, 0, 0]).await.is_err() {
                    return;
                }
                let _ = copy_bidirectional(&mut s, &mut upstream).await;
            });
        }
    });
    Ok(addr)
}

/// SOCKS5 proxy. When `creds` is set, only username/password auth is
/// offered back and the pair must match; otherwise no-auth is selected.
pub async fn start_socks5_proxy(creds: Option<(&str, &str)>) -> Result<SocketAddr> {
    let creds = creds.map(|(u, p)| (u.to_string(), p.to_string()));
    let lis = TcpListener::bind("127.0.0.1:0").await?;
    let addr = lis.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut s, _)) = lis.accept().await else {
                continue;
            };
            let creds = creds.clone();
            tokio::spawn(async move {
                if socks5_session(&mut s, creds).await.is_none() {
                    let _ = s.shutdown().await;
                }
            });
        }
    });
    Ok(addr)
}

async fn socks5_session(s: &mut TcpStream, creds: Option<(String, String)>) -> Option<()> {
    // Greeting.
    let mut head = [0u8; 2];
    s.read_exact(&mut head).await.ok()?;
    if head[0] != 0x05 {
        return None;
    }
    let mut methods = vec![0u8; head[1] as usize];
    s.read_exact(&mut methods).await.ok()?;
    match &creds {
        Some((user, pass)) => {
            if !methods.contains(&0x02) {
                let _ = s.write_all(&[0x05, 0xff]).await;
                return None;
            }
            s.write_all(&[0x05, 0x02]).await.ok()?;
            // RFC 1929 subnegotiation.
            let mut ver = [0u8; 2];
            s.read_exact(&mut ver).await.ok()?;
            let mut u = vec![0u8; ver[1] as usize];
            s.read_exact(&mut u).await.ok()?;
            let mut plen = [0u8; 1];
            s.read_exact(&mut plen).await.ok()?;
            let mut p = vec![0u8; plen[0] as usize];
            s.read_exact(&mut p).await.ok()?;
            if u != user.as_bytes() || p != pass.as_bytes() {
                let _ = s.write_all(&[0x01, 0x01]).await;
                return None;
            }
            s.write_all(&[0x01, 0x00]).await.ok()?;
        }
        None => {
            s.write_all(&[0x05, 0x00]).await.ok()?;
        }
    }

    // Connect request.
    let mut req = [0u8; 4];
    s.read_exact(&mut req).await.ok()?;
    if req[0] != 0x05 || req[1] != 0x01 {
        return None;
    }
    let host = match req[3] {
        0x01 => {
            let mut b = [0u8; 4];
            s.read_exact(&mut b).await.ok()?;
            format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3])
        }
        0x03 => {
            let mut l = [0u8; 1];
            s.read_exact(&mut l).await.ok()?;
            let mut d = vec![0u8; l[0] as usize];
            s.read_exact(&mut d).await.ok()?;
            String::from_utf8(d).ok()?
        }
        0x04 => {
            let mut b = [0u8; 16];
            s.read_exact(&mut b).await.ok()?;
            format!("[{}]", std::net::Ipv6Addr::from(b))
        }
        _ => return None,
    };
    let mut port = [0u8; 2];
    s.read_exact(&mut port).await.ok()?;
    let target = format!("{host}:{}", u16::from_be_bytes(port));

    let Ok(mut upstream) = TcpStream::connect(&target).await else {
        let _ = s
            .write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await;
        return None;
    };
    s.write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0])
        .await
        .ok()?;
    let _ = copy_bidirectional(s, &mut upstream).await;
    Some(())
}

async fn read_until_nul(s: &mut TcpStream) -> Option<String> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        s.read_exact(&mut byte).await.ok()?;
        if byte[0] == 0 {
            return String::from_utf8(out).ok();
        }
        out.push(byte[0]);
        if out.len() > 512 {
            return None;
        }
    }
}
