/* MIRAGE Proxy (AGPL-3.0)

Copyright (C) 2025 - 404 Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

use std::{
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rustls::pki_types::ServerName;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpStream},
    task,
    time::timeout,
};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::tls::plan::TlsClientPlan;
use crate::utils::{TransportError, TransportResult};

use super::request::ProxyRoute;

/// Upstream connector: resolves, tunnels through a proxy when configured,
/// and runs the fingerprinted TLS handshake.
pub struct UpstreamClient;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PROXY_TUNNEL_TIMEOUT: Duration = Duration::from_secs(10);
const DNS_TTL: Duration = Duration::from_secs(45);

/// Positive DNS answers, keyed by hostname (answers are port-independent,
/// so jobs hitting the same host on different ports share one entry).
/// Failures are never cached; the next job re-resolves.
struct DnsCache {
    entries: DashMap<String, DnsEntry>,
    ttl: Duration,
}

struct DnsEntry {
    resolved_at: Instant,
    ips: Vec<IpAddr>,
}

static DNS_CACHE: Lazy<DnsCache> = Lazy::new(|| DnsCache::with_ttl(DNS_TTL));

impl DnsCache {
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn lookup(&self, host: &str) -> Option<Vec<IpAddr>> {
        if let Some(entry) = self.entries.get(host) {
            if entry.resolved_at.elapsed() < self.ttl {
                return Some(entry.ips.clone());
            }
        }
        self.entries.remove(host);
        None
    }

    fn store(&self, host: &str, ips: &[IpAddr]) {
        self.entries.insert(
            host.to_string(),
            DnsEntry {
                resolved_at: Instant::now(),
                ips: ips.to_vec(),
            },
        );
    }
}

impl UpstreamClient {
    /// Opens a TCP path to `host:port`, direct or tunneled through the
    /// job's proxy. The returned stream is ready for a TLS handshake (or
    /// plain HTTP/1.1 for http targets).
    pub async fn connect_tcp(
        host: &str,
        port: u16,
        proxy: Option<&ProxyRoute>,
    ) -> TransportResult<TcpStream> {
        match proxy {
            None => dial(host, port).await,
            Some(ProxyRoute::Http {
                host: proxy_host,
                port: proxy_port,
                basic_auth,
            }) => {
                let stream = dial(proxy_host, *proxy_port)
                    .await
                    .map_err(|err| TransportError::ProxyFail(err.to_string()))?;
                connect_tunnel(stream, host, port, basic_auth.as_deref()).await
            }
            Some(ProxyRoute::Socks5 {
                host: proxy_host,
                port: proxy_port,
                auth,
            }) => {
                let stream = dial(proxy_host, *proxy_port)
                    .await
                    .map_err(|err| TransportError::ProxyFail(err.to_string()))?;
                socks5_tunnel(stream, host, port, auth.as_ref()).await
            }
        }
    }

    /// Full fingerprinted TLS dial: TCP (direct or proxied) plus the
    /// handshake driven by the JA3-derived plan.
    pub async fn connect_tls(
        host: &str,
        port: u16,
        plan: &TlsClientPlan,
        proxy: Option<&ProxyRoute>,
    ) -> TransportResult<TlsStream<TcpStream>> {
        let stream = Self::connect_tcp(host, port, proxy).await?;

        let config = plan.client_config()?;
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::TlsFail(format!("invalid SNI hostname: {host}")))?;

        let tls_future = connector.connect(server_name, stream);
        let tls_stream = match timeout(TLS_HANDSHAKE_TIMEOUT, tls_future).await {
            Ok(result) => result.map_err(|err| {
                TransportError::TlsFail(format!("handshake with {host}:{port} failed: {err}"))
            })?,
            Err(_) => {
                return Err(TransportError::TlsFail(format!(
                    "handshake with {host}:{port} timed out after {TLS_HANDSHAKE_TIMEOUT:?}"
                )))
            }
        };

        tracing::debug!(
            %host,
            port,
            ja3 = plan.ja3_hash(),
            alpn = ?negotiated_alpn(&tls_stream),
            "upstream TLS handshake complete"
        );
        Ok(tls_stream)
    }
}

/// ALPN protocol the server agreed to, if any.
pub fn negotiated_alpn(stream: &TlsStream<TcpStream>) -> Option<String> {
    stream
        .get_ref()
        .1
        .alpn_protocol()
        .map(|proto| String::from_utf8_lossy(proto).into_owned())
}

async fn dial(host: &str, port: u16) -> TransportResult<TcpStream> {
    let ips = resolve_host(host).await?;

    let mut last_err: Option<String> = None;
    for ip in ips {
        let addr = SocketAddr::new(ip, port);
        tracing::debug!(%addr, "attempting upstream TCP connect");
        match timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).ok();
                return Ok(stream);
            }
            Ok(Err(err)) => {
                tracing::debug!(%addr, error = %err, "upstream TCP connect failed");
                last_err = Some(err.to_string());
            }
            Err(_) => {
                last_err = Some(format!("connect to {addr} timed out after {TCP_CONNECT_TIMEOUT:?}"));
            }
        }
    }

    Err(TransportError::ConnectFail(format!(
        "no resolved address of {host}:{port} accepted the connection: {}",
        last_err.unwrap_or_else(|| "resolver returned no addresses".into())
    )))
}

/// Resolves a target hostname to candidate addresses.
///
/// IP literals skip resolution. Otherwise: cache, one shot at the runtime
/// resolver, then one shot at the blocking system resolver. No retry loop
/// lives here; the per-job deadline is the retry budget, and the caller
/// sees a DNS_FAIL error frame it can resubmit.
async fn resolve_host(host: &str) -> TransportResult<Vec<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    if let Some(ips) = DNS_CACHE.lookup(host) {
        tracing::trace!(target: "dns", %host, "dns cache hit");
        return Ok(ips);
    }

    let mut resolver_err: Option<String> = None;
    let mut ips = match lookup_host((host, 0u16)).await {
        Ok(addrs) => dedup_ips(addrs.map(|addr| addr.ip())),
        Err(err) => {
            tracing::debug!(target: "dns", %host, error = %err, "runtime resolver failed");
            resolver_err = Some(err.to_string());
            Vec::new()
        }
    };

    if ips.is_empty() {
        let host_owned = host.to_string();
        ips = task::spawn_blocking(move || {
            (host_owned.as_str(), 0u16)
                .to_socket_addrs()
                .map(|addrs| dedup_ips(addrs.map(|addr| addr.ip())))
                .unwrap_or_default()
        })
        .await
        .map_err(|err| TransportError::DnsFail(format!("resolver task failed: {err}")))?;
    }

    if ips.is_empty() {
        return Err(TransportError::DnsFail(format!(
            "{host}: {}",
            resolver_err.unwrap_or_else(|| "no addresses returned".into())
        )));
    }

    DNS_CACHE.store(host, &ips);
    Ok(ips)
}

fn dedup_ips(iter: impl Iterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut out: Vec<IpAddr> = Vec::new();
    for ip in iter {
        if !out.contains(&ip) {
            out.push(ip);
        }
    }
    out
}

/// HTTP CONNECT tunnel: request, optional Basic credentials, then expect a
/// 2xx before handing the raw stream back for the real handshake.
async fn connect_tunnel(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    basic_auth: Option<&str>,
) -> TransportResult<TcpStream> {
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(credentials) = basic_auth {
        request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");

    let tunnel = async {
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|err| TransportError::ProxyFail(format!("CONNECT write failed: {err}")))?;

        // Read until the blank line terminating the proxy's response head.
        let mut head = Vec::with_capacity(256);
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            let n = stream
                .read(&mut byte)
                .await
                .map_err(|err| TransportError::ProxyFail(format!("CONNECT read failed: {err}")))?;
            if n == 0 {
                return Err(TransportError::ProxyFail(
                    "proxy closed during CONNECT".into(),
                ));
            }
            head.push(byte[0]);
            if head.len() > 16 * 1024 {
                return Err(TransportError::ProxyFail(
                    "oversized CONNECT response head".into(),
                ));
            }
        }

        let status_line = String::from_utf8_lossy(&head);
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .unwrap_or(0);
        if !(200..300).contains(&status) {
            return Err(TransportError::ProxyFail(format!(
                "proxy refused CONNECT with status {status}"
            )));
        }
        Ok(stream)
    };

    match timeout(PROXY_TUNNEL_TIMEOUT, tunnel).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ProxyFail(format!(
            "CONNECT tunnel to {host}:{port} timed out"
        ))),
    }
}

/// SOCKS5 tunnel: greeting, optional username/password auth (RFC 1929),
/// CONNECT with domain addressing so the proxy resolves the target.
async fn socks5_tunnel(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    auth: Option<&(String, String)>,
) -> TransportResult<TcpStream> {
    let fail = |what: String| TransportError::ProxyFail(what);

    let tunnel = async {
        let greeting: &[u8] = if auth.is_some() {
            &[0x05, 0x02, 0x00, 0x02] // no-auth + username/password
        } else {
            &[0x05, 0x01, 0x00]
        };
        stream
            .write_all(greeting)
            .await
            .map_err(|err| fail(format!("socks5 greeting failed: {err}")))?;

        let mut choice = [0u8; 2];
        stream
            .read_exact(&mut choice)
            .await
            .map_err(|err| fail(format!("socks5 greeting reply failed: {err}")))?;
        if choice[0] != 0x05 {
            return Err(fail(format!("not a socks5 proxy (version {})", choice[0])));
        }

        match choice[1] {
            0x00 => {}
            0x02 => {
                let (user, pass) =
                    auth.ok_or_else(|| fail("proxy demands credentials".into()))?;
                let mut frame = vec![0x01, user.len() as u8];
                frame.extend_from_slice(user.as_bytes());
                frame.push(pass.len() as u8);
                frame.extend_from_slice(pass.as_bytes());
                stream
                    .write_all(&frame)
                    .await
                    .map_err(|err| fail(format!("socks5 auth write failed: {err}")))?;

                let mut verdict = [0u8; 2];
                stream
                    .read_exact(&mut verdict)
                    .await
                    .map_err(|err| fail(format!("socks5 auth reply failed: {err}")))?;
                if verdict[1] != 0x00 {
                    return Err(fail("socks5 credentials rejected".into()));
                }
            }
            method => return Err(fail(format!("unsupported socks5 auth method {method}"))),
        }

        if host.len() > 255 {
            return Err(fail("target hostname exceeds socks5 limit".into()));
        }
        let mut connect = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
        connect.extend_from_slice(host.as_bytes());
        connect.extend_from_slice(&port.to_be_bytes());
        stream
            .write_all(&connect)
            .await
            .map_err(|err| fail(format!("socks5 connect write failed: {err}")))?;

        let mut reply = [0u8; 4];
        stream
            .read_exact(&mut reply)
            .await
            .map_err(|err| fail(format!("socks5 connect reply failed: {err}")))?;
        if reply[1] != 0x00 {
            return Err(fail(format!("socks5 connect refused (code {})", reply[1])));
        }

        // Drain the bound address: 4 (IPv4) / 16 (IPv6) / len-prefixed domain, then port.
        let addr_len = match reply[3] {
            0x01 => 4usize,
            0x04 => 16,
            0x03 => {
                let mut len = [0u8; 1];
                stream
                    .read_exact(&mut len)
                    .await
                    .map_err(|err| fail(format!("socks5 bound addr failed: {err}")))?;
                len[0] as usize
            }
            other => return Err(fail(format!("bad socks5 address type {other}"))),
        };
        let mut bound = vec![0u8; addr_len + 2];
        stream
            .read_exact(&mut bound)
            .await
            .map_err(|err| fail(format!("socks5 bound addr failed: {err}")))?;

        Ok(stream)
    };

    match timeout(PROXY_TUNNEL_TIMEOUT, tunnel).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ProxyFail(format!(
            "socks5 tunnel to {host}:{port} timed out"
        ))),
    }
}
