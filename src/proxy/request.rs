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

use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use http::{Method, Uri};

use crate::config::profiles::BrowserProfile;
use crate::config::settings::SessionConfig;
use crate::gateway::job::JobOptions;
use crate::tls::ja3::HandshakeSpec;
use crate::utils::{TransportError, TransportResult};

use super::headers::OrderedHeaders;

/// Transport-ready request descriptor normalized from a job.
///
/// Owned by exactly one dispatcher task; the handshake spec and profile
/// inside are immutable once derived.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub method: Method,
    pub uri: Uri,
    pub headers: OrderedHeaders,
    pub body: Bytes,
    pub spec: HandshakeSpec,
    pub profile: BrowserProfile,
    pub user_agent: String,
    pub timeout: Duration,
    pub proxy: Option<ProxyRoute>,
    pub follow_redirects: bool,
}

/// Upstream proxy route parsed from the job's proxy URL.
#[derive(Debug, Clone)]
pub enum ProxyRoute {
    Http {
        host: String,
        port: u16,
        /// base64("user:pass") for Proxy-Authorization.
        basic_auth: Option<String>,
    },
    Socks5 {
        host: String,
        port: u16,
        auth: Option<(String, String)>,
    },
}

impl RequestPlan {
    /// Builds the plan: URL/scheme validation, method normalization, JA3
    /// parse, UA profile resolution, header-order computation, ordered
    /// block assembly with forced `Host`/`user-agent`, cookies, defaults.
    pub fn from_job(options: &JobOptions, defaults: &SessionConfig) -> TransportResult<Self> {
        let uri: Uri = options
            .url
            .parse()
            .map_err(|err| TransportError::UrlInvalid(format!("{}: {err}", options.url)))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            other => {
                return Err(TransportError::UrlInvalid(format!(
                    "unsupported scheme {:?} in {}",
                    other.unwrap_or(""),
                    options.url
                )))
            }
        }
        let host = uri
            .host()
            .ok_or_else(|| TransportError::UrlInvalid(format!("no host in {}", options.url)))?
            .to_string();

        let method_raw = if options.method.is_empty() {
            "GET".to_string()
        } else {
            options.method.to_uppercase()
        };
        let method = Method::from_bytes(method_raw.as_bytes())
            .map_err(|_| TransportError::UrlInvalid(format!("bad method {:?}", options.method)))?;

        let spec = HandshakeSpec::parse(&options.ja3)?;
        let profile = BrowserProfile::from_user_agent(&options.user_agent);

        let order: Vec<String> = if options.header_order.is_empty() {
            profile
                .header_order_default()
                .iter()
                .map(|name| name.to_string())
                .collect()
        } else {
            options
                .header_order
                .iter()
                .map(|name| name.to_lowercase())
                .collect()
        };

        let mut headers = OrderedHeaders::new(order, profile.pseudo_header_order());

        // Caller headers in insertion order; the order vector drives the
        // wire order later. Content-Length never comes from the job map.
        for (name, value) in &options.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            if let Some(value) = value.as_str() {
                headers.set(name, value);
            }
        }

        let host_value = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        headers.set("Host", &host_value);
        headers.set("user-agent", &options.user_agent);

        if let Some(cookie_value) = cookie_header_value(options) {
            headers.set("Cookie", &cookie_value);
        }

        if headers.get("accept-encoding").is_none() {
            headers.set("Accept-Encoding", "gzip, deflate, br");
        }

        let timeout_ms = if options.timeout == 0 {
            defaults.default_timeout_ms
        } else {
            options.timeout
        };

        Ok(Self {
            method,
            uri,
            headers,
            body: Bytes::from(options.body.clone().into_bytes()),
            spec,
            profile,
            user_agent: options.user_agent.clone(),
            timeout: Duration::from_millis(timeout_ms),
            proxy: ProxyRoute::parse(&options.proxy)?,
            follow_redirects: !options.disable_redirect,
        })
    }

    /// `host[:port]` of the target, for dialing and the Host header.
    pub fn authority(&self) -> (String, u16) {
        let host = self.uri.host().unwrap_or_default().to_string();
        let port = self.uri.port_u16().unwrap_or_else(|| {
            if self.uri.scheme_str() == Some("https") {
                443
            } else {
                80
            }
        });
        (host, port)
    }

    pub fn is_https(&self) -> bool {
        self.uri.scheme_str() == Some("https")
    }

    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

/// Serializes the job's cookie list per RFC 6265 (creation order), merged
/// after any caller-supplied Cookie header value.
fn cookie_header_value(options: &JobOptions) -> Option<String> {
    let mut segments: Vec<String> = Vec::new();

    if let Some((_, existing)) = options
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("cookie"))
    {
        if let Some(value) = existing.as_str() {
            if !value.is_empty() {
                segments.push(value.to_string());
            }
        }
    }

    for jar_cookie in &options.cookies {
        let pair = cookie::Cookie::new(jar_cookie.name.clone(), jar_cookie.value.clone());
        segments.push(pair.to_string());
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("; "))
    }
}

impl ProxyRoute {
    /// Parses the job's proxy URL. Empty string means no proxy.
    pub fn parse(raw: &str) -> TransportResult<Option<Self>> {
        if raw.is_empty() {
            return Ok(None);
        }

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| TransportError::ProxyFail(format!("proxy url missing scheme: {raw}")))?;

        let (userinfo, hostport) = match rest.split_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, rest),
        };
        let hostport = hostport.trim_end_matches('/');

        let (host, port) = match hostport.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    TransportError::ProxyFail(format!("bad proxy port in {raw}"))
                })?;
                (host.to_string(), port)
            }
            None => (
                hostport.to_string(),
                match scheme {
                    "socks5" | "socks5h" => 1080,
                    _ => 8080,
                },
            ),
        };
        if host.is_empty() {
            return Err(TransportError::ProxyFail(format!("proxy url missing host: {raw}")));
        }

        match scheme {
            "http" | "https" => {
                let basic_auth = userinfo.map(|info| {
                    base64::engine::general_purpose::STANDARD.encode(info.as_bytes())
                });
                Ok(Some(ProxyRoute::Http {
                    host,
                    port,
                    basic_auth,
                }))
            }
            "socks5" | "socks5h" => {
                let auth = userinfo.and_then(|info| {
                    info.split_once(':')
                        .map(|(user, pass)| (user.to_string(), pass.to_string()))
                });
                Ok(Some(ProxyRoute::Socks5 { host, port, auth }))
            }
            other => Err(TransportError::ProxyFail(format!(
                "unsupported proxy scheme {other:?}"
            ))),
        }
    }
}
