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

//! Fingerprinted transport orchestration.
//!
//! One call = one job: validate the hello the JA3 describes, dial (direct
//! or through the job's proxy), route by negotiated ALPN, follow redirects
//! with the fingerprint held constant, and hand back the raw response.

use bytes::Bytes;
use http::{Method, Uri};

use crate::tls::{clienthello, plan::TlsClientPlan};
use crate::utils::{TransportError, TransportResult};

use super::client::{negotiated_alpn, UpstreamClient};
use super::headers::OrderedHeaders;
use super::http1::{self, UpstreamResponse};
use super::http2;
use super::request::{ProxyRoute, RequestPlan};

/// Executes a request plan to completion (response headers + full body).
/// The caller owns the job-level deadline.
pub async fn execute(plan: &RequestPlan, max_redirects: usize) -> TransportResult<UpstreamResponse> {
    let tls_plan = TlsClientPlan::from_spec(&plan.spec);

    let mut method = plan.method.clone();
    let mut uri = plan.uri.clone();
    let mut headers = plan.headers.clone();
    let mut body = plan.body.clone();
    let mut hops = 0usize;

    loop {
        let response = perform_hop(plan, &tls_plan, &method, &uri, &headers, body.clone()).await?;

        if !plan.follow_redirects || !is_redirect(response.status) {
            return Ok(response);
        }
        let Some(location) = response.header("location").map(str::to_string) else {
            return Ok(response);
        };

        hops += 1;
        if hops > max_redirects {
            return Err(TransportError::HttpProtocolFail(format!(
                "stopped after {max_redirects} redirects"
            )));
        }

        let next = resolve_location(&uri, &location)?;
        tracing::debug!(status = response.status, from = %uri, to = %next, "following redirect");

        // Browsers downgrade 301/302/303 to a bodyless GET; 307/308 replay.
        if matches!(response.status, 301 | 302 | 303) && method != Method::HEAD {
            method = Method::GET;
            body = Bytes::new();
        }

        carry_set_cookies(&mut headers, &response);

        let host_value = match (next.host(), next.port_u16()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => {
                return Err(TransportError::UrlInvalid(format!(
                    "redirect target has no host: {location}"
                )))
            }
        };
        headers.set("Host", &host_value);
        uri = next;
    }
}

async fn perform_hop(
    plan: &RequestPlan,
    tls_plan: &TlsClientPlan,
    method: &Method,
    uri: &Uri,
    headers: &OrderedHeaders,
    body: Bytes,
) -> TransportResult<UpstreamResponse> {
    let host = uri
        .host()
        .ok_or_else(|| TransportError::UrlInvalid(format!("no host in {uri}")))?
        .to_string();
    let https = uri.scheme_str() == Some("https");
    let port = uri
        .port_u16()
        .unwrap_or(if https { 443 } else { 80 });
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    // The hello image is the JA3 contract: refuse specs that cannot
    // produce one, and log the hash every connection carries.
    let hello = clienthello::build(&plan.spec, &host, &[])?;
    tracing::debug!(
        %host,
        port,
        ja3 = tls_plan.ja3_hash(),
        hello_len = hello.len(),
        "assembled fingerprinted client hello"
    );

    if https {
        let stream = UpstreamClient::connect_tls(&host, port, tls_plan, plan.proxy.as_ref()).await?;
        let alpn = negotiated_alpn(&stream);

        if alpn.as_deref() == Some("h2") {
            let settings = plan.profile.h2_settings();
            return http2::send_request(stream, &settings, method, uri, headers, body).await;
        }

        let mut stream = stream;
        http1::send_request(&mut stream, method, path, headers, &body, None).await?;
        return http1::read_response(&mut stream, method).await;
    }

    // Plain http: no TLS. Through an HTTP proxy the request goes
    // absolute-form straight at the proxy; SOCKS5 still tunnels.
    match plan.proxy.as_ref() {
        Some(ProxyRoute::Http {
            host: proxy_host,
            port: proxy_port,
            basic_auth,
        }) => {
            let mut stream = UpstreamClient::connect_tcp(proxy_host, *proxy_port, None)
                .await
                .map_err(|err| TransportError::ProxyFail(err.to_string()))?;
            let absolute = uri.to_string();
            http1::send_request(
                &mut stream,
                method,
                &absolute,
                headers,
                &body,
                basic_auth.as_deref(),
            )
            .await?;
            http1::read_response(&mut stream, method).await
        }
        other => {
            let mut stream = UpstreamClient::connect_tcp(&host, port, other).await?;
            http1::send_request(&mut stream, method, path, headers, &body, None).await?;
            http1::read_response(&mut stream, method).await
        }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Folds `Set-Cookie` values from a redirect response into the request's
/// `Cookie` header, overriding same-name pairs and appending new ones.
fn carry_set_cookies(headers: &mut OrderedHeaders, response: &UpstreamResponse) {
    let set_cookies = response.header_values("set-cookie");
    if set_cookies.is_empty() {
        return;
    }

    let mut pairs: Vec<(String, String)> = headers
        .get("cookie")
        .map(|value| {
            value
                .split(';')
                .filter_map(|segment| {
                    let (name, value) = segment.trim().split_once('=')?;
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    for raw in set_cookies {
        let Ok(parsed) = cookie::Cookie::parse(raw.to_string()) else {
            continue;
        };
        let name = parsed.name().to_string();
        let value = parsed.value().to_string();
        if let Some(existing) = pairs.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            pairs.push((name, value));
        }
    }

    if !pairs.is_empty() {
        let joined = pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.set("Cookie", &joined);
    }
}

/// Resolves a `Location` value against the current URI: absolute,
/// protocol-relative, host-relative, and path-relative forms.
fn resolve_location(base: &Uri, location: &str) -> TransportResult<Uri> {
    let invalid =
        |what: String| TransportError::UrlInvalid(format!("redirect location {location:?}: {what}"));

    let candidate: String = if location.contains("://") {
        location.to_string()
    } else if let Some(rest) = location.strip_prefix("//") {
        format!("{}://{}", base.scheme_str().unwrap_or("https"), rest)
    } else {
        let scheme = base.scheme_str().unwrap_or("https");
        let authority = base
            .authority()
            .map(|a| a.as_str())
            .ok_or_else(|| invalid("base has no authority".into()))?;
        if location.starts_with('/') {
            format!("{scheme}://{authority}{location}")
        } else {
            let base_path = base.path();
            let parent = match base_path.rfind('/') {
                Some(idx) => &base_path[..=idx],
                None => "/",
            };
            format!("{scheme}://{authority}{parent}{location}")
        }
    };

    let uri: Uri = candidate
        .parse()
        .map_err(|err| invalid(format!("{err}")))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => Ok(uri),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profiles::PseudoHeader::*;

    #[test]
    fn resolves_every_location_form() {
        let base: Uri = "https://example.com/a/b?q=1".parse().unwrap();

        let absolute = resolve_location(&base, "https://other.test/x").unwrap();
        assert_eq!(absolute.host(), Some("other.test"));

        let protocol_relative = resolve_location(&base, "//cdn.test/y").unwrap();
        assert_eq!(protocol_relative.scheme_str(), Some("https"));
        assert_eq!(protocol_relative.host(), Some("cdn.test"));

        let host_relative = resolve_location(&base, "/login?next=1").unwrap();
        assert_eq!(host_relative.host(), Some("example.com"));
        assert_eq!(host_relative.path_and_query().unwrap().as_str(), "/login?next=1");

        let path_relative = resolve_location(&base, "c").unwrap();
        assert_eq!(path_relative.path(), "/a/c");
    }

    #[test]
    fn rejects_non_http_redirect_targets() {
        let base: Uri = "https://example.com/".parse().unwrap();
        assert!(resolve_location(&base, "ftp://files.test/x").is_err());
    }

    #[test]
    fn set_cookie_values_fold_into_the_cookie_header() {
        let mut headers = OrderedHeaders::new(vec![], [Method, Authority, Scheme, Path]);
        headers.set("Cookie", "keep=old; sid=stale");

        let mut response = UpstreamResponse::default();
        response.push_header("Set-Cookie", "sid=fresh; Path=/; HttpOnly");
        response.push_header("Set-Cookie", "extra=1");

        carry_set_cookies(&mut headers, &response);
        assert_eq!(headers.get("cookie"), Some("keep=old; sid=fresh; extra=1"));
    }

    #[test]
    fn redirect_statuses_match_the_policy() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status), "{status}");
        }
        for status in [200, 204, 304, 400, 500] {
            assert!(!is_redirect(status), "{status}");
        }
    }
}
