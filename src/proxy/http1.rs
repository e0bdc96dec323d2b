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

//! HTTP/1.1 on the wire, by hand.
//!
//! Emission is order-vector-driven: request line, every ordered header
//! with its original case, extras in insertion order, a computed
//! `Content-Length`, blank line, body. Hyper would canonicalize all of
//! that away, which is the one thing this gateway must never do.

use http::Method;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::utils::{TransportError, TransportResult};

use super::headers::OrderedHeaders;

/// Parsed upstream response: status plus the header multimap in server
/// order (duplicates grouped under the first occurrence) and the raw body.
#[derive(Debug, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(|v| v.as_str())
    }

    /// Every value of a header, case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter().map(|v| v.as_str()))
            .collect()
    }

    pub fn push_header(&mut self, name: &str, value: &str) {
        if let Some((_, values)) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            values.push(value.to_string());
        } else {
            self.headers
                .push((name.to_string(), vec![value.to_string()]));
        }
    }
}

/// Serializes one request onto the stream. `target` is the request-line
/// target: origin-form normally, absolute-form when talking through an
/// HTTP proxy without a tunnel.
pub async fn send_request<S>(
    stream: &mut S,
    method: &Method,
    target: &str,
    headers: &OrderedHeaders,
    body: &[u8],
    proxy_auth: Option<&str>,
) -> TransportResult<()>
where
    S: AsyncWrite + Unpin,
{
    let io_err = |err: std::io::Error| TransportError::ConnectFail(format!("request write failed: {err}"));

    let mut wire = Vec::with_capacity(512 + body.len());
    wire.extend_from_slice(format!("{method} {target} HTTP/1.1\r\n").as_bytes());

    for (name, value) in headers.iter_ordered() {
        wire.extend_from_slice(name.as_bytes());
        wire.extend_from_slice(b": ");
        wire.extend_from_slice(value.as_bytes());
        wire.extend_from_slice(b"\r\n");
    }

    if let Some(credentials) = proxy_auth {
        wire.extend_from_slice(format!("Proxy-Authorization: Basic {credentials}\r\n").as_bytes());
    }

    // The transport owns Content-Length; the job map never supplies it.
    if !body.is_empty() || matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        wire.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }

    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(body);

    stream.write_all(&wire).await.map_err(io_err)?;
    stream.flush().await.map_err(io_err)?;
    Ok(())
}

/// Reads the whole response off the stream: status line, header multimap,
/// and the body per its framing (Content-Length, chunked, none, or EOF).
pub async fn read_response<S>(stream: &mut S, method: &Method) -> TransportResult<UpstreamResponse>
where
    S: AsyncRead + Unpin,
{
    let protocol_err =
        |what: String| TransportError::HttpProtocolFail(format!("http/1.1 response: {what}"));

    let mut reader = BufReader::new(stream);

    let mut status_line = String::new();
    let read = reader
        .read_line(&mut status_line)
        .await
        .map_err(|err| protocol_err(format!("status line read failed: {err}")))?;
    if read == 0 {
        return Err(protocol_err("connection closed before status line".into()));
    }

    let status_line = trim_crlf(&status_line);
    let mut parts = status_line.splitn(3, ' ');
    let version = parts
        .next()
        .ok_or_else(|| protocol_err("missing HTTP version".into()))?;
    if !version.starts_with("HTTP/") {
        return Err(protocol_err(format!("bad version token {version:?}")));
    }
    let status: u16 = parts
        .next()
        .ok_or_else(|| protocol_err("missing status code".into()))?
        .parse()
        .map_err(|_| protocol_err("unparseable status code".into()))?;

    let mut response = UpstreamResponse {
        status,
        ..Default::default()
    };

    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|err| protocol_err(format!("header read failed: {err}")))?;
        if read == 0 {
            return Err(protocol_err("EOF inside response headers".into()));
        }
        let trimmed = trim_crlf(&line);
        if trimmed.is_empty() {
            break;
        }
        if let Some(colon) = trimmed.find(':') {
            let (name, value) = trimmed.split_at(colon);
            response.push_header(name.trim(), value[1..].trim());
        }
    }

    match response_body_framing(&response, method) {
        BodyFraming::None => {}
        BodyFraming::ContentLength(len) => {
            read_fixed_body(&mut reader, len, &mut response.body).await?;
        }
        BodyFraming::Chunked => {
            read_chunked_body(&mut reader, &mut response.body).await?;
        }
        BodyFraming::Eof => {
            reader
                .read_to_end(&mut response.body)
                .await
                .map_err(|err| protocol_err(format!("body read failed: {err}")))?;
        }
    }

    Ok(response)
}

enum BodyFraming {
    None,
    ContentLength(usize),
    Chunked,
    Eof,
}

fn response_body_framing(response: &UpstreamResponse, method: &Method) -> BodyFraming {
    if *method == Method::HEAD {
        return BodyFraming::None;
    }
    if (100..200).contains(&response.status) || matches!(response.status, 204 | 205 | 304) {
        return BodyFraming::None;
    }

    let chunked = response
        .header_values("transfer-encoding")
        .iter()
        .any(|raw| {
            raw.to_ascii_lowercase()
                .split(',')
                .any(|enc| enc.trim() == "chunked")
        });
    if chunked {
        return BodyFraming::Chunked;
    }

    if let Some(len) = response
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
    {
        return BodyFraming::ContentLength(len);
    }

    // No framing headers: the server delimits the body by closing.
    BodyFraming::Eof
}

async fn read_fixed_body<R>(
    reader: &mut BufReader<R>,
    len: usize,
    body: &mut Vec<u8>,
) -> TransportResult<()>
where
    R: AsyncRead + Unpin,
{
    if len == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(|_| {
        TransportError::HttpProtocolFail(format!("expected {len} body bytes, hit EOF"))
    })?;
    body.extend_from_slice(&buf);
    Ok(())
}

/// Decodes a chunked body while validating every boundary, consuming the
/// optional trailer section before returning.
async fn read_chunked_body<R>(reader: &mut BufReader<R>, body: &mut Vec<u8>) -> TransportResult<()>
where
    R: AsyncRead + Unpin,
{
    let protocol_err =
        |what: String| TransportError::HttpProtocolFail(format!("chunked body: {what}"));

    loop {
        let mut size_line = String::new();
        let read = reader
            .read_line(&mut size_line)
            .await
            .map_err(|err| protocol_err(format!("size read failed: {err}")))?;
        if read == 0 {
            return Err(protocol_err("EOF at chunk size".into()));
        }

        let size_str = trim_crlf(&size_line);
        let size_token = size_str.split(';').next().unwrap_or(size_str);
        let size = usize::from_str_radix(size_token, 16)
            .map_err(|_| protocol_err(format!("bad chunk size {size_token:?}")))?;

        if size == 0 {
            consume_trailer_section(reader).await?;
            break;
        }

        let mut chunk = vec![0u8; size];
        reader
            .read_exact(&mut chunk)
            .await
            .map_err(|_| protocol_err(format!("expected {size} chunk bytes, hit EOF")))?;
        body.extend_from_slice(&chunk);

        let mut crlf = [0u8; 2];
        reader
            .read_exact(&mut crlf)
            .await
            .map_err(|err| protocol_err(format!("terminator read failed: {err}")))?;
        if crlf != [b'\r', b'\n'] {
            return Err(protocol_err("chunk missing CRLF terminator".into()));
        }
    }
    Ok(())
}

async fn consume_trailer_section<R>(reader: &mut BufReader<R>) -> TransportResult<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await.map_err(|err| {
            TransportError::HttpProtocolFail(format!("trailer read failed: {err}"))
        })?;
        if read == 0 || line.trim().is_empty() {
            break;
        }
    }
    Ok(())
}

fn trim_crlf(input: &str) -> &str {
    input.trim_end_matches(|c| c == '\r' || c == '\n')
}
