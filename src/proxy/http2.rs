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

//! HTTP/2 request path, framed by hand.
//!
//! Stock HTTP/2 stacks emit pseudo-headers in their own fixed order, which
//! destroys the browser fingerprint. This module assembles the connection
//! itself: preface, a SETTINGS frame carrying the profile's values, the
//! connection WINDOW_UPDATE browsers send right after it, and a HEADERS
//! frame whose HPACK block lists pseudo-headers in the profile's order
//! followed by regular headers in the order vector's order. Outbound
//! fields are plain literals with no Huffman coding (Chromium never
//! Huffman-encodes header names); the `hpack` codec handles block
//! encoding and decodes whatever table and Huffman choices the server
//! makes in its responses.

use bytes::Bytes;
use hpack::{Decoder, Encoder};
use http::{Method, Uri};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::profiles::{H2Settings, PseudoHeader};
use crate::utils::{TransportError, TransportResult};

use super::headers::OrderedHeaders;
use super::http1::UpstreamResponse;

const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
const FRAME_HEADER_LEN: usize = 9;
/// All requests ride the first client stream; connections are per-job.
const REQUEST_STREAM: u32 = 1;
/// RFC 9113 initial connection-level flow window.
const DEFAULT_CONNECTION_WINDOW: u32 = 65_535;

mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

mod flag {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Performs one request over a fresh HTTP/2 connection on the given
/// (already fingerprint-handshaken) stream.
pub async fn send_request<S>(
    mut stream: S,
    settings: &H2Settings,
    method: &Method,
    uri: &Uri,
    headers: &OrderedHeaders,
    body: Bytes,
) -> TransportResult<UpstreamResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_err = |err: std::io::Error| TransportError::HttpProtocolFail(format!("h2 write failed: {err}"));

    let block = encode_header_block(method, uri, headers);

    let mut opening = Vec::with_capacity(PREFACE.len() + 256 + block.len());
    opening.extend_from_slice(PREFACE);
    opening.extend_from_slice(&settings_frame(settings));
    if settings.initial_connection_window_size > DEFAULT_CONNECTION_WINDOW {
        opening.extend_from_slice(&window_update_frame(
            0,
            settings.initial_connection_window_size - DEFAULT_CONNECTION_WINDOW,
        ));
    }
    append_headers_frames(
        &mut opening,
        &block,
        settings.max_frame_size as usize,
        body.is_empty(),
    );
    append_data_frames(&mut opening, &body, settings.max_frame_size as usize);

    stream.write_all(&opening).await.map_err(io_err)?;
    stream.flush().await.map_err(io_err)?;

    read_response(&mut stream, settings).await
}

/// HPACK block in fingerprint order: the profile's pseudo-header order
/// first, then regular headers per the order vector, lowercased as RFC
/// 9113 requires. `Host` is dropped; `:authority` carries the target.
fn encode_header_block(method: &Method, uri: &Uri, headers: &OrderedHeaders) -> Vec<u8> {
    let authority = authority_value(uri);
    let scheme = uri.scheme_str().unwrap_or("https").to_string();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let mut fields: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(4 + headers.len());
    for pseudo in headers.pseudo_order() {
        let value = match pseudo {
            PseudoHeader::Method => method.as_str(),
            PseudoHeader::Authority => authority.as_str(),
            PseudoHeader::Scheme => scheme.as_str(),
            PseudoHeader::Path => path.as_str(),
        };
        fields.push((pseudo.as_str().as_bytes().to_vec(), value.as_bytes().to_vec()));
    }
    for (name, value) in headers.iter_ordered() {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        fields.push((
            name.to_ascii_lowercase().into_bytes(),
            value.as_bytes().to_vec(),
        ));
    }

    let mut encoder = Encoder::new();
    encoder.encode(fields.iter().map(|(name, value)| (&name[..], &value[..])))
}

/// Browsers omit the default port from `:authority`.
fn authority_value(uri: &Uri) -> String {
    let host = uri.host().unwrap_or_default();
    match uri.port_u16() {
        Some(443) if uri.scheme_str() == Some("https") => host.to_string(),
        Some(80) if uri.scheme_str() == Some("http") => host.to_string(),
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn frame_header(length: usize, kind: u8, flags: u8, stream_id: u32) -> [u8; FRAME_HEADER_LEN] {
    [
        (length >> 16) as u8,
        (length >> 8) as u8,
        length as u8,
        kind,
        flags,
        (stream_id >> 24) as u8 & 0x7f,
        (stream_id >> 16) as u8,
        (stream_id >> 8) as u8,
        stream_id as u8,
    ]
}

/// SETTINGS from the browser profile, identifiers in ascending order as
/// every mainstream browser emits them.
fn settings_frame(settings: &H2Settings) -> Vec<u8> {
    let entries: [(u16, u32); 5] = [
        (0x1, settings.header_table_size),
        (0x2, settings.enable_push as u32),
        (0x3, settings.max_concurrent_streams),
        (0x4, settings.initial_window_size),
        (0x5, settings.max_frame_size),
    ];

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + entries.len() * 6);
    frame.extend_from_slice(&frame_header(entries.len() * 6, frame_type::SETTINGS, 0, 0));
    for (id, value) in entries {
        frame.extend_from_slice(&id.to_be_bytes());
        frame.extend_from_slice(&value.to_be_bytes());
    }
    frame
}

fn settings_ack_frame() -> Vec<u8> {
    frame_header(0, frame_type::SETTINGS, flag::ACK, 0).to_vec()
}

fn ping_ack_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 8);
    frame.extend_from_slice(&frame_header(8, frame_type::PING, flag::ACK, 0));
    frame.extend_from_slice(&payload[..8.min(payload.len())]);
    frame.resize(FRAME_HEADER_LEN + 8, 0);
    frame
}

fn window_update_frame(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + 4);
    frame.extend_from_slice(&frame_header(4, frame_type::WINDOW_UPDATE, 0, stream_id));
    frame.extend_from_slice(&(increment & 0x7fff_ffff).to_be_bytes());
    frame
}

/// HEADERS plus CONTINUATIONs when the block exceeds one frame.
fn append_headers_frames(out: &mut Vec<u8>, block: &[u8], max_frame: usize, end_stream: bool) {
    let stream_flag = if end_stream { flag::END_STREAM } else { 0 };
    let mut chunks = block.chunks(max_frame.max(1)).peekable();
    let mut first = true;

    if block.is_empty() {
        out.extend_from_slice(&frame_header(
            0,
            frame_type::HEADERS,
            stream_flag | flag::END_HEADERS,
            REQUEST_STREAM,
        ));
        return;
    }

    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        let kind = if first { frame_type::HEADERS } else { frame_type::CONTINUATION };
        let mut flags = 0u8;
        if first {
            flags |= stream_flag;
        }
        if last {
            flags |= flag::END_HEADERS;
        }
        out.extend_from_slice(&frame_header(chunk.len(), kind, flags, REQUEST_STREAM));
        out.extend_from_slice(chunk);
        first = false;
    }
}

fn append_data_frames(out: &mut Vec<u8>, body: &[u8], max_frame: usize) {
    if body.is_empty() {
        return;
    }
    let mut chunks = body.chunks(max_frame.max(1)).peekable();
    while let Some(chunk) = chunks.next() {
        let flags = if chunks.peek().is_none() { flag::END_STREAM } else { 0 };
        out.extend_from_slice(&frame_header(chunk.len(), frame_type::DATA, flags, REQUEST_STREAM));
        out.extend_from_slice(chunk);
    }
}

struct FrameHead {
    length: usize,
    kind: u8,
    flags: u8,
    stream_id: u32,
}

async fn read_frame<S>(stream: &mut S, max_frame: usize) -> TransportResult<(FrameHead, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let protocol_err = |what: String| TransportError::HttpProtocolFail(format!("h2: {what}"));

    let mut head = [0u8; FRAME_HEADER_LEN];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|err| protocol_err(format!("connection closed mid-frame: {err}")))?;

    let frame = FrameHead {
        length: ((head[0] as usize) << 16) | ((head[1] as usize) << 8) | head[2] as usize,
        kind: head[3],
        flags: head[4],
        stream_id: u32::from_be_bytes([head[5] & 0x7f, head[6], head[7], head[8]]),
    };

    if frame.length > max_frame {
        return Err(protocol_err(format!(
            "peer sent a {}-byte frame past our {}-byte SETTINGS_MAX_FRAME_SIZE",
            frame.length, max_frame
        )));
    }

    let mut payload = vec![0u8; frame.length];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|err| protocol_err(format!("truncated frame payload: {err}")))?;
    Ok((frame, payload))
}

/// Strips PADDED/PRIORITY decoration from a HEADERS or DATA payload.
fn strip_padding(kind: u8, flags: u8, payload: &[u8]) -> TransportResult<&[u8]> {
    let protocol_err = |what: &str| TransportError::HttpProtocolFail(format!("h2: {what}"));

    let mut fragment = payload;
    let mut pad = 0usize;
    if flags & flag::PADDED != 0 {
        let (&pad_len, rest) = fragment
            .split_first()
            .ok_or_else(|| protocol_err("padded frame with no pad length"))?;
        pad = pad_len as usize;
        fragment = rest;
    }
    if kind == frame_type::HEADERS && flags & flag::PRIORITY != 0 {
        if fragment.len() < 5 {
            return Err(protocol_err("priority fields overrun frame"));
        }
        fragment = &fragment[5..];
    }
    if pad > fragment.len() {
        return Err(protocol_err("padding overruns frame"));
    }
    Ok(&fragment[..fragment.len() - pad])
}

/// Drains frames until our stream ends: answers SETTINGS and PING,
/// replenishes flow-control windows, accumulates header blocks across
/// CONTINUATIONs, and folds trailers into the header multimap.
async fn read_response<S>(stream: &mut S, settings: &H2Settings) -> TransportResult<UpstreamResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let protocol_err = |what: String| TransportError::HttpProtocolFail(format!("h2: {what}"));
    let max_frame = settings.max_frame_size as usize;

    let mut decoder = Decoder::new();
    let mut response = UpstreamResponse::default();
    let mut block: Vec<u8> = Vec::new();
    let mut in_block = false;
    let mut saw_headers = false;
    let mut end_stream = false;

    while !(end_stream && !in_block) {
        let (frame, payload) = read_frame(stream, max_frame).await?;

        if in_block && frame.kind != frame_type::CONTINUATION {
            return Err(protocol_err("expected CONTINUATION in header block".into()));
        }

        match frame.kind {
            frame_type::SETTINGS => {
                if frame.flags & flag::ACK == 0 {
                    stream
                        .write_all(&settings_ack_frame())
                        .await
                        .map_err(|err| protocol_err(format!("settings ack failed: {err}")))?;
                }
            }
            frame_type::PING => {
                if frame.flags & flag::ACK == 0 {
                    stream
                        .write_all(&ping_ack_frame(&payload))
                        .await
                        .map_err(|err| protocol_err(format!("ping ack failed: {err}")))?;
                }
            }
            frame_type::HEADERS if frame.stream_id == REQUEST_STREAM => {
                block.extend_from_slice(strip_padding(frame.kind, frame.flags, &payload)?);
                in_block = frame.flags & flag::END_HEADERS == 0;
                end_stream |= frame.flags & flag::END_STREAM != 0;
                if !in_block {
                    absorb_header_block(&mut decoder, &block, &mut response, !saw_headers)?;
                    saw_headers = true;
                    block.clear();
                }
            }
            frame_type::CONTINUATION if frame.stream_id == REQUEST_STREAM => {
                block.extend_from_slice(&payload);
                in_block = frame.flags & flag::END_HEADERS == 0;
                if !in_block {
                    absorb_header_block(&mut decoder, &block, &mut response, !saw_headers)?;
                    saw_headers = true;
                    block.clear();
                }
            }
            frame_type::DATA if frame.stream_id == REQUEST_STREAM => {
                let data = strip_padding(frame.kind, frame.flags, &payload)?;
                response.body.extend_from_slice(data);
                end_stream |= frame.flags & flag::END_STREAM != 0;

                // Hand the consumed bytes back on both windows so large
                // bodies keep streaming.
                if !payload.is_empty() && !end_stream {
                    let mut updates = window_update_frame(0, payload.len() as u32);
                    updates.extend_from_slice(&window_update_frame(
                        REQUEST_STREAM,
                        payload.len() as u32,
                    ));
                    stream
                        .write_all(&updates)
                        .await
                        .map_err(|err| protocol_err(format!("window update failed: {err}")))?;
                }
            }
            frame_type::RST_STREAM if frame.stream_id == REQUEST_STREAM => {
                let code = u32::from_be_bytes(payload.get(..4).unwrap_or(&[0; 4]).try_into().unwrap());
                return Err(protocol_err(format!("stream reset by peer (code {code})")));
            }
            frame_type::GOAWAY => {
                let code = payload
                    .get(4..8)
                    .map(|raw| u32::from_be_bytes(raw.try_into().unwrap()))
                    .unwrap_or(0);
                return Err(protocol_err(format!("goaway before response (code {code})")));
            }
            frame_type::PUSH_PROMISE => {
                // SETTINGS_ENABLE_PUSH is 0 on every profile.
                return Err(protocol_err("push promised despite push being disabled".into()));
            }
            frame_type::PRIORITY | frame_type::WINDOW_UPDATE => {}
            _ => {} // unknown or other-stream frames are ignorable
        }
    }

    if !saw_headers {
        return Err(protocol_err("stream ended without response headers".into()));
    }
    Ok(response)
}

/// Decodes one complete header block. The first block carries `:status`
/// and the response headers; later blocks are trailers appended to the
/// same multimap.
fn absorb_header_block(
    decoder: &mut Decoder<'_>,
    block: &[u8],
    response: &mut UpstreamResponse,
    first: bool,
) -> TransportResult<()> {
    let fields = decoder
        .decode(block)
        .map_err(|err| TransportError::HttpProtocolFail(format!("hpack decode failed: {err:?}")))?;

    for (name, value) in fields {
        let name = String::from_utf8_lossy(&name).into_owned();
        let value = String::from_utf8_lossy(&value).into_owned();
        if name == ":status" {
            if first {
                response.status = value.parse().map_err(|_| {
                    TransportError::HttpProtocolFail(format!("bad :status value {value:?}"))
                })?;
            }
        } else if !name.starts_with(':') {
            response.push_header(&name, &value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profiles::BrowserProfile;
    use crate::config::profiles::PseudoHeader::*;

    const FIREFOX_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:102.0) Gecko/20100101 Firefox/102.0";
    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

    fn ordered(profile: &BrowserProfile, order: &[&str], pairs: &[(&str, &str)]) -> OrderedHeaders {
        let mut headers = OrderedHeaders::new(
            order.iter().map(|s| s.to_string()).collect(),
            profile.pseudo_header_order(),
        );
        for (name, value) in pairs {
            headers.set(name, value);
        }
        headers
    }

    fn decode_names(block: &[u8]) -> Vec<String> {
        let mut decoder = Decoder::new();
        decoder
            .decode(block)
            .expect("block decodes")
            .into_iter()
            .map(|(name, _)| String::from_utf8(name).unwrap())
            .collect()
    }

    #[test]
    fn firefox_pseudo_order_leads_the_header_block() {
        let profile = BrowserProfile::from_user_agent(FIREFOX_UA);
        let headers = ordered(
            &profile,
            &["accept", "user-agent"],
            &[("Accept", "*/*"), ("User-Agent", FIREFOX_UA), ("Host", "x.test")],
        );
        let uri: Uri = "https://x.test/page".parse().unwrap();

        let block = encode_header_block(&Method::GET, &uri, &headers);
        let names = decode_names(&block);

        assert_eq!(
            &names[..4],
            &[":method", ":path", ":authority", ":scheme"],
            "first four HEADERS-block entries"
        );
        // Host never appears; regular headers follow in vector order.
        assert_eq!(&names[4..], &["accept", "user-agent"]);
    }

    #[test]
    fn chrome_pseudo_order_differs_from_firefox() {
        let profile = BrowserProfile::from_user_agent(CHROME_UA);
        assert_eq!(profile.pseudo_header_order(), [Method, Authority, Scheme, Path]);

        let headers = ordered(&profile, &[], &[]);
        let uri: Uri = "https://x.test/".parse().unwrap();
        let block = encode_header_block(&Method::GET, &uri, &headers);
        assert_eq!(
            decode_names(&block)[..4],
            [":method", ":authority", ":scheme", ":path"]
        );
    }

    #[test]
    fn pseudo_values_come_from_the_request_line() {
        let profile = BrowserProfile::from_user_agent(CHROME_UA);
        let headers = ordered(&profile, &[], &[]);
        let uri: Uri = "https://shop.example:8443/cart?item=1".parse().unwrap();

        let block = encode_header_block(&Method::POST, &uri, &headers);
        let mut decoder = Decoder::new();
        let fields: Vec<(String, String)> = decoder
            .decode(&block)
            .unwrap()
            .into_iter()
            .map(|(n, v)| {
                (
                    String::from_utf8(n).unwrap(),
                    String::from_utf8(v).unwrap(),
                )
            })
            .collect();

        let get = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get(":method"), "POST");
        assert_eq!(get(":authority"), "shop.example:8443");
        assert_eq!(get(":scheme"), "https");
        assert_eq!(get(":path"), "/cart?item=1");
    }

    #[test]
    fn default_port_is_omitted_from_authority() {
        let with_port: Uri = "https://x.test:443/".parse().unwrap();
        assert_eq!(authority_value(&with_port), "x.test");
        let odd_port: Uri = "https://x.test:9443/".parse().unwrap();
        assert_eq!(authority_value(&odd_port), "x.test:9443");
    }

    #[test]
    fn settings_frame_carries_profile_values_in_id_order() {
        let settings = BrowserProfile::from_user_agent(CHROME_UA).h2_settings();
        let frame = settings_frame(&settings);

        assert_eq!(frame[3], frame_type::SETTINGS);
        assert_eq!(frame[4], 0);
        let payload = &frame[FRAME_HEADER_LEN..];
        assert_eq!(payload.len(), 5 * 6);

        let entry = |i: usize| {
            let at = i * 6;
            (
                u16::from_be_bytes([payload[at], payload[at + 1]]),
                u32::from_be_bytes(payload[at + 2..at + 6].try_into().unwrap()),
            )
        };
        assert_eq!(entry(0), (0x1, 65_536));
        assert_eq!(entry(1), (0x2, 0));
        assert_eq!(entry(2), (0x3, 1000));
        assert_eq!(entry(3), (0x4, 6_291_456));
        assert_eq!(entry(4), (0x5, 16_384));
    }

    #[test]
    fn headers_frame_sets_end_flags() {
        let mut out = Vec::new();
        append_headers_frames(&mut out, &[0xaa; 10], 16_384, true);
        assert_eq!(out[3], frame_type::HEADERS);
        assert_eq!(out[4], flag::END_STREAM | flag::END_HEADERS);
        assert_eq!(out.len(), FRAME_HEADER_LEN + 10);
    }

    #[test]
    fn oversized_blocks_continue_into_continuation_frames() {
        let mut out = Vec::new();
        append_headers_frames(&mut out, &[0xbb; 10], 4, false);

        // 3 frames: HEADERS(4) + CONTINUATION(4) + CONTINUATION(2)
        assert_eq!(out[3], frame_type::HEADERS);
        assert_eq!(out[4], 0);
        let second = FRAME_HEADER_LEN + 4;
        assert_eq!(out[second + 3], frame_type::CONTINUATION);
        assert_eq!(out[second + 4], 0);
        let third = 2 * (FRAME_HEADER_LEN + 4);
        assert_eq!(out[third + 3], frame_type::CONTINUATION);
        assert_eq!(out[third + 4], flag::END_HEADERS);
    }

    #[test]
    fn data_frames_chunk_at_max_frame_size() {
        let mut out = Vec::new();
        append_data_frames(&mut out, &[0xcc; 5], 2);
        // 2 + 2 + 1, END_STREAM only on the last
        let mut at = 0;
        let mut flags_seen = Vec::new();
        while at < out.len() {
            let len = ((out[at] as usize) << 16) | ((out[at + 1] as usize) << 8) | out[at + 2] as usize;
            assert_eq!(out[at + 3], frame_type::DATA);
            flags_seen.push(out[at + 4]);
            at += FRAME_HEADER_LEN + len;
        }
        assert_eq!(flags_seen, vec![0, 0, flag::END_STREAM]);
    }

    #[test]
    fn padded_payloads_strip_cleanly() {
        // pad length 3, five data bytes, three pad bytes
        let payload = [3u8, 1, 2, 3, 4, 5, 0, 0, 0];
        let data = strip_padding(frame_type::DATA, flag::PADDED, &payload).unwrap();
        assert_eq!(data, &[1, 2, 3, 4, 5]);

        let bad = [9u8, 1, 2];
        assert!(strip_padding(frame_type::DATA, flag::PADDED, &bad).is_err());
    }

    #[test]
    fn absorb_block_splits_status_headers_and_trailers() {
        let mut encoder = Encoder::new();
        let block = encoder.encode(
            [
                (&b":status"[..], &b"200"[..]),
                (&b"content-type"[..], &b"text/html"[..]),
                (&b"set-cookie"[..], &b"a=1"[..]),
                (&b"set-cookie"[..], &b"b=2"[..]),
            ]
            .into_iter(),
        );

        let mut decoder = Decoder::new();
        let mut response = UpstreamResponse::default();
        absorb_header_block(&mut decoder, &block, &mut response, true).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header_values("set-cookie"), vec!["a=1", "b=2"]);

        let mut encoder = Encoder::new();
        let trailers = encoder.encode([(&b"grpc-status"[..], &b"0"[..])].into_iter());
        absorb_header_block(&mut decoder, &trailers, &mut response, false).unwrap();
        assert_eq!(response.header("grpc-status"), Some("0"));
    }
}
