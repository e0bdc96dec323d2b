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

//! Response body decoding.
//!
//! Decompresses by `Content-Encoding` (outermost layer first, i.e. the
//! list in reverse) and classifies the decoded bytes for transport: text
//! content types pass through as UTF-8, everything else is base64-encoded.
//! The frame carries no type flag; callers infer from Content-Type.

use std::io::Read;

use base64::Engine as _;
use tracing::warn;

/// Decodes a response body for the `data` frame.
pub fn decode_body(raw: &[u8], content_encoding: &[String], content_type: &str) -> Vec<u8> {
    let decoded = decompress_chain(raw, content_encoding);
    if is_text_content_type(content_type) {
        decoded
    } else {
        base64::engine::general_purpose::STANDARD
            .encode(&decoded)
            .into_bytes()
    }
}

/// Applies the Content-Encoding chain. The header lists encodings in the
/// order they were applied, so decoding walks it back to front. A codec
/// failure leaves the remaining payload untouched (servers lie about
/// encodings often enough that hard-failing loses real bodies).
pub fn decompress_chain(raw: &[u8], content_encoding: &[String]) -> Vec<u8> {
    let mut data = raw.to_vec();
    for encoding in content_encoding.iter().rev() {
        for token in encoding.rsplit(',') {
            let token = token.trim().to_ascii_lowercase();
            data = match token.as_str() {
                "gzip" | "x-gzip" => match gunzip(&data) {
                    Ok(out) => out,
                    Err(err) => {
                        warn!(%err, "gzip decode failed, passing body through");
                        return data;
                    }
                },
                "deflate" => match inflate(&data) {
                    Ok(out) => out,
                    Err(err) => {
                        warn!(%err, "deflate decode failed, passing body through");
                        return data;
                    }
                },
                "br" => match unbrotli(&data) {
                    Ok(out) => out,
                    Err(err) => {
                        warn!(%err, "brotli decode failed, passing body through");
                        return data;
                    }
                },
                "identity" | "" => data,
                other => {
                    warn!(encoding = other, "unknown content encoding, passing body through");
                    return data;
                }
            };
        }
    }
    data
}

/// Content types whose bodies travel as UTF-8 text.
pub fn is_text_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.is_empty()
        || ct.starts_with("text/")
        || ct.starts_with("application/json")
        || ct.starts_with("application/xml")
        || ct.starts_with("application/javascript")
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// RFC 9110 deflate is zlib-wrapped, but some servers send raw deflate
/// streams; try the wrapper first and fall back.
fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match flate2::read::ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(_) => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(data).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

fn unbrotli(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, 4096).read_to_end(&mut out)?;
    Ok(out)
}
