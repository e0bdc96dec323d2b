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

//! Hand-rolled ClientHello assembly.
//!
//! Stock TLS stacks pick their own extension order, which destroys the JA3
//! fingerprint. This module turns a parsed [`HandshakeSpec`] into the exact
//! ClientHello record the caller's JA3 describes: ciphers, extensions,
//! curves, and point formats byte-identical and in spec order, with
//! browser-realistic payloads for each extension block. `ja3_of` walks the
//! assembled record back into a spec so the round-trip contract
//! (`ja3_of(build(parse(S))) == S`) is checkable anywhere.

use bytes::BufMut;
use rand::RngCore;

use crate::utils::{TransportError, TransportResult};

use super::ja3::HandshakeSpec;

/// TLS extension identifiers used by browser ClientHellos.
pub mod ext {
    pub const SERVER_NAME: u16 = 0;
    pub const STATUS_REQUEST: u16 = 5;
    pub const SUPPORTED_GROUPS: u16 = 10;
    pub const EC_POINT_FORMATS: u16 = 11;
    pub const SIGNATURE_ALGORITHMS: u16 = 13;
    pub const ALPN: u16 = 16;
    pub const SIGNED_CERTIFICATE_TIMESTAMP: u16 = 18;
    pub const PADDING: u16 = 21;
    pub const EXTENDED_MASTER_SECRET: u16 = 23;
    pub const COMPRESS_CERTIFICATE: u16 = 27;
    pub const RECORD_SIZE_LIMIT: u16 = 28;
    pub const SESSION_TICKET: u16 = 35;
    pub const PRE_SHARED_KEY: u16 = 41;
    pub const SUPPORTED_VERSIONS: u16 = 43;
    pub const PSK_KEY_EXCHANGE_MODES: u16 = 45;
    pub const KEY_SHARE: u16 = 51;
    pub const APPLICATION_SETTINGS: u16 = 17513;
    pub const RENEGOTIATION_INFO: u16 = 65281;
}

/// Named groups that carry real key-share material.
mod group {
    pub const SECP256R1: u16 = 23;
    pub const SECP384R1: u16 = 24;
    pub const X25519: u16 = 29;
}

/// GREASE identifiers from RFC 8701 (0x?a?a pattern).
pub fn is_grease(value: u16) -> bool {
    value & 0x0f0f == 0x0a0a && (value >> 8) == (value & 0xff)
}

/// Chrome pads its hello so the full record reaches this many bytes.
const PADDING_TARGET: usize = 517;

/// Signature schemes modern browsers advertise, in Chrome's order.
const SIGNATURE_SCHEMES: [u16; 8] = [
    0x0403, // ecdsa_secp256r1_sha256
    0x0804, // rsa_pss_rsae_sha256
    0x0401, // rsa_pkcs1_sha256
    0x0503, // ecdsa_secp384r1_sha384
    0x0805, // rsa_pss_rsae_sha384
    0x0501, // rsa_pkcs1_sha384
    0x0806, // rsa_pss_rsae_sha512
    0x0601, // rsa_pkcs1_sha512
];

pub const DEFAULT_ALPN: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Assembles the full ClientHello record for a handshake spec.
///
/// Fresh random, session id, and key-share material every call; everything
/// JA3-visible comes from the spec verbatim, GREASE included.
pub fn build(spec: &HandshakeSpec, sni: &str, alpn: &[&[u8]]) -> TransportResult<Vec<u8>> {
    // Two passes: the padding extension length depends on the size of
    // everything else, so assemble once without it, measure, then finalize.
    let extensions = assemble_extensions(spec, sni, alpn, 0)?;
    let body_len = hello_body_len(spec, &extensions);

    let extensions = if spec.extensions.contains(&ext::PADDING) {
        // record header (5) + handshake header (4) + body
        let total = 5 + 4 + body_len;
        let pad = PADDING_TARGET.saturating_sub(total);
        assemble_extensions(spec, sni, alpn, pad)?
    } else {
        extensions
    };

    let body_len = hello_body_len(spec, &extensions);
    if body_len > 0xffff - 4 {
        return Err(TransportError::Ja3Malformed(format!(
            "assembled hello body is {body_len} bytes, exceeds record capacity"
        )));
    }

    let mut rng = rand::thread_rng();
    let mut random = [0u8; 32];
    rng.fill_bytes(&mut random);
    let mut session_id = [0u8; 32];
    rng.fill_bytes(&mut session_id);

    let mut record = Vec::with_capacity(body_len + 9);
    record.put_u8(0x16); // handshake record
    record.put_u16(0x0301); // legacy record version, always TLS 1.0
    record.put_u16((body_len + 4) as u16);
    record.put_u8(0x01); // ClientHello
    record.put_u8((body_len >> 16) as u8);
    record.put_u16((body_len & 0xffff) as u16);

    record.put_u16(spec.version);
    record.put_slice(&random);
    record.put_u8(32);
    record.put_slice(&session_id);

    record.put_u16((spec.cipher_suites.len() * 2) as u16);
    for suite in &spec.cipher_suites {
        record.put_u16(*suite);
    }

    record.put_u8(1); // one compression method: null
    record.put_u8(0);

    record.put_u16(extensions.len() as u16);
    record.put_slice(&extensions);

    Ok(record)
}

fn hello_body_len(spec: &HandshakeSpec, extensions: &[u8]) -> usize {
    // version + random + session id (len byte + 32) + cipher block +
    // compression block + extensions block
    2 + 32 + 33 + (2 + spec.cipher_suites.len() * 2) + 2 + (2 + extensions.len())
}

fn assemble_extensions(
    spec: &HandshakeSpec,
    sni: &str,
    alpn: &[&[u8]],
    pad_len: usize,
) -> TransportResult<Vec<u8>> {
    let mut out = Vec::new();
    for id in &spec.extensions {
        let payload = extension_payload(*id, spec, sni, alpn, pad_len);
        if payload.len() > 0xffff {
            return Err(TransportError::Ja3Malformed(format!(
                "extension {id} payload overflows length prefix"
            )));
        }
        out.put_u16(*id);
        out.put_u16(payload.len() as u16);
        out.put_slice(&payload);
    }
    Ok(out)
}

fn extension_payload(id: u16, spec: &HandshakeSpec, sni: &str, alpn: &[&[u8]], pad: usize) -> Vec<u8> {
    if is_grease(id) {
        // Chrome's GREASE extensions carry no payload.
        return Vec::new();
    }

    let mut p = Vec::new();
    match id {
        ext::SERVER_NAME => {
            p.put_u16((sni.len() + 3) as u16); // server name list length
            p.put_u8(0); // host_name
            p.put_u16(sni.len() as u16);
            p.put_slice(sni.as_bytes());
        }
        ext::SUPPORTED_GROUPS => {
            p.put_u16((spec.curves.len() * 2) as u16);
            for curve in &spec.curves {
                p.put_u16(*curve);
            }
        }
        ext::EC_POINT_FORMATS => {
            p.put_u8(spec.point_formats.len() as u8);
            p.put_slice(&spec.point_formats);
        }
        ext::SIGNATURE_ALGORITHMS => {
            p.put_u16((SIGNATURE_SCHEMES.len() * 2) as u16);
            for scheme in SIGNATURE_SCHEMES {
                p.put_u16(scheme);
            }
        }
        ext::ALPN => {
            let protocols: &[&[u8]] = if alpn.is_empty() { &DEFAULT_ALPN } else { alpn };
            let list_len: usize = protocols.iter().map(|proto| proto.len() + 1).sum();
            p.put_u16(list_len as u16);
            for proto in protocols {
                p.put_u8(proto.len() as u8);
                p.put_slice(proto);
            }
        }
        ext::STATUS_REQUEST => {
            p.put_u8(1); // ocsp
            p.put_u16(0); // responder id list
            p.put_u16(0); // request extensions
        }
        ext::SUPPORTED_VERSIONS => {
            if spec.version >= 771 {
                p.put_u8(4);
                p.put_u16(0x0304);
                p.put_u16(0x0303);
            } else {
                p.put_u8(2);
                p.put_u16(0x0300 | (spec.version & 0xff));
            }
        }
        ext::PSK_KEY_EXCHANGE_MODES => {
            p.put_u8(1);
            p.put_u8(1); // psk_dhe_ke
        }
        ext::KEY_SHARE => {
            let shares = key_share_entries(&spec.curves);
            p.put_u16(shares.len() as u16);
            p.put_slice(&shares);
        }
        ext::COMPRESS_CERTIFICATE => {
            // Chrome advertises brotli: 02 00 02
            p.put_u8(2);
            p.put_u16(0x0002);
        }
        ext::APPLICATION_SETTINGS => {
            // ALPS carrying "h2": 00 03 02 68 32
            p.put_u16(3);
            p.put_u8(2);
            p.put_slice(b"h2");
        }
        ext::RECORD_SIZE_LIMIT => {
            p.put_u16(0x4001);
        }
        ext::RENEGOTIATION_INFO => {
            p.put_u8(0);
        }
        ext::PADDING => {
            p.extend(std::iter::repeat(0u8).take(pad));
        }
        // Empty-payload extensions (and anything we don't model): the id is
        // what JA3 sees, so an empty block keeps the fingerprint intact.
        _ => {}
    }
    p
}

/// Key-share entries: one GREASE placeholder if the curve list leads with
/// GREASE (Chrome's shape), then real-length material for the first
/// supported group.
fn key_share_entries(curves: &[u16]) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut out = Vec::new();

    if curves.first().copied().map(is_grease).unwrap_or(false) {
        out.put_u16(curves[0]);
        out.put_u16(1);
        out.put_u8(0);
    }

    let chosen = curves
        .iter()
        .copied()
        .find(|c| !is_grease(*c))
        .unwrap_or(group::X25519);
    let key_len = match chosen {
        group::X25519 => 32,
        group::SECP256R1 => 65,
        group::SECP384R1 => 97,
        _ => 32,
    };
    let mut material = vec![0u8; key_len];
    rng.fill_bytes(&mut material);
    if chosen == group::SECP256R1 || chosen == group::SECP384R1 {
        material[0] = 0x04; // uncompressed point marker
    }
    out.put_u16(chosen);
    out.put_u16(key_len as u16);
    out.put_slice(&material);
    out
}

/// Walks an assembled ClientHello record and extracts its JA3 spec.
///
/// GREASE values are kept: the caller's JA3 string is the contract here,
/// unlike passive sensors which filter them before hashing.
pub fn ja3_of(record: &[u8]) -> TransportResult<HandshakeSpec> {
    let malformed = |what: &str| TransportError::Ja3Malformed(format!("client hello: {what}"));

    if record.len() < 11 || record[0] != 0x16 {
        return Err(malformed("not a handshake record"));
    }
    let mut pos = 5; // record header
    if record[pos] != 0x01 {
        return Err(malformed("not a ClientHello"));
    }
    pos += 4; // handshake header

    if pos + 2 > record.len() {
        return Err(malformed("truncated version"));
    }
    let version = u16::from_be_bytes([record[pos], record[pos + 1]]);
    pos += 2;

    pos += 32; // random
    if pos >= record.len() {
        return Err(malformed("truncated random"));
    }
    let session_id_len = record[pos] as usize;
    pos += 1 + session_id_len;

    if pos + 2 > record.len() {
        return Err(malformed("truncated cipher block"));
    }
    let cipher_len = u16::from_be_bytes([record[pos], record[pos + 1]]) as usize;
    pos += 2;
    if pos + cipher_len > record.len() {
        return Err(malformed("cipher block overruns record"));
    }
    let mut cipher_suites = Vec::with_capacity(cipher_len / 2);
    let cipher_end = pos + cipher_len;
    while pos + 2 <= cipher_end {
        cipher_suites.push(u16::from_be_bytes([record[pos], record[pos + 1]]));
        pos += 2;
    }
    pos = cipher_end;

    if pos >= record.len() {
        return Err(malformed("truncated compression block"));
    }
    let compression_len = record[pos] as usize;
    pos += 1 + compression_len;

    if pos + 2 > record.len() {
        return Err(malformed("truncated extensions block"));
    }
    let extensions_len = u16::from_be_bytes([record[pos], record[pos + 1]]) as usize;
    pos += 2;
    let extensions_end = pos + extensions_len;
    if extensions_end > record.len() {
        return Err(malformed("extensions block overruns record"));
    }

    let mut extensions = Vec::new();
    let mut curves = Vec::new();
    let mut point_formats = Vec::new();

    while pos + 4 <= extensions_end {
        let ext_type = u16::from_be_bytes([record[pos], record[pos + 1]]);
        let ext_len = u16::from_be_bytes([record[pos + 2], record[pos + 3]]) as usize;
        pos += 4;
        if pos + ext_len > extensions_end {
            return Err(malformed("extension overruns block"));
        }

        extensions.push(ext_type);

        if ext_type == ext::SUPPORTED_GROUPS && ext_len >= 2 {
            let list_len = u16::from_be_bytes([record[pos], record[pos + 1]]) as usize;
            let mut group_pos = pos + 2;
            let groups_end = (group_pos + list_len).min(pos + ext_len);
            while group_pos + 2 <= groups_end {
                curves.push(u16::from_be_bytes([record[group_pos], record[group_pos + 1]]));
                group_pos += 2;
            }
        }

        if ext_type == ext::EC_POINT_FORMATS && ext_len >= 1 {
            let list_len = record[pos] as usize;
            let formats_end = (pos + 1 + list_len).min(pos + ext_len);
            point_formats.extend_from_slice(&record[pos + 1..formats_end]);
        }

        pos += ext_len;
    }

    Ok(HandshakeSpec {
        version,
        cipher_suites,
        extensions,
        curves,
        point_formats,
    })
}
