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

use crate::utils::{TransportError, TransportResult};

/// Parsed JA3 handshake description.
///
/// A JA3 string is `Version,Ciphers,Extensions,Curves,PointFormats` with
/// dash-separated decimal sublists. Everything here is kept exactly as the
/// caller wrote it: duplicates stay, GREASE values stay, and order is the
/// order the ClientHello assembler will emit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeSpec {
    /// TLS version advertised in the ClientHello body (771 = TLS 1.2).
    pub version: u16,
    /// Ordered cipher suite IDs.
    pub cipher_suites: Vec<u16>,
    /// Ordered extension IDs; determines which extension blocks appear and where.
    pub extensions: Vec<u16>,
    /// Ordered named-group (curve) IDs for the supported_groups extension.
    pub curves: Vec<u16>,
    /// Ordered EC point format codes.
    pub point_formats: Vec<u8>,
}

impl HandshakeSpec {
    /// Parses a JA3 string. Rejects anything that is not exactly five
    /// comma-separated parts of decimal tokens in u16 range (u8 for point
    /// formats). Empty sublists are legal.
    pub fn parse(ja3: &str) -> TransportResult<Self> {
        let parts: Vec<&str> = ja3.split(',').collect();
        if parts.len() != 5 {
            return Err(TransportError::Ja3Malformed(format!(
                "expected 5 comma-separated parts, got {}",
                parts.len()
            )));
        }

        let version = parts[0]
            .parse::<u16>()
            .map_err(|_| TransportError::Ja3Malformed(format!("bad TLS version: {:?}", parts[0])))?;

        Ok(Self {
            version,
            cipher_suites: parse_u16_list(parts[1], "cipher list")?,
            extensions: parse_u16_list(parts[2], "extension list")?,
            curves: parse_u16_list(parts[3], "curve list")?,
            point_formats: parse_u8_list(parts[4], "point format list")?,
        })
    }

    /// Re-serializes into the canonical JA3 string form.
    pub fn ja3_string(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.version,
            join(&self.cipher_suites),
            join(&self.extensions),
            join(&self.curves),
            join(&self.point_formats),
        )
    }

    /// True when the extension list asks for the supported_versions block,
    /// i.e. the hello offers TLS 1.3 on top of the legacy version field.
    pub fn offers_tls13(&self) -> bool {
        self.extensions.contains(&super::clienthello::ext::SUPPORTED_VERSIONS)
    }
}

fn parse_u16_list(part: &str, what: &str) -> TransportResult<Vec<u16>> {
    if part.is_empty() {
        return Ok(Vec::new());
    }
    part.split('-')
        .map(|token| {
            token.parse::<u16>().map_err(|_| {
                TransportError::Ja3Malformed(format!("bad token {token:?} in {what}"))
            })
        })
        .collect()
}

fn parse_u8_list(part: &str, what: &str) -> TransportResult<Vec<u8>> {
    if part.is_empty() {
        return Ok(Vec::new());
    }
    part.split('-')
        .map(|token| {
            token.parse::<u8>().map_err(|_| {
                TransportError::Ja3Malformed(format!("bad token {token:?} in {what}"))
            })
        })
        .collect()
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}
