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

use std::sync::Arc;

use rustls::crypto::aws_lc_rs::{self, cipher_suite, kx_group};
use rustls::crypto::SupportedKxGroup;
use rustls::version::{TLS12, TLS13};
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use tracing::debug;

use crate::utils::{TransportError, TransportResult};

use super::fingerprint::calculate_ja3;
use super::ja3::HandshakeSpec;

/// Materialized TLS client plan derived from a parsed JA3 spec.
///
/// Carries everything rustls lets us control: cipher suites in spec order,
/// key-exchange groups in curve-list order, protocol versions, and ALPN.
/// The spec's byte-exact extension ordering lives in `tls::clienthello`.
#[derive(Clone)]
pub struct TlsClientPlan {
    ja3_hash: String,
    alpn: Vec<Vec<u8>>,
    cipher_suites: Vec<SupportedCipherSuite>,
    protocol_versions: Vec<&'static SupportedProtocolVersion>,
    kx_groups: Vec<&'static dyn SupportedKxGroup>,
}

impl std::fmt::Debug for TlsClientPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClientPlan")
            .field("ja3_hash", &self.ja3_hash)
            .field("cipher_suites", &self.cipher_suites.len())
            .field("kx_groups", &self.kx_groups.len())
            .finish()
    }
}

impl TlsClientPlan {
    /// Builds a plan from a handshake spec. The JA3 hash doubles as the
    /// plan identifier in logs and telemetry.
    pub fn from_spec(spec: &HandshakeSpec) -> Self {
        let cipher_suites: Vec<_> = spec
            .cipher_suites
            .iter()
            .filter_map(|id| lookup_cipher(*id))
            .collect();
        if cipher_suites.is_empty() {
            debug!("JA3 cipher list has no rustls-supported suites, falling back to provider defaults");
        }

        let kx_groups: Vec<_> = spec
            .curves
            .iter()
            .filter_map(|id| lookup_kx_group(*id))
            .collect();
        if kx_groups.is_empty() {
            debug!("JA3 curve list has no rustls-supported groups, falling back to provider defaults");
        }

        Self {
            ja3_hash: calculate_ja3(spec),
            alpn: vec![b"h2".to_vec(), b"http/1.1".to_vec()],
            cipher_suites,
            protocol_versions: resolve_versions(spec),
            kx_groups,
        }
    }

    pub fn ja3_hash(&self) -> &str {
        &self.ja3_hash
    }

    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn
    }

    pub fn clone_with_alpn(&self, alpn: Vec<Vec<u8>>) -> Self {
        Self {
            alpn,
            ..self.clone()
        }
    }

    /// Materializes a rustls ClientConfig: custom crypto provider with the
    /// spec's cipher and group ordering, webpki roots, plan ALPN.
    pub fn client_config(&self) -> TransportResult<ClientConfig> {
        let mut provider = aws_lc_rs::default_provider();
        if !self.cipher_suites.is_empty() {
            provider.cipher_suites = self.cipher_suites.clone();
        }
        if !self.kx_groups.is_empty() {
            provider.kx_groups = self.kx_groups.clone();
        }

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&self.protocol_versions)
            .map_err(|err| {
                TransportError::Ja3Malformed(format!(
                    "spec {} requests protocol versions the crypto provider rejects: {err}",
                    self.ja3_hash
                ))
            })?;

        let mut config = builder.with_root_certificates(roots).with_no_client_auth();
        config.alpn_protocols = self.alpn.clone();
        Ok(config)
    }
}

fn resolve_versions(spec: &HandshakeSpec) -> Vec<&'static SupportedProtocolVersion> {
    if spec.offers_tls13() {
        vec![&TLS13, &TLS12]
    } else if spec.version >= 772 {
        vec![&TLS13]
    } else {
        vec![&TLS12]
    }
}

fn lookup_cipher(id: u16) -> Option<SupportedCipherSuite> {
    match id {
        4865 => Some(cipher_suite::TLS13_AES_128_GCM_SHA256),
        4866 => Some(cipher_suite::TLS13_AES_256_GCM_SHA384),
        4867 => Some(cipher_suite::TLS13_CHACHA20_POLY1305_SHA256),
        49195 => Some(cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256),
        49196 => Some(cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384),
        49199 => Some(cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256),
        49200 => Some(cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384),
        52392 => Some(cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256),
        52393 => Some(cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256),
        other => {
            if !super::clienthello::is_grease(other) {
                debug!(cipher = other, "cipher not supported by rustls, skipping");
            }
            None
        }
    }
}

fn lookup_kx_group(id: u16) -> Option<&'static dyn SupportedKxGroup> {
    match id {
        29 => Some(kx_group::X25519),
        23 => Some(kx_group::SECP256R1),
        24 => Some(kx_group::SECP384R1),
        other => {
            if !super::clienthello::is_grease(other) {
                debug!(group = other, "kx group not supported by rustls, skipping");
            }
            None
        }
    }
}
