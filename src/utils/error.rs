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

use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

/// Transport failure taxonomy. Every variant maps to a synthetic HTTP status
/// carried in `error` frames so callers can triage without parsing messages.
///
/// The Display form starts with the stable kind label (`JA3_MALFORMED: ...`)
/// because callers prefix-match on it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("JA3_MALFORMED: {0}")]
    Ja3Malformed(String),

    #[error("URL_INVALID: {0}")]
    UrlInvalid(String),

    #[error("DNS_FAIL: {0}")]
    DnsFail(String),

    #[error("CONNECT_FAIL: {0}")]
    ConnectFail(String),

    #[error("TLS_FAIL: {0}")]
    TlsFail(String),

    #[error("PROXY_FAIL: {0}")]
    ProxyFail(String),

    #[error("HTTP_PROTOCOL_FAIL: {0}")]
    HttpProtocolFail(String),

    #[error("TIMEOUT: {0}")]
    Timeout(String),
}

impl TransportError {
    /// Synthetic status used in the `error` frame payload. DNS and TCP
    /// failures report 0 (no HTTP-layer analogue).
    pub fn synthetic_status(&self) -> u16 {
        match self {
            TransportError::Ja3Malformed(_) | TransportError::UrlInvalid(_) => 400,
            TransportError::DnsFail(_) | TransportError::ConnectFail(_) => 0,
            TransportError::TlsFail(_) => 525,
            TransportError::ProxyFail(_) | TransportError::HttpProtocolFail(_) => 502,
            TransportError::Timeout(_) => 408,
        }
    }

    /// Stable label (the prefix of the Display form) for telemetry.
    pub fn kind_label(&self) -> &'static str {
        match self {
            TransportError::Ja3Malformed(_) => "JA3_MALFORMED",
            TransportError::UrlInvalid(_) => "URL_INVALID",
            TransportError::DnsFail(_) => "DNS_FAIL",
            TransportError::ConnectFail(_) => "CONNECT_FAIL",
            TransportError::TlsFail(_) => "TLS_FAIL",
            TransportError::ProxyFail(_) => "PROXY_FAIL",
            TransportError::HttpProtocolFail(_) => "HTTP_PROTOCOL_FAIL",
            TransportError::Timeout(_) => "TIMEOUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_starts_with_kind_label() {
        let err = TransportError::Ja3Malformed("expected 5 parts".into());
        assert!(err.to_string().starts_with("JA3_MALFORMED"));
        assert_eq!(err.synthetic_status(), 400);
    }

    #[test]
    fn network_failures_report_status_zero() {
        assert_eq!(TransportError::DnsFail("x".into()).synthetic_status(), 0);
        assert_eq!(TransportError::ConnectFail("x".into()).synthetic_status(), 0);
    }

    #[test]
    fn tls_failures_use_cloudflare_style_525() {
        assert_eq!(TransportError::TlsFail("alert".into()).synthetic_status(), 525);
    }
}
