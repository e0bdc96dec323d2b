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

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use crate::config::settings::{GatewayConfig, SessionConfig};
use crate::telemetry::TelemetrySink;

use super::session;

/// GatewayServer owns the TCP listener and spawns one session per
/// upgraded WebSocket connection.
///
/// Listener state (address, routes) is process-scoped startup
/// configuration; there is no runtime reconfiguration. Bind failures are
/// fatal and propagate so the process exits non-zero; per-connection
/// failures are logged and the accept loop continues.
pub struct GatewayServer {
    config: GatewayConfig,
    telemetry: TelemetrySink,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, telemetry: TelemetrySink) -> Self {
        Self { config, telemetry }
    }

    /// Binds the listener and accepts connections until the process exits.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.listener.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        tracing::info!(%addr, "MIRAGE listener online");

        loop {
            let (socket, peer) = listener.accept().await.context("accept failed")?;
            let session_config = self.config.session.clone();
            let telemetry = self.telemetry.clone();

            tracing::debug!(%peer, "accepted client");
            tokio::spawn(async move {
                handle_socket(socket, peer, session_config, telemetry).await;
            });
        }
    }
}

/// Upgrades one socket to a WebSocket and runs its session. A failed
/// upgrade logs the offending request head (pretty JSON) and drops the
/// connection; the server keeps serving.
async fn handle_socket(
    socket: TcpStream,
    peer: SocketAddr,
    config: SessionConfig,
    telemetry: TelemetrySink,
) {
    let mut request_head: Option<serde_json::Value> = None;

    let callback = |req: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        let mut headers = serde_json::Map::new();
        for (name, value) in req.headers() {
            headers.insert(
                name.to_string(),
                serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            );
        }
        request_head = Some(serde_json::json!({
            "uri": req.uri().to_string(),
            "headers": headers,
        }));
        Ok(response)
    };

    match accept_hdr_async(socket, callback).await {
        Ok(ws) => session::run(ws, config, telemetry).await,
        Err(err) => {
            // Non-WebSocket traffic hitting this port: dump what we read so
            // the misconfigured caller is identifiable, then drop.
            let head = request_head
                .as_ref()
                .and_then(|value| serde_json::to_string_pretty(value).ok())
                .unwrap_or_else(|| "<no parseable request head>".to_string());
            tracing::warn!(%peer, error = %err, "websocket upgrade failed");
            tracing::warn!(%peer, request = %head, "offending upgrade request");
        }
    }
}
