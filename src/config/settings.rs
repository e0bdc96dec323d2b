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

use serde::Serialize;

/// Top-level runtime configuration for the gateway.
///
/// There is no config file: the wire contract configures through the
/// `-a/--addr` flag and the `WS_PORT` environment variable, everything else
/// ships with defaults. Each nested struct captures one subsystem so
/// changes stay localized.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayConfig {
    /// Listener configuration (bind address for the WebSocket endpoint).
    pub listener: ListenerConfig,
    /// Per-session queue depths, timeouts, and redirect policy.
    pub session: SessionConfig,
    /// Telemetry configuration (stdout vs structured log output).
    pub telemetry: TelemetryConfig,
}

impl GatewayConfig {
    pub fn new(listener: ListenerConfig) -> Self {
        Self {
            listener,
            session: SessionConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerConfig {
    /// Bind address in `host:port` or `:port` form.
    pub addr: String,
}

impl ListenerConfig {
    /// Resolves the listen address: explicit `-a/--addr` flag wins, then the
    /// `WS_PORT` environment variable, then the default port.
    pub fn resolve(addr_flag: Option<&str>, ws_port: Option<&str>) -> Self {
        let addr = match (addr_flag, ws_port) {
            (Some(addr), _) => addr.to_string(),
            (None, Some(port)) => format!(":{port}"),
            (None, None) => format!(":{DEFAULT_PORT}"),
        };
        Self { addr }
    }

    /// Normalized `host:port` string suitable for `TcpListener::bind`
    /// (a bare `:port` binds all interfaces).
    pub fn bind_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}

const DEFAULT_PORT: u16 = 9112;

#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    /// Bounded depth of the inbound job queue.
    pub job_queue_depth: usize,
    /// Bounded depth of the outbound frame queue. A full queue blocks
    /// dispatchers, which throttles downstream servers.
    pub frame_queue_depth: usize,
    /// Applied when a job supplies `timeout: 0`.
    pub default_timeout_ms: u64,
    /// Redirect hops followed before giving up on a job.
    pub max_redirects: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            job_queue_depth: default_queue_depth(),
            frame_queue_depth: default_queue_depth(),
            default_timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_queue_depth() -> usize {
    64
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_redirects() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TelemetryConfig {
    /// Telemetry output: human-friendly stdout or structured JSON.
    pub mode: TelemetryMode,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    /// Print structured, readable logs to stdout.
    #[default]
    Stdout,
    /// Emit JSON objects for ingestion systems.
    Json,
}
