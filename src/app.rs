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

use anyhow::Result;

use crate::{config::settings::GatewayConfig, gateway::GatewayServer, telemetry::TelemetrySink};

/// GatewayApp wires together configuration, telemetry, and the WebSocket
/// job server.
pub struct GatewayApp {
    server: GatewayServer,
}

impl GatewayApp {
    /// Constructs a new GatewayApp from the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let telemetry = TelemetrySink::new(config.telemetry.clone());
        let server = GatewayServer::new(config, telemetry);
        Self { server }
    }

    /// Runs the application (binds listener, accepts sessions until process exits).
    pub async fn run(self) -> Result<()> {
        self.server.run().await
    }
}
