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

use clap::Parser;
use mirage_proxy::{
    app::GatewayApp,
    config::settings::{GatewayConfig, ListenerConfig},
    utils::init_tracing,
};

/// Command-line interface definition using clap's derive API.
///
/// Minimal surface area: the listen address (flag or `WS_PORT` env) and
/// the logging format. Everything else ships with defaults.
#[derive(Debug, Parser)]
#[command(
    name = "mirage",
    about = "MIRAGE: Mimicked Identity Request Gateway"
)]
struct Cli {
    /// Listen address, `:<port>` or `host:port` form. Overrides WS_PORT.
    #[arg(short = 'a', long)]
    addr: Option<String>,

    /// Listen port when --addr is not given (default 9112).
    #[arg(long, env = "WS_PORT")]
    ws_port: Option<String>,

    /// Enable JSON-formatted logs (default: human-readable stdout).
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Application entry point: parse CLI, initialize logging, run the server.
///
/// Exit status: 0 on clean shutdown, non-zero when the listener cannot
/// bind (anyhow's error propagation through main).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    let listener = ListenerConfig::resolve(cli.addr.as_deref(), cli.ws_port.as_deref());
    let config = GatewayConfig::new(listener);

    let app = GatewayApp::new(config);
    app.run().await
}
