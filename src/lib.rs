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

//! MIRAGE: Mimicked Identity Request Gateway.
//!
//! A WebSocket-fronted request proxy that performs outbound HTTPS
//! requests wearing caller-supplied browser fingerprints: the TLS
//! ClientHello reproduces the job's JA3 string and headers travel in
//! caller- or browser-profile order over HTTP/1.1 or HTTP/2.

pub mod app;
pub mod config;
pub mod gateway;
pub mod proxy;
pub mod telemetry;
pub mod tls;
pub mod utils;
