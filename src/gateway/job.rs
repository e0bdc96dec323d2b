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

use serde::Deserialize;

/// One inbound channel message: a correlation id plus the request options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub request_id: String,
    pub options: JobOptions,
}

/// Request options as the caller submits them. Field names mirror the
/// caller-side library schema (camelCase), every field defaults so partial
/// jobs stay parseable.
///
/// `headers` deserializes into a `serde_json::Map`, which preserves the
/// caller's insertion order (the builder's "extras go last in input order"
/// rule depends on that).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub url: String,
    pub method: String,
    pub headers: serde_json::Map<String, serde_json::Value>,
    pub body: String,
    pub ja3: String,
    pub user_agent: String,
    pub proxy: String,
    pub cookies: Vec<JobCookie>,
    /// Milliseconds; 0 means the gateway default.
    pub timeout: u64,
    pub disable_redirect: bool,
    pub header_order: Vec<String>,
    /// Reserved: accepted and ignored until the semantics are settled.
    pub order_as_provided: bool,
}

/// Cookie attached to the outbound request's `Cookie` header, in list order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: String,
}
