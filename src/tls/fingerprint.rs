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

use md5::{Digest, Md5};

use super::ja3::HandshakeSpec;

/// JA3 hash (version,ciphers,extensions,curves,formats → MD5 hex).
pub fn calculate_ja3(spec: &HandshakeSpec) -> String {
    let mut hasher = Md5::new();
    hasher.update(spec.ja3_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// True when the spec hashes to the expected JA3 digest.
pub fn validate_spec(spec: &HandshakeSpec, expected: &str) -> bool {
    calculate_ja3(spec) == expected
}
