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

//! Ordered header block.
//!
//! A plain map loses emission order and canonicalizes case, which destroys
//! the header-order fingerprint. This block keeps `(name, value)` pairs
//! with the caller's original case beside an explicit lowercase order
//! vector; the map view exists for lookup only, iteration is always driven
//! by the order vector.

use crate::config::profiles::PseudoHeader;

#[derive(Debug, Clone)]
pub struct OrderedHeaders {
    /// `(original-case name, value)` in insertion order.
    entries: Vec<(String, String)>,
    /// Lowercase names dictating the emit order of regular headers.
    order: Vec<String>,
    /// HTTP/2 pseudo-header emission order from the browser profile.
    pseudo_order: [PseudoHeader; 4],
}

impl OrderedHeaders {
    pub fn new(order: Vec<String>, pseudo_order: [PseudoHeader; 4]) -> Self {
        Self {
            entries: Vec::new(),
            order,
            pseudo_order,
        }
    }

    /// Sets a header, replacing any case-insensitive match in place (the
    /// slot keeps its position; name case follows the latest caller).
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.0 = name.to_string();
            entry.1 = value.to_string();
        } else {
            self.entries.push((name.to_string(), value.to_string()));
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn pseudo_order(&self) -> [PseudoHeader; 4] {
        self.pseudo_order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emission order: every order-vector name with a case-insensitive
    /// match first (names in the vector but absent here are skipped),
    /// then the remaining entries in insertion order.
    pub fn iter_ordered(&self) -> Vec<(&str, &str)> {
        let mut taken = vec![false; self.entries.len()];
        let mut out = Vec::with_capacity(self.entries.len());

        for wanted in &self.order {
            for (idx, (name, value)) in self.entries.iter().enumerate() {
                if !taken[idx] && name.eq_ignore_ascii_case(wanted) {
                    taken[idx] = true;
                    out.push((name.as_str(), value.as_str()));
                    break;
                }
            }
        }

        for (idx, (name, value)) in self.entries.iter().enumerate() {
            if !taken[idx] {
                out.push((name.as_str(), value.as_str()));
            }
        }

        out
    }
}
