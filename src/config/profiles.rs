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

//! Browser profiles derived from User-Agent strings.
//!
//! A profile decides the default HTTP/1.1 header order, the HTTP/2
//! pseudo-header order, and the HTTP/2 SETTINGS the connection announces.
//! Profiles are immutable tables; deriving one is pure string sniffing.

/// HTTP/2 pseudo-header names in the abstract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoHeader::Method => ":method",
            PseudoHeader::Authority => ":authority",
            PseudoHeader::Scheme => ":scheme",
            PseudoHeader::Path => ":path",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Opera,
}

/// Profile resolved from a job's User-Agent string.
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub family: BrowserFamily,
    pub major: u16,
}

/// Master HTTP/1.1 header order. Jobs without an explicit `headerOrder`
/// have their headers sorted against this list; anything extra is appended
/// after in insertion order.
pub const DEFAULT_HEADER_ORDER: &[&str] = &[
    "host",
    "connection",
    "cache-control",
    "device-memory",
    "viewport-width",
    "rtt",
    "downlink",
    "ect",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-model",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "referer",
    "accept-encoding",
    "accept-language",
    "cookie",
];

/// HTTP/2 SETTINGS a browser announces at connection setup. Values follow
/// Chromium's spdy_session defaults and live captures of Firefox/Safari.
#[derive(Debug, Clone, Copy)]
pub struct H2Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub initial_connection_window_size: u32,
    pub max_frame_size: u32,
}

impl BrowserProfile {
    /// Resolves a profile from a User-Agent string.
    ///
    /// Substring sniffing in fixed priority: Firefox before Safari (Safari
    /// UAs contain "like Gecko"), Edge/Opera before Chrome (their UAs
    /// contain "Chrome/"), Chrome before Safari (Chrome UAs contain
    /// "Safari/"). Unknown agents fall back to Chrome.
    pub fn from_user_agent(ua: &str) -> Self {
        let table: [(BrowserFamily, &str); 6] = [
            (BrowserFamily::Firefox, "Firefox/"),
            (BrowserFamily::Edge, "Edg/"),
            (BrowserFamily::Edge, "Edge/"),
            (BrowserFamily::Opera, "OPR/"),
            (BrowserFamily::Chrome, "Chrome/"),
            (BrowserFamily::Safari, "Version/"),
        ];

        for (family, token) in table {
            if let Some(idx) = ua.find(token) {
                let major = parse_major(&ua[idx + token.len()..]);
                return Self { family, major };
            }
        }

        Self {
            family: BrowserFamily::Chrome,
            major: 0,
        }
    }

    /// Default HTTP/1.1 header order used when the job supplies none.
    pub fn header_order_default(&self) -> &'static [&'static str] {
        DEFAULT_HEADER_ORDER
    }

    /// HTTP/2 pseudo-header emission order.
    pub fn pseudo_header_order(&self) -> [PseudoHeader; 4] {
        use PseudoHeader::*;
        match self.family {
            BrowserFamily::Firefox => [Method, Path, Authority, Scheme],
            BrowserFamily::Safari => [Method, Scheme, Path, Authority],
            // Chromium family
            BrowserFamily::Chrome | BrowserFamily::Edge | BrowserFamily::Opera => {
                [Method, Authority, Scheme, Path]
            }
        }
    }

    /// HTTP/2 SETTINGS announced on connection setup.
    pub fn h2_settings(&self) -> H2Settings {
        match self.family {
            BrowserFamily::Chrome | BrowserFamily::Edge | BrowserFamily::Opera => H2Settings {
                header_table_size: 65_536,
                enable_push: false,
                max_concurrent_streams: 1000,
                initial_window_size: 6_291_456,
                initial_connection_window_size: 15_728_640,
                max_frame_size: 16_384,
            },
            BrowserFamily::Firefox => H2Settings {
                header_table_size: 65_536,
                enable_push: false,
                max_concurrent_streams: 100,
                initial_window_size: 131_072,
                initial_connection_window_size: 12_517_377,
                max_frame_size: 16_384,
            },
            BrowserFamily::Safari => H2Settings {
                header_table_size: 4_096,
                enable_push: false,
                max_concurrent_streams: 100,
                initial_window_size: 65_535,
                initial_connection_window_size: 10_485_760,
                max_frame_size: 16_384,
            },
        }
    }

}

fn parse_major(rest: &str) -> u16 {
    rest.chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
    const FIREFOX_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:102.0) Gecko/20100101 Firefox/102.0";
    const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const EDGE_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.2151.44";

    #[test]
    fn sniffs_chrome_with_version() {
        let profile = BrowserProfile::from_user_agent(CHROME_UA);
        assert_eq!(profile.family, BrowserFamily::Chrome);
        assert_eq!(profile.major, 119);
    }

    #[test]
    fn firefox_wins_over_gecko_lookalikes() {
        let profile = BrowserProfile::from_user_agent(FIREFOX_UA);
        assert_eq!(profile.family, BrowserFamily::Firefox);
        assert_eq!(profile.major, 102);
    }

    #[test]
    fn safari_needs_version_token() {
        let profile = BrowserProfile::from_user_agent(SAFARI_UA);
        assert_eq!(profile.family, BrowserFamily::Safari);
        assert_eq!(profile.major, 17);
    }

    #[test]
    fn edge_wins_over_embedded_chrome_token() {
        let profile = BrowserProfile::from_user_agent(EDGE_UA);
        assert_eq!(profile.family, BrowserFamily::Edge);
    }

    #[test]
    fn unknown_agents_default_to_chrome() {
        let profile = BrowserProfile::from_user_agent("curl/8.4.0");
        assert_eq!(profile.family, BrowserFamily::Chrome);
        assert_eq!(profile.major, 0);
    }

    #[test]
    fn pseudo_orders_differ_per_family() {
        use PseudoHeader::*;
        let chrome = BrowserProfile::from_user_agent(CHROME_UA);
        assert_eq!(chrome.pseudo_header_order(), [Method, Authority, Scheme, Path]);

        let firefox = BrowserProfile::from_user_agent(FIREFOX_UA);
        assert_eq!(firefox.pseudo_header_order(), [Method, Path, Authority, Scheme]);

        let safari = BrowserProfile::from_user_agent(SAFARI_UA);
        assert_eq!(safari.pseudo_header_order(), [Method, Scheme, Path, Authority]);
    }

    #[test]
    fn header_order_starts_with_host_and_ends_with_cookie() {
        let profile = BrowserProfile::from_user_agent(CHROME_UA);
        let order = profile.header_order_default();
        assert_eq!(order.first(), Some(&"host"));
        assert_eq!(order.last(), Some(&"cookie"));
        assert!(order.contains(&"sec-ch-ua"));
    }

    #[test]
    fn h2_settings_match_browser_captures() {
        let chrome = BrowserProfile::from_user_agent(CHROME_UA).h2_settings();
        assert_eq!(chrome.initial_window_size, 6_291_456);
        assert_eq!(chrome.max_concurrent_streams, 1000);
        assert!(!chrome.enable_push);

        let safari = BrowserProfile::from_user_agent(SAFARI_UA).h2_settings();
        assert_eq!(safari.header_table_size, 4_096);
    }
}
