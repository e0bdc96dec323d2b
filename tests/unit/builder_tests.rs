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

use mirage_proxy::config::profiles::{BrowserFamily, PseudoHeader};
use mirage_proxy::config::settings::SessionConfig;
use mirage_proxy::gateway::job::JobEnvelope;
use mirage_proxy::proxy::request::RequestPlan;

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:102.0) Gecko/20100101 Firefox/102.0";
const JA3: &str = "771,4865-4866-4867,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513,29-23-24,0";

fn plan_from(raw: &str) -> RequestPlan {
    let envelope: JobEnvelope = serde_json::from_str(raw).expect("envelope decodes");
    RequestPlan::from_job(&envelope.options, &SessionConfig::default()).expect("plan builds")
}

#[test]
fn explicit_header_order_drives_the_wire_with_extras_appended() {
    let plan = plan_from(&format!(
        r#"{{
            "requestId": "order-1",
            "options": {{
                "url": "https://example.com/get",
                "method": "GET",
                "headers": {{"Accept": "*/*", "X-Extra": "1"}},
                "headerOrder": ["accept", "user-agent", "host"],
                "ja3": "{JA3}",
                "userAgent": "{CHROME_UA}"
            }}
        }}"#
    ));

    let wire: Vec<String> = plan
        .headers
        .iter_ordered()
        .iter()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    assert_eq!(wire, vec!["accept", "user-agent", "host", "x-extra"]);
}

#[test]
fn forced_headers_override_job_supplied_values() {
    let plan = plan_from(&format!(
        r#"{{
            "requestId": "forced-1",
            "options": {{
                "url": "https://api.example.net/v1/data",
                "method": "post",
                "headers": {{
                    "Host": "wrong.example",
                    "User-Agent": "definitely-not-a-browser",
                    "Content-Length": "999"
                }},
                "body": "payload",
                "ja3": "{JA3}",
                "userAgent": "{CHROME_UA}"
            }}
        }}"#
    ));

    assert_eq!(plan.method.as_str(), "POST");
    assert_eq!(plan.headers.get("host"), Some("api.example.net"));
    assert_eq!(plan.headers.get("user-agent"), Some(CHROME_UA));
    assert!(plan.headers.get("content-length").is_none());
    assert_eq!(plan.body.as_ref(), b"payload");
}

#[test]
fn ja3_rejection_maps_to_a_400_class_error() {
    let envelope: JobEnvelope = serde_json::from_str(
        r#"{
            "requestId": "bad-ja3",
            "options": {
                "url": "https://example.com",
                "ja3": "not-a-ja3",
                "userAgent": "Mozilla/5.0"
            }
        }"#,
    )
    .expect("envelope decodes");

    let err = RequestPlan::from_job(&envelope.options, &SessionConfig::default())
        .expect_err("bad ja3 must fail");
    assert!(err.to_string().starts_with("JA3_MALFORMED"));
    assert_eq!(err.synthetic_status(), 400);
}

#[test]
fn firefox_jobs_get_the_firefox_pseudo_order() {
    let plan = plan_from(&format!(
        r#"{{
            "requestId": "ff-1",
            "options": {{
                "url": "https://example.com",
                "ja3": "{JA3}",
                "userAgent": "{FIREFOX_UA}"
            }}
        }}"#
    ));

    use PseudoHeader::*;
    assert_eq!(plan.profile.family, BrowserFamily::Firefox);
    assert_eq!(
        plan.headers.pseudo_order(),
        [Method, Path, Authority, Scheme]
    );
}

#[test]
fn default_order_places_user_agent_before_accept_encoding_and_cookie_last() {
    let plan = plan_from(&format!(
        r#"{{
            "requestId": "default-order",
            "options": {{
                "url": "https://example.com",
                "headers": {{"Accept-Encoding": "gzip", "Referer": "https://ref.example"}},
                "cookies": [{{"name": "sid", "value": "abc"}}],
                "ja3": "{JA3}",
                "userAgent": "{CHROME_UA}"
            }}
        }}"#
    ));

    let wire: Vec<String> = plan
        .headers
        .iter_ordered()
        .iter()
        .map(|(name, _)| name.to_lowercase())
        .collect();

    let ua = wire.iter().position(|n| n == "user-agent").unwrap();
    let referer = wire.iter().position(|n| n == "referer").unwrap();
    let encoding = wire.iter().position(|n| n == "accept-encoding").unwrap();
    let cookie = wire.iter().position(|n| n == "cookie").unwrap();
    assert!(ua < referer && referer < encoding && encoding < cookie);
    assert_eq!(plan.headers.get("cookie"), Some("sid=abc"));
}

#[test]
fn reserved_order_as_provided_is_accepted_and_ignored() {
    let plan = plan_from(&format!(
        r#"{{
            "requestId": "reserved",
            "options": {{
                "url": "https://example.com",
                "headers": {{"B-Second": "2", "A-First": "1"}},
                "orderAsProvided": true,
                "ja3": "{JA3}",
                "userAgent": "{CHROME_UA}"
            }}
        }}"#
    ));

    // The flag changes nothing: unordered extras still follow insertion order.
    let wire: Vec<String> = plan
        .headers
        .iter_ordered()
        .iter()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    let b = wire.iter().position(|n| n == "b-second").unwrap();
    let a = wire.iter().position(|n| n == "a-first").unwrap();
    assert!(b < a);
}

#[test]
fn timeout_and_redirect_policy_flow_through() {
    let plan = plan_from(&format!(
        r#"{{
            "requestId": "policy",
            "options": {{
                "url": "https://example.com",
                "timeout": 500,
                "disableRedirect": true,
                "ja3": "{JA3}",
                "userAgent": "{CHROME_UA}"
            }}
        }}"#
    ));
    assert_eq!(plan.timeout.as_millis(), 500);
    assert!(!plan.follow_redirects);
}
