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

use mirage_proxy::tls::clienthello::{build, ja3_of};
use mirage_proxy::tls::fingerprint::{calculate_ja3, validate_spec};
use mirage_proxy::tls::ja3::HandshakeSpec;
use mirage_proxy::tls::plan::TlsClientPlan;

/// Real browser JA3 strings captured in the wild.
const CHROME_119: &str =
    "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513,29-23-24,0";
const CHROME_PADDED: &str =
    "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0";
const FIREFOX_102: &str =
    "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28-21,29-23-24-25-256-257,0";
const SAFARI_16: &str =
    "771,4865-4866-4867-49196-49195-52393-49200-49199-52392-49162-49161-49172-49171-157-156-53-47-49160-49170-10,0-23-65281-10-11-16-5-13-18-51-45-43-27,29-23-24-25,1-0";

#[test]
fn ja3_round_trip_holds_for_real_browser_strings() {
    for (label, ja3) in [
        ("chrome", CHROME_119),
        ("chrome padded", CHROME_PADDED),
        ("firefox", FIREFOX_102),
        ("safari", SAFARI_16),
    ] {
        let spec = HandshakeSpec::parse(ja3).unwrap_or_else(|err| panic!("{label}: {err}"));
        let hello = build(&spec, "target.example", &[]).unwrap_or_else(|err| panic!("{label}: {err}"));
        let extracted = ja3_of(&hello).unwrap_or_else(|err| panic!("{label}: {err}"));

        assert_eq!(extracted.ja3_string(), ja3, "{label}: string round trip");
        assert_eq!(
            calculate_ja3(&extracted),
            calculate_ja3(&spec),
            "{label}: hash round trip"
        );
        assert!(validate_spec(&extracted, &calculate_ja3(&spec)), "{label}");
    }
}

#[test]
fn assembled_hello_is_a_plausible_tls_record() {
    let spec = HandshakeSpec::parse(CHROME_119).expect("valid ja3");
    let hello = build(&spec, "example.com", &[]).expect("assembles");

    // record header: handshake record, legacy TLS 1.0 record version
    assert_eq!(hello[0], 0x16);
    assert_eq!(&hello[1..3], &[0x03, 0x01]);
    // record length prefix covers exactly the rest of the record
    let record_len = u16::from_be_bytes([hello[3], hello[4]]) as usize;
    assert_eq!(record_len, hello.len() - 5);
    // ClientHello handshake type and matching handshake length
    assert_eq!(hello[5], 0x01);
    let hs_len =
        ((hello[6] as usize) << 16) | ((hello[7] as usize) << 8) | hello[8] as usize;
    assert_eq!(hs_len, hello.len() - 9);
}

#[test]
fn malformed_ja3_strings_are_rejected_with_the_right_kind() {
    for bad in [
        "not-a-ja3",
        "",
        "771",
        "771,4865,0,29",
        "771,4865,0,29,0,junk",
        "771,0x1301,0,29,0",
        "771,99999,0,29,0",
    ] {
        let err = HandshakeSpec::parse(bad).expect_err(bad);
        assert!(err.to_string().starts_with("JA3_MALFORMED"), "{bad}");
        assert_eq!(err.synthetic_status(), 400, "{bad}");
    }
}

#[test]
fn plan_materializes_spec_ordering_into_rustls_config() {
    let spec = HandshakeSpec::parse(CHROME_119).expect("valid ja3");
    let plan = TlsClientPlan::from_spec(&spec);

    assert_eq!(plan.ja3_hash(), calculate_ja3(&spec));
    assert_eq!(
        plan.alpn_protocols(),
        &[b"h2".to_vec(), b"http/1.1".to_vec()]
    );

    let config = plan.client_config().expect("materializes");
    assert_eq!(config.alpn_protocols, plan.alpn_protocols());

    let http1_only = plan.clone_with_alpn(vec![b"http/1.1".to_vec()]);
    let config = http1_only.client_config().expect("materializes");
    assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
}

#[test]
fn fresh_randomness_never_disturbs_the_fingerprint() {
    let spec = HandshakeSpec::parse(FIREFOX_102).expect("valid ja3");
    let hashes: Vec<String> = (0..8)
        .map(|_| {
            let hello = build(&spec, "example.org", &[]).expect("assembles");
            calculate_ja3(&ja3_of(&hello).expect("extracts"))
        })
        .collect();
    assert!(hashes.windows(2).all(|pair| pair[0] == pair[1]));
}
