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

use mirage_proxy::gateway::frame::{data_frame, end_frame, error_frame, response_frame};

/// Minimal frame reader mirroring what callers implement: every length
/// prefix must equal the actual byte length that follows.
struct FrameReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn u16(&mut self) -> u16 {
        let value = u16::from_be_bytes([self.buf[self.at], self.buf[self.at + 1]]);
        self.at += 2;
        value
    }

    fn u64(&mut self) -> u64 {
        let value = u64::from_be_bytes(self.buf[self.at..self.at + 8].try_into().unwrap());
        self.at += 8;
        value
    }

    fn bytes(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.buf[self.at..self.at + len];
        self.at += len;
        slice
    }

    fn str(&mut self, len: usize) -> &'a str {
        std::str::from_utf8(self.bytes(len)).expect("utf8")
    }

    fn exhausted(&self) -> bool {
        self.at == self.buf.len()
    }
}

/// Reads the common prefix and returns (request_id, frame_type).
fn read_prefix<'a>(reader: &mut FrameReader<'a>) -> (&'a str, &'a str) {
    let id_len = reader.u16() as usize;
    let request_id = reader.str(id_len);
    let type_len = reader.u16() as usize;
    let frame_type = reader.str(type_len);
    (request_id, frame_type)
}

#[test]
fn response_frame_walks_cleanly_end_to_end() {
    let headers = vec![
        ("Content-Type".to_string(), vec!["application/json".to_string()]),
        (
            "Set-Cookie".to_string(),
            vec!["a=1; Path=/".to_string(), "b=2".to_string()],
        ),
        ("X-Empty".to_string(), vec!["".to_string()]),
    ];
    let buf = response_frame("req-7", 201, &headers);
    let mut reader = FrameReader::new(&buf);

    let (request_id, frame_type) = read_prefix(&mut reader);
    assert_eq!(request_id, "req-7");
    assert_eq!(frame_type, "response");
    assert_eq!(reader.u16(), 201);

    let header_count = reader.u16();
    assert_eq!(header_count, 3);
    let mut seen = Vec::new();
    for _ in 0..header_count {
        let name_len = reader.u16() as usize;
        let name = reader.str(name_len).to_string();
        let value_count = reader.u16();
        let mut values = Vec::new();
        for _ in 0..value_count {
            let value_len = reader.u16() as usize;
            values.push(reader.str(value_len).to_string());
        }
        seen.push((name, values));
    }
    assert_eq!(seen, headers);
    assert!(reader.exhausted());
}

#[test]
fn data_frame_walks_cleanly_with_binary_payload() {
    let body: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
    let buf = data_frame("large", &body);
    let mut reader = FrameReader::new(&buf);

    let (request_id, frame_type) = read_prefix(&mut reader);
    assert_eq!(request_id, "large");
    assert_eq!(frame_type, "data");
    let len = reader.u64() as usize;
    assert_eq!(len, body.len());
    assert_eq!(reader.bytes(len), &body[..]);
    assert!(reader.exhausted());
}

#[test]
fn end_frame_is_prefix_only() {
    let buf = end_frame("done");
    let mut reader = FrameReader::new(&buf);
    let (request_id, frame_type) = read_prefix(&mut reader);
    assert_eq!(request_id, "done");
    assert_eq!(frame_type, "end");
    assert!(reader.exhausted());
}

#[test]
fn error_frame_message_length_is_independent_of_request_id_length() {
    // A short id with a long message, and the other way around: both must
    // carry the message's own length.
    for (request_id, message) in [
        ("x", "TIMEOUT: no complete response within 500ms"),
        ("a-very-long-request-identifier-string", "DNS_FAIL: x"),
    ] {
        let buf = error_frame(request_id, 408, message);
        let mut reader = FrameReader::new(&buf);
        let (read_id, frame_type) = read_prefix(&mut reader);
        assert_eq!(read_id, request_id);
        assert_eq!(frame_type, "error");
        assert_eq!(reader.u16(), 408);
        let msg_len = reader.u16() as usize;
        assert_eq!(msg_len, message.len());
        assert_eq!(reader.str(msg_len), message);
        assert!(reader.exhausted());
    }
}

#[test]
fn frames_for_one_request_form_the_expected_sequence() {
    // response → data → end, each independently parseable: what the writer
    // guarantees at frame granularity.
    let headers = vec![("Server".to_string(), vec!["mirage-test".to_string()])];
    let frames = vec![
        response_frame("seq", 200, &headers),
        data_frame("seq", b"{\"ok\":true}"),
        end_frame("seq"),
    ];

    let mut kinds = Vec::new();
    for buf in &frames {
        let mut reader = FrameReader::new(buf);
        let (request_id, frame_type) = read_prefix(&mut reader);
        assert_eq!(request_id, "seq");
        kinds.push(frame_type.to_string());
    }
    assert_eq!(kinds, vec!["response", "data", "end"]);
}
