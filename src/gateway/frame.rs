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

//! Outbound frame encoding.
//!
//! Wire layout (all integers big-endian):
//!
//! ```text
//! frame := reqIdLen(u16) reqId typeLen(u16) type payload
//!
//! response := status(u16) hdrCount(u16)
//!             { nameLen(u16) name valueCount(u16) { valueLen(u16) value }* }*
//! data     := bodyLen(u64) body
//! end      := (empty)
//! error    := status(u16) msgLen(u16) msg
//! ```
//!
//! Every length prefix is the true byte length of what follows. That
//! includes the error message length, which earlier gateways famously
//! wrote as the request-id length.

use bytes::BufMut;

fn frame_prefix(request_id: &str, frame_type: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + request_id.len() + frame_type.len());
    buf.put_u16(request_id.len() as u16);
    buf.put_slice(request_id.as_bytes());
    buf.put_u16(frame_type.len() as u16);
    buf.put_slice(frame_type.as_bytes());
    buf
}

/// `response` frame: status + the full header multimap in server order,
/// duplicates preserved.
pub fn response_frame(request_id: &str, status: u16, headers: &[(String, Vec<String>)]) -> Vec<u8> {
    let mut buf = frame_prefix(request_id, "response");
    buf.put_u16(status);
    buf.put_u16(headers.len() as u16);
    for (name, values) in headers {
        buf.put_u16(name.len() as u16);
        buf.put_slice(name.as_bytes());
        buf.put_u16(values.len() as u16);
        for value in values {
            buf.put_u16(value.len() as u16);
            buf.put_slice(value.as_bytes());
        }
    }
    buf
}

/// `data` frame: the decoded body in one chunk.
pub fn data_frame(request_id: &str, body: &[u8]) -> Vec<u8> {
    let mut buf = frame_prefix(request_id, "data");
    buf.put_u64(body.len() as u64);
    buf.put_slice(body);
    buf
}

/// `end` frame: closes a request-id's sequence.
pub fn end_frame(request_id: &str) -> Vec<u8> {
    frame_prefix(request_id, "end")
}

/// `error` frame: synthetic status + message. The length prefix is the
/// message's length, not the request-id's. Messages are clamped to the
/// u16 prefix so the frame never lies about what follows.
pub fn error_frame(request_id: &str, status: u16, message: &str) -> Vec<u8> {
    let mut end = message.len().min(u16::MAX as usize);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let message = &message[..end];

    let mut buf = frame_prefix(request_id, "error");
    buf.put_u16(status);
    buf.put_u16(message.len() as u16);
    buf.put_slice(message.as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(buf: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([buf[at], buf[at + 1]])
    }

    #[test]
    fn prefix_lengths_match_the_bytes_that_follow() {
        let buf = end_frame("req-42");
        assert_eq!(read_u16(&buf, 0), 6);
        assert_eq!(&buf[2..8], b"req-42");
        assert_eq!(read_u16(&buf, 8), 3);
        assert_eq!(&buf[10..13], b"end");
        assert_eq!(buf.len(), 13);
    }

    #[test]
    fn response_frame_encodes_header_multimap() {
        let headers = vec![
            ("Content-Type".to_string(), vec!["text/html".to_string()]),
            (
                "Set-Cookie".to_string(),
                vec!["a=1".to_string(), "b=2".to_string()],
            ),
        ];
        let buf = response_frame("r", 200, &headers);

        let mut at = 0;
        assert_eq!(read_u16(&buf, at), 1);
        at += 2 + 1;
        assert_eq!(read_u16(&buf, at), 8); // "response"
        at += 2 + 8;
        assert_eq!(read_u16(&buf, at), 200);
        at += 2;
        assert_eq!(read_u16(&buf, at), 2); // header count
        at += 2;

        assert_eq!(read_u16(&buf, at), 12); // "Content-Type"
        at += 2;
        assert_eq!(&buf[at..at + 12], b"Content-Type");
        at += 12;
        assert_eq!(read_u16(&buf, at), 1); // one value
        at += 2;
        assert_eq!(read_u16(&buf, at), 9);
        at += 2 + 9;

        assert_eq!(read_u16(&buf, at), 10); // "Set-Cookie"
        at += 2 + 10;
        assert_eq!(read_u16(&buf, at), 2); // duplicate values preserved
    }

    #[test]
    fn data_frame_uses_u64_body_length() {
        let body = vec![0xabu8; 300];
        let buf = data_frame("id", &body);
        let at = 2 + 2 + 4 + 2; // reqIdLen + "id" + typeLen + "data"
        let len = u64::from_be_bytes(buf[at..at + 8].try_into().unwrap());
        assert_eq!(len, 300);
        assert_eq!(buf.len(), at + 8 + 300);
    }

    #[test]
    fn error_frame_length_is_the_message_length() {
        // request id and message lengths differ on purpose
        let buf = error_frame("abcdef", 408, "TIMEOUT: deadline exceeded");
        let msg = "TIMEOUT: deadline exceeded";

        let mut at = 0;
        assert_eq!(read_u16(&buf, at), 6);
        at += 2 + 6;
        assert_eq!(read_u16(&buf, at), 5); // "error"
        at += 2 + 5;
        assert_eq!(read_u16(&buf, at), 408);
        at += 2;
        assert_eq!(read_u16(&buf, at) as usize, msg.len());
        at += 2;
        assert_eq!(&buf[at..], msg.as_bytes());
    }

    #[test]
    fn empty_body_data_frame_is_well_formed() {
        let buf = data_frame("x", b"");
        let at = 2 + 1 + 2 + 4;
        let len = u64::from_be_bytes(buf[at..at + 8].try_into().unwrap());
        assert_eq!(len, 0);
        assert_eq!(buf.len(), at + 8);
    }
}
