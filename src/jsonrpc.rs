// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC framing: `Content-Length: <N>\r\n\r\n<N bytes>`.
//!
//! The reader works over any blocking byte source. Malformed framing is a
//! `Framing` error; what to do with it depends on the source. The stdin
//! loop treats it as fatal (the editor is gone, nobody will resend), any
//! other reader surfaces it to its caller.

use crate::error::{Result, SemindexError};
use serde::Deserialize;
use std::io::{Read, Write};

const CONTENT_LENGTH: &str = "Content-Length: ";

fn framing_error(message: impl Into<String>) -> SemindexError {
    SemindexError::Framing(message.into())
}

fn read_byte(reader: &mut impl Read) -> Result<u8> {
    let mut byte = [0u8; 1];
    match reader.read_exact(&mut byte) {
        Ok(()) => Ok(byte[0]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(framing_error("unexpected end of input"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read one framed body. Returns the raw bytes between the header and the
/// next frame.
pub fn read_content(reader: &mut impl Read) -> Result<Vec<u8>> {
    // Header line, terminated by CRLF.
    let mut header = Vec::new();
    loop {
        let byte = read_byte(reader)?;
        if byte == b'\n' {
            if header.last() != Some(&b'\r') {
                return Err(framing_error("header line not terminated by \\r\\n"));
            }
            header.pop();
            break;
        }
        header.push(byte);
        if header.len() > 256 {
            return Err(framing_error("header line too long"));
        }
    }

    let header = std::str::from_utf8(&header)
        .map_err(|_| framing_error("header line is not valid UTF-8"))?;
    let digits = header
        .strip_prefix(CONTENT_LENGTH)
        .ok_or_else(|| framing_error(format!("expected Content-Length header, got {:?}", header)))?;
    let content_length: usize = digits
        .trim()
        .parse()
        .map_err(|_| framing_error(format!("invalid content length {:?}", digits)))?;

    // The empty line separating header from body.
    if read_byte(reader)? != b'\r' || read_byte(reader)? != b'\n' {
        return Err(framing_error("expected \\r\\n before body"));
    }

    let mut body = vec![0u8; content_length];
    reader
        .read_exact(&mut body)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => framing_error("body shorter than Content-Length"),
            _ => SemindexError::Io(e),
        })?;
    Ok(body)
}

/// Emit one framed body. No other headers are produced.
pub fn write_content(writer: &mut impl Write, body: &[u8]) -> Result<()> {
    write!(writer, "{}{}\r\n\r\n", CONTENT_LENGTH, body.len())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// A parsed JSON-RPC message envelope. `params` stays opaque for the
/// request layer to interpret.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// Read and validate one message. A body that is not a `"jsonrpc":"2.0"`
/// envelope with a method is a framing error; an unknown method is the
/// caller's protocol decision, not ours.
pub fn read_message(reader: &mut impl Read) -> Result<JsonRpcMessage> {
    let body = read_content(reader)?;
    let message: JsonRpcMessage = serde_json::from_slice(&body)
        .map_err(|e| framing_error(format!("body is not a JSON-RPC message: {}", e)))?;
    if message.jsonrpc != "2.0" {
        return Err(framing_error(format!(
            "unsupported jsonrpc version {:?}",
            message.jsonrpc
        )));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(bytes: &[u8]) -> Result<Vec<u8>> {
        read_content(&mut Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn reads_exact_body() {
        assert_eq!(read(b"Content-Length: 4\r\n\r\nabcd").unwrap(), b"abcd");
        assert_eq!(read(b"Content-Length: 0\r\n\r\n").unwrap(), b"");
        assert_eq!(read(b"Content-Length: 1\r\n\r\na").unwrap(), b"a");
    }

    #[test]
    fn truncated_body_is_a_framing_error() {
        assert!(matches!(
            read(b"Content-Length: 5\r\n\r\nab"),
            Err(SemindexError::Framing(_))
        ));
    }

    #[test]
    fn garbage_header_is_a_framing_error() {
        assert!(matches!(read(b"ggg"), Err(SemindexError::Framing(_))));
        assert!(matches!(
            read(b"Content-Type: 4\r\n\r\nabcd"),
            Err(SemindexError::Framing(_))
        ));
        assert!(matches!(
            read(b"Content-Length: x\r\n\r\n"),
            Err(SemindexError::Framing(_))
        ));
        assert!(matches!(
            read(b"Content-Length: 0\r\n"),
            Err(SemindexError::Framing(_))
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let bodies: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"x".to_vec(),
            br#"{"jsonrpc":"2.0","method":"initialize"}"#.to_vec(),
            vec![0xE2, 0x98, 0x83], // multi-byte UTF-8
        ];
        for body in bodies {
            let mut buffer = Vec::new();
            write_content(&mut buffer, &body).unwrap();
            assert_eq!(read(&buffer).unwrap(), body);
        }
    }

    #[test]
    fn consecutive_frames_parse_in_order() {
        let mut buffer = Vec::new();
        write_content(&mut buffer, b"one").unwrap();
        write_content(&mut buffer, b"two").unwrap();
        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_content(&mut cursor).unwrap(), b"one");
        assert_eq!(read_content(&mut cursor).unwrap(), b"two");
    }

    #[test]
    fn message_requires_jsonrpc_two_point_zero() {
        let mut buffer = Vec::new();
        write_content(&mut buffer, br#"{"jsonrpc":"2.0","method":"m"}"#).unwrap();
        let message = read_message(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(message.method, "m");

        let mut buffer = Vec::new();
        write_content(&mut buffer, br#"{"jsonrpc":"1.0","method":"m"}"#).unwrap();
        assert!(matches!(
            read_message(&mut Cursor::new(buffer)),
            Err(SemindexError::Framing(_))
        ));
    }
}
