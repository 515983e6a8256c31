//! STOMP 1.2 frames and the codec that reads and writes them.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use std::str::FromStr;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Ack => "ACK",
            StompCommand::Nack => "NACK",
            StompCommand::Begin => "BEGIN",
            StompCommand::Commit => "COMMIT",
            StompCommand::Abort => "ABORT",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED frames carry their header values unescaped.
    fn escapes_headers(&self) -> bool {
        !matches!(
            self,
            StompCommand::Connect | StompCommand::Stomp | StompCommand::Connected
        )
    }
}

impl Display for StompCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(StompCommand::Connect),
            "STOMP" => Ok(StompCommand::Stomp),
            "CONNECTED" => Ok(StompCommand::Connected),
            "SEND" => Ok(StompCommand::Send),
            "SUBSCRIBE" => Ok(StompCommand::Subscribe),
            "UNSUBSCRIBE" => Ok(StompCommand::Unsubscribe),
            "ACK" => Ok(StompCommand::Ack),
            "NACK" => Ok(StompCommand::Nack),
            "BEGIN" => Ok(StompCommand::Begin),
            "COMMIT" => Ok(StompCommand::Commit),
            "ABORT" => Ok(StompCommand::Abort),
            "DISCONNECT" => Ok(StompCommand::Disconnect),
            "MESSAGE" => Ok(StompCommand::Message),
            "RECEIPT" => Ok(StompCommand::Receipt),
            "ERROR" => Ok(StompCommand::Error),
            other => Err(invalid(format!("Unknown STOMP command: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// First value of a header; repeated headers keep the first occurrence.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

pub fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_header(value: &str) -> io::Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some(other) => return Err(invalid(format!("Undefined escape sequence \\{}", other))),
            None => return Err(invalid("Dangling escape at end of header".to_string())),
        }
    }
    Ok(out)
}

/// Largest frame, headers included, the decoder accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct StompCodec;

impl Encoder<StompFrame> for StompCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: StompFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let escape = frame.command.escapes_headers();
        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in &frame.headers {
            if escape {
                dst.put_slice(escape_header(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape_header(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}

/// Position of the blank line ending the header block and the separator length.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some((i, 2)),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some((i, 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

impl Decoder for StompCodec {
    type Item = StompFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Heart-beats are bare end-of-line sequences between frames.
        loop {
            match src.first() {
                Some(b'\n') => src.advance(1),
                Some(b'\r') if src.get(1) == Some(&b'\n') => src.advance(2),
                _ => break,
            }
        }
        if src.is_empty() {
            return Ok(None);
        }

        let Some((head_len, separator)) = find_header_end(src) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&src[..head_len])
            .map_err(|e| invalid(format!("Frame header is not UTF-8: {}", e)))?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command: StompCommand = lines.next().unwrap_or_default().parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| invalid(format!("Malformed header line: {}", line)))?;
            if escaped {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let body_start = head_len + separator;
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.parse::<usize>()
                    .map_err(|_| invalid(format!("Invalid content-length: {}", v)))
            })
            .transpose()?;

        let (body_len, frame_len) = match content_length {
            Some(len) => {
                let frame_len = body_start
                    .checked_add(len)
                    .and_then(|n| n.checked_add(1))
                    .filter(|n| *n <= MAX_FRAME_LEN)
                    .ok_or_else(|| {
                        invalid(format!("Frame exceeds {} bytes (content-length {})", MAX_FRAME_LEN, len))
                    })?;
                if src.len() < frame_len {
                    src.reserve(frame_len - src.len());
                    return Ok(None);
                }
                if src[body_start + len] != 0 {
                    return Err(invalid("Frame body is not NUL terminated".to_string()));
                }
                (len, frame_len)
            }
            None => match src[body_start..].iter().position(|b| *b == 0) {
                Some(len) => (len, body_start + len + 1),
                None if src.len() > MAX_FRAME_LEN => {
                    return Err(invalid(format!("Frame exceeds {} bytes", MAX_FRAME_LEN)));
                }
                None => return Ok(None),
            },
        };

        let data = src.split_to(frame_len).freeze();
        Ok(Some(StompFrame {
            command,
            headers,
            body: data.slice(body_start..body_start + body_len),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: StompFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        StompCodec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_send_frame_layout() {
        let frame = StompFrame::new(StompCommand::Send)
            .header("destination", "queue:derivatives")
            .header("content-length", "2")
            .body(Bytes::from_static(b"{}"));
        assert_eq!(
            &encode(frame)[..],
            b"SEND\ndestination:queue\\cderivatives\ncontent-length:2\n\n{}\0"
        );
    }

    #[test]
    fn test_connect_headers_are_not_escaped() {
        let frame = StompFrame::new(StompCommand::Connect).header("host", "a:b");
        assert_eq!(&encode(frame)[..], b"CONNECT\nhost:a:b\n\n\0");
    }

    #[test]
    fn test_escape_round_trip() {
        let value = "line1\nline2\r:colon\\slash";
        assert_eq!(unescape_header(&escape_header(value)).unwrap(), value);
        assert!(unescape_header("bad\\t").is_err());
    }

    #[test]
    fn test_decode_with_content_length_allows_nul_in_body() {
        let mut buf = BytesMut::from(&b"\nMESSAGE\ncontent-length:3\nx:1\n\na\0b\0"[..]);
        let frame = StompCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(&frame.body[..], b"a\0b");
        assert_eq!(frame.get_header("x"), Some("1"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let mut buf = BytesMut::from(&b"RECEIPT\nreceipt-id:commit-1\n"[..]);
        assert!(StompCodec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n\0");
        let frame = StompCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Receipt);
        assert_eq!(frame.get_header("receipt-id"), Some("commit-1"));
    }

    #[test]
    fn test_decode_unescapes_and_keeps_first_repeated_header() {
        let mut buf = BytesMut::from(&b"ERROR\r\nmessage:bad\\cthing\r\nmessage:second\r\n\r\n\0"[..]);
        let frame = StompCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.get_header("message"), Some("bad:thing"));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let mut buf = BytesMut::from(&b"PUBLISH\n\n\0"[..]);
        assert!(StompCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_oversized_content_length_is_rejected() {
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:18446744073709551615\n\nabc"[..]);
        let err = StompCodec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut buf = BytesMut::from(format!("MESSAGE\ncontent-length:{}\n\nabc", MAX_FRAME_LEN).as_bytes());
        assert!(StompCodec.decode(&mut buf).is_err());
    }
}
