use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::error::{DisqueError, Result};
use crate::protocol::{Command, Reply};

/// Largest bulk string accepted from the wire (512 MB, the server's own limit).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array length accepted from the wire.
const MAX_ARRAY_LEN: usize = 64 * 1024 * 1024;

/// Deepest array nesting accepted from the wire.
const MAX_DEPTH: usize = 32;

/// RESP codec for Disque commands and replies.
///
/// Commands are always encoded as arrays of bulk strings. Replies are decoded
/// one at a time; an incomplete frame leaves the buffer untouched and yields
/// `Ok(None)` so the caller can read more bytes and try again.
///
/// [`decode_reply`](Self::decode_reply) starts from the front of the buffer on
/// every call, so a large reply arriving in many reads is walked once per read.
/// A codec value used through [`next_reply`](Self::next_reply) or [`Decoder`]
/// remembers how far it got into the pending frame and only builds the reply
/// once the frame is complete. It must be fed a single stream whose buffer is
/// only appended to between calls.
///
/// # Wire Format
///
/// ```text
/// +OK\r\n                  status
/// -ERR message\r\n         error
/// :42\r\n                  integer
/// $5\r\nhello\r\n          bulk string ($-1 for null)
/// *2\r\n...                array (*-1 for null)
/// ```
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use disque_common::protocol::{Command, Reply};
/// use disque_common::transport::RespCodec;
///
/// let mut buf = BytesMut::new();
/// RespCodec::encode_command(&Command::new("PING"), &mut buf);
/// assert_eq!(&buf[..], b"*1\r\n$4\r\nPING\r\n");
///
/// let mut input = BytesMut::from(&b"+PONG\r\n"[..]);
/// let reply = RespCodec::decode_reply(&mut input).unwrap();
/// assert_eq!(reply, Some(Reply::status("PONG")));
/// ```
#[derive(Debug, Default, Clone)]
pub struct RespCodec {
    scan: Scan,
}

/// Progress through a frame that has not fully arrived.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Scan {
    /// Offset of the next element header
    offset: usize,
    /// Elements still expected by each open array, outermost first
    open: Vec<i64>,
}

impl RespCodec {
    /// Encodes a command as an array of bulk strings.
    pub fn encode_command(command: &Command, dst: &mut BytesMut) {
        let args = command.args();
        write_header(dst, b'*', (args.len() + 1) as i64);
        write_bulk(dst, command.name().as_bytes());
        for arg in args {
            write_bulk(dst, arg);
        }
    }

    /// Encodes a reply, the way a server writes it.
    pub fn encode_reply(reply: &Reply, dst: &mut BytesMut) {
        match reply {
            Reply::Status(s) => write_line(dst, b'+', s.as_bytes()),
            Reply::Error(e) => write_line(dst, b'-', e.as_bytes()),
            Reply::Integer(n) => write_header(dst, b':', *n),
            Reply::Bulk(Some(b)) => write_bulk(dst, b),
            Reply::Bulk(None) => write_header(dst, b'$', -1),
            Reply::Array(None) => write_header(dst, b'*', -1),
            Reply::Array(Some(items)) => {
                write_header(dst, b'*', items.len() as i64);
                for item in items {
                    Self::encode_reply(item, dst);
                }
            }
        }
    }

    /// Decodes one complete reply from the front of `src`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(reply))` and the consumed bytes removed from `src`
    /// - `Ok(None)` if `src` does not yet hold a complete reply
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the bytes cannot be a valid RESP frame. The
    /// stream cannot be resynchronised after that.
    pub fn decode_reply(src: &mut BytesMut) -> Result<Option<Reply>> {
        match parse(src, 0, 0)? {
            Some((reply, consumed)) => {
                src.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }

    /// Decodes the next reply from a stream buffer, resuming where the last
    /// call on this codec stopped.
    ///
    /// # Errors
    ///
    /// Same as [`decode_reply`](Self::decode_reply).
    pub fn next_reply(&mut self, src: &mut BytesMut) -> Result<Option<Reply>> {
        let Some(len) = scan_frame(src, &mut self.scan)? else {
            return Ok(None);
        };
        self.scan = Scan::default();
        match parse(&src[..len], 0, 0)? {
            Some((reply, consumed)) => {
                src.advance(consumed);
                Ok(Some(reply))
            }
            None => Err(DisqueError::Protocol("frame ended early".to_string())),
        }
    }
}

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = DisqueError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>> {
        self.next_reply(src)
    }
}

impl Encoder<&Command> for RespCodec {
    type Error = DisqueError;

    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<()> {
        Self::encode_command(item, dst);
        Ok(())
    }
}

impl Encoder<&Reply> for RespCodec {
    type Error = DisqueError;

    fn encode(&mut self, item: &Reply, dst: &mut BytesMut) -> Result<()> {
        Self::encode_reply(item, dst);
        Ok(())
    }
}

fn write_header(dst: &mut BytesMut, marker: u8, n: i64) {
    dst.put_u8(marker);
    dst.put_slice(n.to_string().as_bytes());
    dst.put_slice(b"\r\n");
}

fn write_line(dst: &mut BytesMut, marker: u8, line: &[u8]) {
    dst.reserve(line.len() + 3);
    dst.put_u8(marker);
    // CR/LF inside a simple line would split the frame
    dst.extend(line.iter().map(|&b| if b == b'\r' || b == b'\n' { b' ' } else { b }));
    dst.put_slice(b"\r\n");
}

fn write_bulk(dst: &mut BytesMut, data: &[u8]) {
    write_header(dst, b'$', data.len() as i64);
    dst.reserve(data.len() + 2);
    dst.put_slice(data);
    dst.put_slice(b"\r\n");
}

/// Returns the line starting at `pos` (without CRLF) and the offset just past it.
fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..end], pos + end + 2))
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)?
        .parse::<i64>()
        .map_err(|e| DisqueError::Protocol(format!("invalid integer '{}': {}", String::from_utf8_lossy(line), e)))
}

/// Walks element headers from `scan.offset` without building anything.
///
/// Returns the frame length once every open array is filled, or `None` with
/// `scan` left at the first element that has not fully arrived.
fn scan_frame(buf: &[u8], scan: &mut Scan) -> Result<Option<usize>> {
    loop {
        if scan.open.len() > MAX_DEPTH {
            return Err(DisqueError::Protocol(format!("reply nesting deeper than {}", MAX_DEPTH)));
        }
        let Some(&marker) = buf.get(scan.offset) else {
            return Ok(None);
        };
        let Some((line, next)) = read_line(buf, scan.offset + 1) else {
            return Ok(None);
        };

        let end = match marker {
            b'+' | b'-' | b':' => next,
            b'$' => match parse_int(line)? {
                -1 => next,
                len if len < 0 || len as usize > MAX_BULK_LEN => {
                    return Err(DisqueError::Protocol(format!("invalid bulk length {}", len)))
                }
                len => {
                    let end = next + len as usize + 2;
                    if buf.len() < end {
                        return Ok(None);
                    }
                    end
                }
            },
            b'*' => match parse_int(line)? {
                -1 | 0 => next,
                len if len < 0 || len as usize > MAX_ARRAY_LEN => {
                    return Err(DisqueError::Protocol(format!("invalid array length {}", len)))
                }
                len => {
                    scan.open.push(len);
                    scan.offset = next;
                    continue;
                }
            },
            other => {
                return Err(DisqueError::Protocol(format!(
                    "invalid reply type byte 0x{:02x}",
                    other
                )))
            }
        };
        scan.offset = end;

        // A finished element may finish its enclosing arrays too
        loop {
            match scan.open.last_mut() {
                None => return Ok(Some(end)),
                Some(remaining) if *remaining > 1 => {
                    *remaining -= 1;
                    break;
                }
                Some(_) => {
                    scan.open.pop();
                }
            }
        }
    }
}

fn parse(buf: &[u8], pos: usize, depth: usize) -> Result<Option<(Reply, usize)>> {
    if depth > MAX_DEPTH {
        return Err(DisqueError::Protocol(format!("reply nesting deeper than {}", MAX_DEPTH)));
    }
    let Some(&marker) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    match marker {
        b'+' => Ok(Some((Reply::Status(String::from_utf8_lossy(line).into_owned()), next))),
        b'-' => Ok(Some((Reply::Error(String::from_utf8_lossy(line).into_owned()), next))),
        b':' => Ok(Some((Reply::Integer(parse_int(line)?), next))),
        b'$' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Reply::Bulk(None), next)));
            }
            if len < 0 || len as usize > MAX_BULK_LEN {
                return Err(DisqueError::Protocol(format!("invalid bulk length {}", len)));
            }
            let len = len as usize;
            if buf.len() < next + len + 2 {
                return Ok(None);
            }
            if &buf[next + len..next + len + 2] != b"\r\n" {
                return Err(DisqueError::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            let data = Bytes::copy_from_slice(&buf[next..next + len]);
            Ok(Some((Reply::Bulk(Some(data)), next + len + 2)))
        }
        b'*' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Reply::Array(None), next)));
            }
            if len < 0 || len as usize > MAX_ARRAY_LEN {
                return Err(DisqueError::Protocol(format!("invalid array length {}", len)));
            }
            let mut items = Vec::with_capacity((len as usize).min(1024));
            let mut cursor = next;
            for _ in 0..len {
                match parse(buf, cursor, depth + 1)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), cursor)))
        }
        other => Err(DisqueError::Protocol(format!(
            "invalid reply type byte 0x{:02x}",
            other
        ))),
    }
}
