//! Streaming RESP2/RESP3 parser.
//!
//! [`parse`] returns `Ok((value, consumed))`, `Err(Incomplete)` when the
//! buffer holds only part of a frame, or `Err(Protocol(…))` on malformed
//! input. Bulk payloads are zero-copy slices of the input `Bytes`.

use bytes::Bytes;
use memchr::memchr;

use crate::error::{Error, Result};
use crate::resp::types::RespValue;

/// Upper bound on aggregate element counts accepted from the wire.
const MAX_ELEMENTS: i64 = 16_777_216;

/// Upper bound on aggregate nesting.
const MAX_DEPTH: usize = 512;

/// Parse one RESP value from the front of `buf`.
pub fn parse(buf: &Bytes) -> Result<(RespValue, usize)> {
    let mut cursor = Cursor { buf, pos: 0 };
    let value = cursor.value(0)?;
    Ok((value, cursor.pos))
}

/// Parse from a plain slice (copies into `Bytes` first).
pub fn parse_slice(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

struct Cursor<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl Cursor<'_> {
    fn value(&mut self, depth: usize) -> Result<RespValue> {
        if depth > MAX_DEPTH {
            return Err(Error::Protocol("RESP nesting too deep".into()));
        }
        let tag = *self.buf.get(self.pos).ok_or(Error::Incomplete)?;
        self.pos += 1;

        match tag {
            b'+' => Ok(RespValue::SimpleString(self.text_line()?)),
            b'-' => Ok(RespValue::Error(self.text_line()?)),
            b':' => Ok(RespValue::Integer(self.int_line()?)),
            b'(' => {
                let s = self.text_line()?;
                let digits = s.strip_prefix(['+', '-']).unwrap_or(&s);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::Protocol(format!("invalid big number: {s}")));
                }
                Ok(RespValue::BigNumber(s))
            }
            b',' => {
                let s = self.text_line()?;
                Ok(RespValue::Double(parse_double(&s)?))
            }
            b'_' => {
                self.line()?;
                Ok(RespValue::Null)
            }
            b'#' => match self.line()? {
                b"t" => Ok(RespValue::Boolean(true)),
                b"f" => Ok(RespValue::Boolean(false)),
                other => Err(Error::Protocol(format!(
                    "invalid boolean: {}",
                    String::from_utf8_lossy(other)
                ))),
            },
            b'$' => match self.blob()? {
                Some(data) => Ok(RespValue::BulkString(data)),
                None => Ok(RespValue::Null),
            },
            b'!' => {
                let data = self
                    .blob()?
                    .ok_or_else(|| Error::Protocol("negative bulk error length".into()))?;
                Ok(RespValue::BulkError(utf8(&data, "bulk error")?))
            }
            b'=' => {
                let data = self
                    .blob()?
                    .ok_or_else(|| Error::Protocol("negative verbatim length".into()))?;
                if data.len() < 4 || data[3] != b':' {
                    return Err(Error::Protocol("verbatim string missing encoding prefix".into()));
                }
                Ok(RespValue::Verbatim(utf8(&data[4..], "verbatim string")?))
            }
            b'*' => match self.count()? {
                Some(n) => Ok(RespValue::Array(self.elements(n, depth)?)),
                None => Ok(RespValue::Null),
            },
            b'~' => {
                let n = self.required_count("set")?;
                Ok(RespValue::Set(self.elements(n, depth)?))
            }
            b'%' => {
                let n = self.required_count("map")?;
                Ok(RespValue::Map(self.pairs(n, depth)?))
            }
            b'>' => {
                let n = self.required_count("push")?;
                if n == 0 {
                    return Err(Error::Protocol("push frame without kind".into()));
                }
                let mut data = self.elements(n, depth)?;
                let kind = match data.remove(0) {
                    RespValue::SimpleString(s) => s,
                    RespValue::BulkString(b) => utf8(&b, "push kind")?,
                    other => {
                        return Err(Error::Protocol(format!(
                            "push kind must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(RespValue::Push { kind, data })
            }
            b'|' => {
                // Attributes are metadata; the reply is the value after them.
                let n = self.required_count("attribute")?;
                self.pairs(n, depth)?;
                self.value(depth + 1)
            }
            other => Err(Error::Protocol(format!("unknown RESP type byte: 0x{other:02x}"))),
        }
    }

    /// Bytes up to the next CRLF; advances past it.
    fn line(&mut self) -> Result<&[u8]> {
        let start = self.pos;
        let rel = memchr(b'\r', &self.buf[start..]).ok_or(Error::Incomplete)?;
        let cr = start + rel;
        match self.buf.get(cr + 1) {
            None => Err(Error::Incomplete),
            Some(b'\n') => {
                self.pos = cr + 2;
                Ok(&self.buf[start..cr])
            }
            Some(_) => Err(Error::Protocol("expected \\n after \\r".into())),
        }
    }

    fn text_line(&mut self) -> Result<String> {
        let line = self.line()?;
        utf8(line, "line")
    }

    fn int_line(&mut self) -> Result<i64> {
        let line = self.line()?;
        parse_int(line)
    }

    /// `<len>\r\n<data>\r\n`; `None` for a negative length.
    fn blob(&mut self) -> Result<Option<Bytes>> {
        let len = self.int_line()?;
        if len < 0 {
            return Ok(None);
        }
        let start = self.pos;
        let end = start + len as usize;
        if self.buf.len() < end + 2 {
            return Err(Error::Incomplete);
        }
        if &self.buf[end..end + 2] != b"\r\n" {
            return Err(Error::Protocol("bulk payload not terminated by \\r\\n".into()));
        }
        self.pos = end + 2;
        Ok(Some(self.buf.slice(start..end)))
    }

    fn count(&mut self) -> Result<Option<usize>> {
        let n = self.int_line()?;
        if n < 0 {
            return Ok(None);
        }
        if n > MAX_ELEMENTS {
            return Err(Error::Protocol(format!("aggregate too large: {n} elements")));
        }
        Ok(Some(n as usize))
    }

    fn required_count(&mut self, what: &str) -> Result<usize> {
        self.count()?
            .ok_or_else(|| Error::Protocol(format!("negative {what} count")))
    }

    fn elements(&mut self, n: usize, depth: usize) -> Result<Vec<RespValue>> {
        let mut items = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            items.push(self.value(depth + 1)?);
        }
        Ok(items)
    }

    fn pairs(&mut self, n: usize, depth: usize) -> Result<Vec<(RespValue, RespValue)>> {
        let mut pairs = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            let key = self.value(depth + 1)?;
            let value = self.value(depth + 1)?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Protocol(format!("invalid UTF-8 in {what}: {e}")))
}

/// Parse an integer without allocating. Accumulates negatively so
/// `i64::MIN` does not overflow.
fn parse_int(bytes: &[u8]) -> Result<i64> {
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return Err(Error::Protocol("integer has no digits".into()));
    }
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(Error::Protocol(format!("invalid byte in integer: 0x{b:02x}")));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_sub(i64::from(b - b'0')))
            .ok_or_else(|| Error::Protocol("integer overflow".into()))?;
    }
    if negative {
        Ok(n)
    } else {
        n.checked_neg()
            .ok_or_else(|| Error::Protocol("integer overflow".into()))
    }
}

fn parse_double(s: &str) -> Result<f64> {
    match s {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" | "-nan" => Ok(f64::NAN),
        _ => s
            .parse::<f64>()
            .map_err(|e| Error::Protocol(format!("invalid double: {e}"))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
