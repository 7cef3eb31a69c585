use bytes::Bytes;

/// A decoded RESP2 / RESP3 reply frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n
    BulkString(Bytes),
    /// *2\r\n…
    Array(Vec<RespValue>),
    /// $-1\r\n, *-1\r\n or _\r\n
    Null,
    /// ,3.14\r\n
    Double(f64),
    /// #t\r\n
    Boolean(bool),
    /// %N\r\n…
    Map(Vec<(RespValue, RespValue)>),
    /// ~N\r\n…
    Set(Vec<RespValue>),
    /// (12345678901234567890\r\n
    BigNumber(String),
    /// !21\r\nSYNTAX invalid syntax\r\n
    BulkError(String),
    /// =15\r\ntxt:Some string\r\n (encoding prefix stripped)
    Verbatim(String),
    /// >N\r\n… out-of-band push (pub/sub deliveries under RESP3)
    Push { kind: String, data: Vec<RespValue> },
}

impl RespValue {
    /// Bulk string from anything byte-like.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    /// Simple status reply, e.g. `OK`.
    pub fn status(s: &str) -> Self {
        Self::SimpleString(s.to_string())
    }

    /// The value as UTF-8 text, when it is textual and valid.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) | Self::Verbatim(s) | Self::BigNumber(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::BulkString(b) => Some(b),
            Self::SimpleString(s) | Self::Verbatim(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Array-like frames (array, set, push payload) as owned elements.
    pub fn into_items(self) -> Option<Vec<RespValue>> {
        match self {
            Self::Array(items) | Self::Set(items) => Some(items),
            Self::Push { kind, mut data } => {
                data.insert(0, Self::SimpleString(kind));
                Some(data)
            }
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for simple and bulk error replies.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::BulkError(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(msg) | Self::BulkError(msg) => Some(msg),
            _ => None,
        }
    }

    /// True for `+OK`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::SimpleString(s) if s == "OK")
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SimpleString(_) => "simple_string",
            Self::Error(_) => "error",
            Self::Integer(_) => "integer",
            Self::BulkString(_) => "bulk_string",
            Self::Array(_) => "array",
            Self::Null => "null",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
            Self::BigNumber(_) => "big_number",
            Self::BulkError(_) => "bulk_error",
            Self::Verbatim(_) => "verbatim_string",
            Self::Push { .. } => "push",
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
