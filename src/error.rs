use std::io;

use thiserror::Error;

// ── Error taxonomy ─────────────────────────────────────────────────
//
//  Error
//  ├── Connection / Timeout / Closed / NotConnected   (connection errors)
//  ├── Redis { kind, message }                        (command errors)
//  ├── Aborted / Usage                                (pipeline & subscription management)
//  └── Protocol / Unknown                             (protocol & translation errors)

/// Structured Redis error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// EXECABORT Transaction discarded because of previous errors
    ExecAbort,
    /// NOSCRIPT No matching script
    NoScript,
    /// BUSY Redis is busy running a script
    Busy,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// NOAUTH / WRONGPASS
    Auth,
    /// Any other Redis error prefix
    Other(String),
}

impl RedisErrorKind {
    /// Classify a Redis error message by its leading word.
    pub fn from_error_msg(msg: &str) -> Self {
        let prefix = msg.split_whitespace().next().unwrap_or("");
        match prefix {
            "ERR" => Self::Err,
            "WRONGTYPE" => Self::WrongType,
            "EXECABORT" => Self::ExecAbort,
            "NOSCRIPT" => Self::NoScript,
            "BUSY" => Self::Busy,
            "READONLY" => Self::ReadOnly,
            "LOADING" => Self::Loading,
            "NOAUTH" | "WRONGPASS" => Self::Auth,
            "" => Self::Other("UNKNOWN".to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

/// All error variants surfaced by the adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP / IO level errors (refused, reset, DNS).
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    /// Malformed RESP data.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// RESP parser needs more data. Control flow only, never surfaced.
    #[error("incomplete RESP message")]
    Incomplete,
    /// The store answered with an error reply.
    #[error("{message}")]
    Redis {
        kind: RedisErrorKind,
        message: String,
    },
    /// Connect or command deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),
    /// The client was quit or disconnected.
    #[error("Connection is closed.")]
    Closed,
    /// A command was issued before `connect()` without lazy connect.
    #[error("Connection is not open; call connect() first or enable lazy_connect")]
    NotConnected,
    /// A batch or subscription change could not be carried out.
    #[error("{0}")]
    Aborted(String),
    /// Invalid argument or option.
    #[error("invalid usage: {0}")]
    Usage(String),
    /// Fallback produced by the result translator for shapeless failures.
    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// Create a Redis error from a raw error message, auto-parsing the kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = RedisErrorKind::from_error_msg(&message);
        Self::Redis { kind, message }
    }

    /// The Redis error kind, when this is a command error.
    pub fn redis_kind(&self) -> Option<&RedisErrorKind> {
        match self {
            Self::Redis { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// True for failures of the link itself rather than of one command.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Closed | Self::NotConnected
        )
    }
}

// io::Error is not Clone; the copy keeps its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Self::Connection(e) => Self::Connection(io::Error::new(e.kind(), e.to_string())),
            Self::Protocol(s) => Self::Protocol(s.clone()),
            Self::Incomplete => Self::Incomplete,
            Self::Redis { kind, message } => Self::Redis {
                kind: kind.clone(),
                message: message.clone(),
            },
            Self::Timeout(s) => Self::Timeout(s.clone()),
            Self::Closed => Self::Closed,
            Self::NotConnected => Self::NotConnected,
            Self::Aborted(s) => Self::Aborted(s.clone()),
            Self::Usage(s) => Self::Usage(s.clone()),
            Self::Unknown(s) => Self::Unknown(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_err() {
        assert_eq!(
            RedisErrorKind::from_error_msg("ERR unknown command 'FOO'"),
            RedisErrorKind::Err
        );
    }

    #[test]
    fn kind_wrongtype() {
        assert_eq!(
            RedisErrorKind::from_error_msg("WRONGTYPE Operation against a key holding the wrong kind of value"),
            RedisErrorKind::WrongType
        );
    }

    #[test]
    fn kind_execabort() {
        assert_eq!(
            RedisErrorKind::from_error_msg("EXECABORT Transaction discarded because of previous errors."),
            RedisErrorKind::ExecAbort
        );
    }

    #[test]
    fn kind_auth() {
        assert_eq!(RedisErrorKind::from_error_msg("NOAUTH Authentication required."), RedisErrorKind::Auth);
        assert_eq!(RedisErrorKind::from_error_msg("WRONGPASS invalid username-password pair"), RedisErrorKind::Auth);
    }

    #[test]
    fn kind_other_and_empty() {
        assert_eq!(
            RedisErrorKind::from_error_msg("CUSTOMPREFIX something happened"),
            RedisErrorKind::Other("CUSTOMPREFIX".to_string())
        );
        assert_eq!(
            RedisErrorKind::from_error_msg(""),
            RedisErrorKind::Other("UNKNOWN".to_string())
        );
    }

    #[test]
    fn redis_error_keeps_raw_message() {
        let err = Error::redis("ERR value is not an integer or out of range");
        assert_eq!(err.to_string(), "ERR value is not an integer or out of range");
        assert_eq!(err.redis_kind(), Some(&RedisErrorKind::Err));
    }

    #[test]
    fn display_variants() {
        let err = Error::Connection(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(err.to_string().contains("connection error"));
        assert_eq!(Error::Protocol("bad".into()).to_string(), "protocol error: bad");
        assert_eq!(Error::Timeout("3s".into()).to_string(), "timeout: 3s");
        assert_eq!(Error::Closed.to_string(), "Connection is closed.");
        assert_eq!(Error::Unknown("Unknown Redis error".into()).to_string(), "Unknown Redis error");
    }

    #[test]
    fn clone_keeps_kind_and_message() {
        let err = Error::Connection(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        match err.clone() {
            Error::Connection(e) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(e.to_string(), "reset");
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = Error::redis("NOSCRIPT missing");
        assert_eq!(err.clone().redis_kind(), Some(&RedisErrorKind::NoScript));
    }

    #[test]
    fn io_error_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::Other, "refused").into();
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.is_connection_error());
        assert!(!Error::redis("ERR x").is_connection_error());
    }
}
