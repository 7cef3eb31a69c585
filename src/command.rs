//! Command records, argument normalisation and the translated reply type.

use std::collections::{BTreeMap, HashMap};

use crate::resp::types::RespValue;
use crate::translate::{flatten_pairs, format_pair_tuple, format_score, parse_score, to_text_sequence};

// ── Reply values ───────────────────────────────────────────────────

/// A translated reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Int(i64),
    Text(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Array of texts, e.g. from `keys` or `smembers`.
    pub fn into_strings(self) -> Option<Vec<String>> {
        self.into_array()?
            .into_iter()
            .map(|v| match v {
                Self::Text(s) => Some(s),
                Self::Int(i) => Some(i.to_string()),
                _ => None,
            })
            .collect()
    }

    fn text_array(items: Vec<String>) -> Self {
        Self::Array(items.into_iter().map(Self::Text).collect())
    }

    /// Shape-free conversion: doubles become score text, booleans become
    /// integers, maps flatten to `[k, v, k, v, …]`.
    pub fn from_resp(reply: RespValue) -> Self {
        match reply {
            RespValue::Null => Self::Nil,
            RespValue::Integer(i) => Self::Int(i),
            RespValue::Boolean(b) => Self::Int(i64::from(b)),
            RespValue::Double(d) => Self::Text(format_score(d)),
            RespValue::SimpleString(s)
            | RespValue::Verbatim(s)
            | RespValue::BigNumber(s)
            | RespValue::Error(s)
            | RespValue::BulkError(s) => Self::Text(s),
            RespValue::BulkString(b) => Self::Text(String::from_utf8_lossy(&b).into_owned()),
            RespValue::Array(items) | RespValue::Set(items) => {
                Self::Array(items.into_iter().map(Self::from_resp).collect())
            }
            RespValue::Map(entries) => Self::Array(
                entries
                    .into_iter()
                    .flat_map(|(k, v)| [Self::from_resp(k), Self::from_resp(v)])
                    .collect(),
            ),
            RespValue::Push { kind, data } => {
                let mut items = Vec::with_capacity(data.len() + 1);
                items.push(Self::Text(kind));
                items.extend(data.into_iter().map(Self::from_resp));
                Self::Array(items)
            }
        }
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, Self::Int(i) if i == other)
    }
}

/// How a command's reply is translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyShape {
    /// Structure kept, nulls preserved.
    #[default]
    Raw,
    /// Scored members flattened to `[member, score, …]`.
    Pairs,
    /// Blocking sorted-set pop: `[key, member, score]` or nil.
    PopTuple,
    /// Texts, nulls as empty text.
    TextList,
    /// A single score, or nil.
    Score,
}

impl ReplyShape {
    pub fn apply(self, reply: RespValue) -> Value {
        match self {
            Self::Raw => Value::from_resp(reply),
            Self::Pairs => Value::text_array(flatten_pairs(&reply)),
            Self::PopTuple => match format_pair_tuple(&reply) {
                Some(tuple) => Value::text_array(tuple.into()),
                None => Value::Nil,
            },
            Self::TextList => Value::text_array(to_text_sequence(&reply)),
            Self::Score => match parse_score(&reply) {
                Some(score) => Value::Text(format_score(score)),
                None => Value::from_resp(reply),
            },
        }
    }
}

// ── Arguments ──────────────────────────────────────────────────────

/// One scalar argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl ArgValue {
    /// Wire text. Infinite floats use the spelling the server accepts.
    pub fn into_arg(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Int(i) => itoa::Buffer::new().format(i).to_string(),
            Self::Float(f) if f == f64::INFINITY => "+inf".to_string(),
            Self::Float(f) if f == f64::NEG_INFINITY => "-inf".to_string(),
            Self::Float(f) => format_score(f),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for ArgValue {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

macro_rules! int_arg {
    ($($t:ty),*) => {
        $(impl From<$t> for ArgValue {
            fn from(i: $t) -> Self {
                Self::Int(i64::from(i))
            }
        })*
    };
}

int_arg!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for ArgValue {
    fn from(i: usize) -> Self {
        match i64::try_from(i) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Str(i.to_string()),
        }
    }
}

impl From<u64> for ArgValue {
    fn from(i: u64) -> Self {
        match i64::try_from(i) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Str(i.to_string()),
        }
    }
}

/// The calling conventions a multi-argument command accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    /// `cmd(a, b, c)`
    Variadic(Vec<ArgValue>),
    /// `cmd([a, b, c])`
    List(Vec<ArgValue>),
    /// `cmd({field: value, …})`
    Object(Vec<(String, ArgValue)>),
}

impl CallArgs {
    pub fn variadic<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ArgValue>,
    {
        Self::Variadic(args.into_iter().map(Into::into).collect())
    }

    pub fn list<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ArgValue>,
    {
        Self::List(args.into_iter().map(Into::into).collect())
    }

    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ArgValue>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Positional form; objects expand to `field value field value …`.
    pub fn normalize(self) -> Vec<String> {
        match self {
            Self::Variadic(args) | Self::List(args) => args.into_iter().map(ArgValue::into_arg).collect(),
            Self::Object(entries) => {
                let mut out = Vec::with_capacity(entries.len() * 2);
                for (field, value) in entries {
                    out.push(field);
                    out.push(value.into_arg());
                }
                out
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Variadic(args) | Self::List(args) => args.is_empty(),
            Self::Object(entries) => entries.is_empty(),
        }
    }
}

impl From<&[&str]> for CallArgs {
    fn from(args: &[&str]) -> Self {
        Self::list(args.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for CallArgs {
    fn from(args: [&str; N]) -> Self {
        Self::list(args)
    }
}

impl From<Vec<&str>> for CallArgs {
    fn from(args: Vec<&str>) -> Self {
        Self::list(args)
    }
}

impl From<Vec<String>> for CallArgs {
    fn from(args: Vec<String>) -> Self {
        Self::list(args)
    }
}

impl From<Vec<ArgValue>> for CallArgs {
    fn from(args: Vec<ArgValue>) -> Self {
        Self::List(args)
    }
}

impl From<&[(&str, &str)]> for CallArgs {
    fn from(entries: &[(&str, &str)]) -> Self {
        Self::object(entries.iter().copied())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for CallArgs {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self::object(entries)
    }
}

impl From<Vec<(String, String)>> for CallArgs {
    fn from(entries: Vec<(String, String)>) -> Self {
        Self::object(entries)
    }
}

impl From<HashMap<String, String>> for CallArgs {
    fn from(entries: HashMap<String, String>) -> Self {
        Self::object(entries)
    }
}

impl From<BTreeMap<String, String>> for CallArgs {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self::object(entries)
    }
}

// ── Command record ─────────────────────────────────────────────────

/// A command queued or dispatched: name, positional arguments and the
/// translation its reply gets.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub shape: ReplyShape,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            shape: ReplyShape::Raw,
        }
    }

    pub fn arg(mut self, arg: impl Into<ArgValue>) -> Self {
        let value: ArgValue = arg.into();
        self.args.push(value.into_arg());
        self
    }

    pub fn args(mut self, args: impl Into<CallArgs>) -> Self {
        let args: CallArgs = args.into();
        self.args.extend(args.normalize());
        self
    }

    pub fn shape(mut self, shape: ReplyShape) -> Self {
        self.shape = shape;
        self
    }

    /// Full argument vector as sent to the driver.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.name.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calling_conventions_normalise_alike() {
        let variadic = CallArgs::variadic(["f1", "v1", "f2", "v2"]).normalize();
        let list = CallArgs::from(vec!["f1", "v1", "f2", "v2"]).normalize();
        let object = CallArgs::from([("f1", "v1"), ("f2", "v2")]).normalize();
        assert_eq!(variadic, list);
        assert_eq!(list, object);
    }

    #[test]
    fn scalar_arguments() {
        assert_eq!(ArgValue::from(42).into_arg(), "42");
        assert_eq!(ArgValue::from(-7i64).into_arg(), "-7");
        assert_eq!(ArgValue::from(1.5).into_arg(), "1.5");
        assert_eq!(ArgValue::from(3.0).into_arg(), "3");
        assert_eq!(ArgValue::from(f64::INFINITY).into_arg(), "+inf");
        assert_eq!(ArgValue::from(f64::NEG_INFINITY).into_arg(), "-inf");
        assert_eq!(ArgValue::from(u64::MAX).into_arg(), u64::MAX.to_string());
    }

    #[test]
    fn mixed_list() {
        let args = CallArgs::from(vec![ArgValue::from(1), ArgValue::from("a"), ArgValue::from(2.5), "b".into()]);
        assert_eq!(args.normalize(), ["1", "a", "2.5", "b"]);
    }

    #[test]
    fn command_builder() {
        let cmd = Command::new("ZADD").arg("z").args(vec![ArgValue::from(1), "m".into()]);
        assert_eq!(cmd.argv(), ["ZADD", "z", "1", "m"]);
        assert_eq!(cmd.shape, ReplyShape::Raw);
        assert_eq!(Command::new("KEYS").shape(ReplyShape::TextList).shape, ReplyShape::TextList);
    }

    #[test]
    fn raw_translation() {
        assert_eq!(Value::from_resp(RespValue::status("OK")), "OK");
        assert_eq!(Value::from_resp(RespValue::Integer(3)), 3i64);
        assert_eq!(Value::from_resp(RespValue::Boolean(true)), 1i64);
        assert_eq!(Value::from_resp(RespValue::Double(2.0)), "2");
        assert!(Value::from_resp(RespValue::Null).is_nil());
        let map = RespValue::Map(vec![(RespValue::bulk("f"), RespValue::bulk("v"))]);
        assert_eq!(
            Value::from_resp(map),
            Value::Array(vec![Value::Text("f".into()), Value::Text("v".into())])
        );
    }

    #[test]
    fn raw_keeps_nulls_in_arrays() {
        let reply = RespValue::Array(vec![RespValue::bulk("a"), RespValue::Null]);
        assert_eq!(
            ReplyShape::Raw.apply(reply),
            Value::Array(vec![Value::Text("a".into()), Value::Nil])
        );
    }

    #[test]
    fn shaped_translation() {
        let reply = RespValue::Array(vec![RespValue::bulk("m"), RespValue::bulk("2")]);
        assert_eq!(ReplyShape::Pairs.apply(reply).into_strings().unwrap(), ["m", "2"]);

        assert!(ReplyShape::PopTuple.apply(RespValue::Null).is_nil());

        let reply = RespValue::Array(vec![RespValue::bulk("a"), RespValue::Null]);
        assert_eq!(ReplyShape::TextList.apply(reply).into_strings().unwrap(), ["a", ""]);

        assert_eq!(ReplyShape::Score.apply(RespValue::bulk("inf")), "Infinity");
        assert!(ReplyShape::Score.apply(RespValue::Null).is_nil());
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Text("12".into()).as_int(), Some(12));
        assert_eq!(Value::Int(5).as_str(), None);
        let arr = Value::Array(vec![Value::Int(1), Value::Text("x".into())]);
        assert_eq!(arr.as_array().map(<[Value]>::len), Some(2));
        assert_eq!(arr.into_strings().unwrap(), ["1", "x"]);
    }
}
