//! Conversions from driver reply shapes to the flat, text-oriented shapes
//! callers expect, plus error normalisation.

use crate::error::Error;
use crate::resp::types::RespValue;

/// Message carried by errors that arrive without one.
pub const FALLBACK_MESSAGE: &str = "Unknown Redis error";

/// Render a score the way callers expect to read it back.
///
/// Integral values have no decimal point, non-finite values are spelled
/// out, everything else uses the shortest text that parses back exactly.
pub fn format_score(score: f64) -> String {
    if score.is_nan() {
        "NaN".to_string()
    } else if score.is_infinite() {
        let text = if score > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if score == 0.0 {
        // covers -0
        "0".to_string()
    } else {
        score.to_string()
    }
}

/// Parse a score from a reply element (`"1.5"`, `"inf"`, `"-inf"`, RESP3 double).
pub fn parse_score(value: &RespValue) -> Option<f64> {
    match value {
        RespValue::Double(d) => Some(*d),
        RespValue::Integer(i) => Some(*i as f64),
        other => other.as_str()?.trim().parse().ok(),
    }
}

/// Score element as text; unparseable text is passed through as-is.
fn score_text(value: &RespValue) -> String {
    match parse_score(value) {
        Some(score) => format_score(score),
        None => element_text(value).unwrap_or_default(),
    }
}

/// Element as text. Binary data is decoded lossily.
pub fn element_text(value: &RespValue) -> Option<String> {
    match value {
        RespValue::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
        RespValue::SimpleString(s) | RespValue::Verbatim(s) | RespValue::BigNumber(s) => Some(s.clone()),
        RespValue::Integer(i) => Some(i.to_string()),
        RespValue::Double(d) => Some(format_score(*d)),
        _ => None,
    }
}

/// Flatten a scored reply into `[member, score, member, score, …]`.
///
/// Accepts `[[member, score], …]` (RESP3), a flat alternating array
/// (RESP2) or a map. Anything else gives an empty sequence.
pub fn flatten_pairs(reply: &RespValue) -> Vec<String> {
    match reply {
        RespValue::Map(entries) => entries
            .iter()
            .flat_map(|(member, score)| [element_text(member).unwrap_or_default(), score_text(score)])
            .collect(),
        RespValue::Array(items) | RespValue::Set(items) => {
            let nested = !items.is_empty()
                && items
                    .iter()
                    .all(|item| matches!(item, RespValue::Array(pair) if pair.len() == 2));
            if nested {
                items
                    .iter()
                    .filter_map(|item| match item {
                        RespValue::Array(pair) => Some(pair),
                        _ => None,
                    })
                    .flat_map(|pair| [element_text(&pair[0]).unwrap_or_default(), score_text(&pair[1])])
                    .collect()
            } else {
                items
                    .chunks(2)
                    .flat_map(|chunk| match chunk {
                        [member, score] => vec![element_text(member).unwrap_or_default(), score_text(score)],
                        [member] => vec![element_text(member).unwrap_or_default()],
                        _ => Vec::new(),
                    })
                    .collect()
            }
        }
        _ => Vec::new(),
    }
}

/// `(key, member, score)` from a blocking sorted-set pop.
///
/// `None` for a null reply or anything that is not a 3-element sequence.
pub fn format_pair_tuple(reply: &RespValue) -> Option<[String; 3]> {
    let items = match reply {
        RespValue::Array(items) | RespValue::Set(items) => items,
        _ => return None,
    };
    match &items[..] {
        [key, member, score] => Some([
            element_text(key).unwrap_or_default(),
            element_text(member).unwrap_or_default(),
            score_text(score),
        ]),
        _ => None,
    }
}

/// Text for each element, nulls as empty text so positions line up with
/// the caller's key list.
pub fn to_text_sequence(reply: &RespValue) -> Vec<String> {
    match reply {
        RespValue::Array(items) | RespValue::Set(items) => {
            items.iter().map(|item| element_text(item).unwrap_or_default()).collect()
        }
        _ => Vec::new(),
    }
}

/// A failure in whatever shape the driver produced it.
#[derive(Debug)]
pub enum Fault {
    /// Already one of ours.
    Error(Error),
    /// A reply frame; error frames carry a message.
    Reply(RespValue),
    /// Bare text with no error structure.
    Text(String),
    /// Nothing usable.
    Opaque,
}

impl From<Error> for Fault {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

impl From<RespValue> for Fault {
    fn from(reply: RespValue) -> Self {
        Self::Reply(reply)
    }
}

/// Normalise any failure into an [`Error`].
///
/// Typed errors pass through untouched. An error frame with a non-empty
/// message keeps that message; everything else becomes the fallback.
pub fn translate_error(fault: impl Into<Fault>) -> Error {
    match fault.into() {
        Fault::Error(err) => err,
        Fault::Reply(reply) => match reply.error_message() {
            Some(msg) if !msg.is_empty() => Error::redis(msg),
            _ => Error::Unknown(FALLBACK_MESSAGE.to_string()),
        },
        Fault::Text(_) | Fault::Opaque => Error::Unknown(FALLBACK_MESSAGE.to_string()),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
