//! Closed-vocabulary parsing of supervisor output.
//!
//! The vocabulary is `FINISH` plus the registered worker names. Anything else
//! is a [`MalformedDecision`], which the driver treats as FINISH.

use std::fmt;

use serde_json::Value;

use crate::core::types::{FINISH, RoutingDecision};

/// Supervisor output that does not name exactly one symbol of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedDecision {
    pub raw: String,
    pub reason: &'static str,
}

impl fmt::Display for MalformedDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.reason, self.raw)
    }
}

impl std::error::Error for MalformedDecision {}

/// The routing vocabulary for a registry, `FINISH` first.
pub fn vocabulary<S: AsRef<str>>(members: &[S]) -> Vec<String> {
    std::iter::once(FINISH.to_string())
        .chain(members.iter().map(|m| m.as_ref().to_string()))
        .collect()
}

/// Parse a bare routing symbol.
///
/// Surrounding whitespace and one layer of matching quotes are ignored; the
/// comparison itself is exact.
pub fn parse_symbol<S: AsRef<str>>(
    raw: &str,
    members: &[S],
) -> Result<RoutingDecision, MalformedDecision> {
    let symbol = strip_quotes(raw.trim());
    if symbol.is_empty() {
        return Err(MalformedDecision {
            raw: raw.to_string(),
            reason: "empty routing symbol",
        });
    }
    if symbol == FINISH {
        return Ok(RoutingDecision::Finish);
    }
    if members.iter().any(|m| m.as_ref() == symbol) {
        return Ok(RoutingDecision::worker(symbol));
    }
    Err(MalformedDecision {
        raw: raw.to_string(),
        reason: "symbol outside routing vocabulary",
    })
}

/// Parse structured supervisor output of the form `{"next": "<symbol>"}`.
pub fn parse_route_value<S: AsRef<str>>(
    value: &Value,
    members: &[S],
) -> Result<RoutingDecision, MalformedDecision> {
    match value.get("next") {
        Some(Value::String(next)) => parse_symbol(next, members),
        Some(other) => Err(MalformedDecision {
            raw: other.to_string(),
            reason: "`next` is not a string",
        }),
        None => Err(MalformedDecision {
            raw: value.to_string(),
            reason: "missing `next` field",
        }),
    }
}

/// Parse raw supervisor text: either a JSON route object or a bare symbol.
pub fn parse_decision<S: AsRef<str>>(
    raw: &str,
    members: &[S],
) -> Result<RoutingDecision, MalformedDecision> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => parse_route_value(&value, members),
            Err(_) => Err(MalformedDecision {
                raw: raw.to_string(),
                reason: "invalid route json",
            }),
        };
    }
    parse_symbol(trimmed, members)
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    s
}
