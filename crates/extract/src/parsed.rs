use serde::Serialize;
use std::fmt;

/// Why a parser substituted its default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    EmptyResponse,
    NoJsonObject,
    MalformedJson,
    MissingArrays,
    NoValidNodes,
    NoValidEdges,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackReason::EmptyResponse => "empty response",
            FallbackReason::NoJsonObject => "no JSON object found",
            FallbackReason::MalformedJson => "malformed JSON",
            FallbackReason::MissingArrays => "missing nodes or links array",
            FallbackReason::NoValidNodes => "no valid nodes",
            FallbackReason::NoValidEdges => "no valid edges",
        };
        f.write_str(s)
    }
}

/// Outcome of a total parser: either the parsed value or a default
/// substituted for unusable model output.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Fallback { value: T, reason: FallbackReason },
}

impl<T> Parsed<T> {
    pub fn fallback(value: T, reason: FallbackReason) -> Self {
        Parsed::Fallback { value, reason }
    }

    pub fn value(&self) -> &T {
        match self {
            Parsed::Value(value) | Parsed::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Parsed::Value(value) | Parsed::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Parsed::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Parsed::Value(_) => None,
            Parsed::Fallback { reason, .. } => Some(*reason),
        }
    }
}
