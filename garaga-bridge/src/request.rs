//! Incoming proof request

use crate::error::BridgeError;
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One backend request for a bound proof
///
/// Every field is optional on the wire. Missing strings read as empty and a
/// missing `tx_context` reads as an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub verifier: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub requested_at_unix: Option<i64>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub tx_context: Map<String, Value>,
}

impl ProofRequest {
    /// Parse a request from raw stdin text
    ///
    /// Blank input is the empty request. Anything other than a JSON object is
    /// rejected.
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(raw)
            .map_err(|err| {
                BridgeError::MalformedInput(format!("stdin is not valid JSON: {}", err))
            })?;
        if !value.is_object() {
            return Err(BridgeError::MalformedInput(
                "stdin JSON must be an object".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|err| BridgeError::MalformedInput(format!("invalid proof request: {}", err)))
    }

    /// JSON written to the prover's context file
    pub fn to_context_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| {
                BridgeError::MalformedInput(format!("unable to encode request: {}", err))
            })
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .to_string()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| {
                D::Error::custom(format!("requested_at_unix must be an integer, got {}", n))
            }),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| {
                D::Error::custom(format!("requested_at_unix must be an integer, got {:?}", s))
            }),
        other => Err(D::Error::custom(format!(
            "requested_at_unix must be an integer, got {}",
            other
        ))),
    }
}

fn lenient_object<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(D::Error::custom(format!("tx_context must be an object, got {}", other))),
    }
}
