//! Field element codec
//!
//! Every felt that leaves the bridge is reduced into `[0, P)` and rendered as
//! lowercase hex with a `0x` prefix, regardless of how the producing tool
//! encoded it.

use crate::error::ArtifactError;
use crate::Result;
use num_bigint::{BigInt, BigUint, Sign};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Field modulus `P = 2^251 + 17 * 2^192 + 1`
pub fn field_prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| {
        (BigUint::from(1u8) << 251usize) + (BigUint::from(17u8) << 192usize) + BigUint::from(1u8)
    })
}

/// Integer canonically reduced modulo the field prime
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(BigUint);

impl FieldElement {
    /// The zero element, used to pad short public-input vectors
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    /// Reduce an unsigned integer into the field
    pub fn from_biguint(value: BigUint) -> Self {
        Self(value % field_prime())
    }

    /// Reduce a signed integer into the field
    ///
    /// Negative values map to their non-negative residue, so `-1` becomes `P - 1`.
    pub fn from_bigint(value: BigInt) -> Self {
        let prime = BigInt::from_biguint(Sign::Plus, field_prime().clone());
        let mut reduced = value % &prime;
        if reduced.sign() == Sign::Minus {
            reduced += &prime;
        }
        let (_, magnitude) = reduced.into_parts();
        Self(magnitude)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_biguint(BigUint::from(value))
    }

    /// Interpret a big-endian digest as an integer and reduce it into the field
    pub fn from_digest(digest: &[u8]) -> Self {
        Self::from_biguint(BigUint::from_bytes_be(digest))
    }

    /// Underlying canonical integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Canonical `0x`-prefixed lowercase hex form
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }
}

impl Default for FieldElement {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({:#x})", self.0)
    }
}

impl FromStr for FieldElement {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self> {
        parse_felt_str(s)
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        normalize(&value).map_err(de::Error::custom)
    }
}

/// Canonicalize a felt-like JSON value
///
/// Accepts a decimal string, a `0x`-prefixed hex string, or a JSON integer of
/// any size. Floats, booleans, null, arrays and objects are rejected.
///
/// # Arguments
/// * `value` - JSON value emitted by an external tool
///
/// # Returns
/// * `Ok(FieldElement)` - Value reduced modulo the field prime
/// * `Err(ArtifactError::MalformedFelt)` - Empty string, bad digits or unsupported kind
pub fn normalize(value: &Value) -> Result<FieldElement> {
    match value {
        Value::String(raw) => parse_felt_str(raw),
        Value::Number(number) => {
            let text = number.to_string();
            if text.contains(['.', 'e', 'E']) {
                return Err(ArtifactError::MalformedFelt(format!(
                    "unsupported felt type: float {}",
                    text
                )));
            }
            parse_decimal(&text)
        }
        other => Err(ArtifactError::MalformedFelt(format!(
            "unsupported felt type: {}",
            json_kind(other)
        ))),
    }
}

fn parse_felt_str(raw: &str) -> Result<FieldElement> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ArtifactError::MalformedFelt(
            "empty felt string encountered".to_string(),
        ));
    }

    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(digits) => BigUint::parse_bytes(digits.as_bytes(), 16)
            .map(FieldElement::from_biguint)
            .ok_or_else(|| ArtifactError::MalformedFelt(format!("invalid hex felt: {:?}", raw))),
        None => parse_decimal(trimmed),
    }
}

fn parse_decimal(text: &str) -> Result<FieldElement> {
    BigInt::parse_bytes(text.as_bytes(), 10)
        .map(FieldElement::from_bigint)
        .ok_or_else(|| ArtifactError::MalformedFelt(format!("invalid decimal felt: {:?}", text)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
