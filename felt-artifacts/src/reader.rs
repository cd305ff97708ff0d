//! Prover artifact reader
//!
//! External provers disagree on how they lay out proof and public-input files.
//! Schema tolerance is expressed as an ordered list of matchers: each one
//! either recognizes the document or passes, and the first match wins.

use crate::error::ArtifactError;
use crate::felt::{normalize, FieldElement};
use crate::Result;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Key-alias groups identifying the A, B and C components of a Groth16 proof
const GROTH16_ALIAS_GROUPS: [&[&str]; 3] = [
    &["a", "pi_a", "ar"],
    &["b", "pi_b", "bs"],
    &["c", "pi_c", "krs"],
];

/// Shape a proof file was recognized as by [`validate_proof_artifact`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofFormat {
    /// Non-empty top-level array
    FeltArray,
    /// Object with a non-empty `proof` array
    ProofField,
    /// Groth16 proof object, either at top level or nested under `proof`
    Groth16 { nested: bool },
}

/// Outcome of a single schema matcher
enum MatchOutcome<T> {
    Matched(T),
    Pass(&'static str),
}

/// Matchers locating the felt array inside a felt-array document
#[derive(Debug, Clone, Copy)]
enum ArrayMatcher<'k> {
    TopLevelArray,
    Key(&'k str),
}

impl<'k> ArrayMatcher<'k> {
    fn try_match<'a>(&self, document: &'a Value) -> MatchOutcome<&'a Value> {
        match (self, document) {
            (ArrayMatcher::TopLevelArray, Value::Array(_)) => MatchOutcome::Matched(document),
            (ArrayMatcher::Key(key), Value::Object(map)) => match map.get(*key) {
                Some(value) => MatchOutcome::Matched(value),
                None => MatchOutcome::Pass("key absent"),
            },
            _ => MatchOutcome::Pass("shape mismatch"),
        }
    }
}

fn array_matchers(expected_key: Option<&str>) -> Vec<ArrayMatcher<'_>> {
    let mut matchers = vec![ArrayMatcher::TopLevelArray];
    if let Some(key) = expected_key {
        matchers.push(ArrayMatcher::Key(key));
    }
    matchers.push(ArrayMatcher::Key("public_inputs"));
    matchers.push(ArrayMatcher::Key("proof"));
    matchers
}

/// Matchers accepted by the lax proof-shape check
#[derive(Debug, Clone, Copy)]
enum ProofMatcher {
    FeltArray,
    ProofField,
    Groth16,
}

const PROOF_MATCHERS: [ProofMatcher; 3] = [
    ProofMatcher::FeltArray,
    ProofMatcher::ProofField,
    ProofMatcher::Groth16,
];

impl ProofMatcher {
    fn try_match(&self, document: &Value) -> MatchOutcome<ProofFormat> {
        match self {
            ProofMatcher::FeltArray => match document {
                Value::Array(items) if !items.is_empty() => {
                    MatchOutcome::Matched(ProofFormat::FeltArray)
                }
                _ => MatchOutcome::Pass("not a non-empty array"),
            },
            ProofMatcher::ProofField => match document.get("proof") {
                Some(Value::Array(items)) if !items.is_empty() => {
                    MatchOutcome::Matched(ProofFormat::ProofField)
                }
                _ => MatchOutcome::Pass("no non-empty proof array"),
            },
            ProofMatcher::Groth16 => {
                let Value::Object(map) = document else {
                    return MatchOutcome::Pass("not an object");
                };
                if has_groth16_components(map) {
                    return MatchOutcome::Matched(ProofFormat::Groth16 { nested: false });
                }
                match map.get("proof") {
                    Some(Value::Object(inner)) if has_groth16_components(inner) => {
                        MatchOutcome::Matched(ProofFormat::Groth16 { nested: true })
                    }
                    _ => MatchOutcome::Pass("missing Groth16 A/B/C components"),
                }
            }
        }
    }
}

fn has_groth16_components(map: &Map<String, Value>) -> bool {
    let keys: Vec<String> = map.keys().map(|key| key.to_ascii_lowercase()).collect();
    GROTH16_ALIAS_GROUPS
        .iter()
        .all(|aliases| aliases.iter().any(|alias| keys.iter().any(|key| key == alias)))
}

/// Load and parse a JSON file
fn load_json(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ArtifactError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a felt array from a proof or public-input file
///
/// Accepts a top-level array, or an object holding `expected_key`, falling back
/// to `public_inputs` and then `proof`. Every element is canonicalized.
///
/// # Arguments
/// * `path` - JSON file written by the prover or the developer payload
/// * `expected_key` - Preferred field name when the document is an object
///
/// # Returns
/// * `Ok(Vec<FieldElement>)` - Non-empty canonical felt vector
/// * `Err(ArtifactError)` - Missing file, malformed JSON, unrecognized or empty array
pub fn read_felt_array(path: &Path, expected_key: Option<&str>) -> Result<Vec<FieldElement>> {
    let document = load_json(path)?;
    if !document.is_array() && !document.is_object() {
        return Err(ArtifactError::Schema {
            path: path.to_path_buf(),
            reason: "JSON must be an array or object".to_string(),
        });
    }

    let payload = array_matchers(expected_key)
        .iter()
        .find_map(|matcher| match matcher.try_match(&document) {
            MatchOutcome::Matched(value) => Some(value),
            MatchOutcome::Pass(_) => None,
        })
        .ok_or_else(|| ArtifactError::Schema {
            path: path.to_path_buf(),
            reason: "JSON object does not contain expected array field".to_string(),
        })?;

    let items = match payload {
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(ArtifactError::Schema {
                path: path.to_path_buf(),
                reason: "array is empty or invalid".to_string(),
            })
        }
    };

    let felts = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            normalize(item).map_err(|err| {
                ArtifactError::MalformedFelt(format!("{}[{}]: {}", path.display(), index, err))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("Read {} felts from {}", felts.len(), path.display());
    Ok(felts)
}

/// Check that a proof file has a shape downstream tooling can consume
///
/// This is laxer than [`read_felt_array`]: a Groth16 proof object with its
/// A/B/C components under any of their common aliases is accepted as well.
pub fn validate_proof_artifact(path: &Path) -> Result<ProofFormat> {
    let document = load_json(path)?;
    let mut reasons = Vec::with_capacity(PROOF_MATCHERS.len());

    for matcher in PROOF_MATCHERS {
        match matcher.try_match(&document) {
            MatchOutcome::Matched(format) => {
                tracing::debug!("Proof artifact {} recognized as {:?}", path.display(), format);
                return Ok(format);
            }
            MatchOutcome::Pass(reason) => reasons.push(reason),
        }
    }

    Err(ArtifactError::UnsupportedProofFormat {
        path: path.to_path_buf(),
        reason: reasons.join("; "),
    })
}

/// Load a JSON document that must be an array or an object
pub fn read_json_document(path: &Path) -> Result<Value> {
    let document = load_json(path)?;
    if document.is_array() || document.is_object() {
        Ok(document)
    } else {
        Err(ArtifactError::Schema {
            path: path.to_path_buf(),
            reason: "output must be a JSON array or object".to_string(),
        })
    }
}

/// Parse a felt list printed by calldata tooling
///
/// The tool prints either a JSON array or a Python list literal, which only
/// differs from JSON by its single-quoted strings.
pub fn parse_felt_list(text: &str) -> Result<Vec<FieldElement>> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(ArtifactError::MalformedList("output is empty".to_string()));
    }

    let value: Value = serde_json::from_str(raw)
        .or_else(|_| serde_json::from_str(&raw.replace('\'', "\"")))
        .map_err(|err| {
            let preview: String = raw.chars().take(200).collect();
            ArtifactError::MalformedList(format!("{} (raw={}...)", err, preview))
        })?;

    match value {
        Value::Array(items) if !items.is_empty() => items.iter().map(normalize).collect(),
        _ => Err(ArtifactError::MalformedList(
            "output is not a non-empty array".to_string(),
        )),
    }
}
