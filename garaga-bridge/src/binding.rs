//! Nullifier/commitment binding
//!
//! A binding ties a proof to one request. It is either read from the
//! public inputs the prover produced, or derived from the intent and written
//! into them.

use crate::error::BridgeError;
use crate::Result;
use felt_artifacts::FieldElement;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Nullifier and commitment of one proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub nullifier: FieldElement,
    pub commitment: FieldElement,
}

/// Public-input positions of the nullifier and commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlots {
    pub nullifier_index: usize,
    pub commitment_index: usize,
}

impl BindingSlots {
    /// Validated slot pair; the two positions must differ
    pub fn new(nullifier_index: usize, commitment_index: usize) -> Result<Self> {
        if nullifier_index == commitment_index {
            return Err(BridgeError::Configuration(format!(
                "nullifier and commitment public input indices must differ (both {})",
                nullifier_index
            )));
        }
        Ok(Self {
            nullifier_index,
            commitment_index,
        })
    }

    /// Minimum public-input length that holds both slots
    pub fn required_len(&self) -> usize {
        self.nullifier_index.max(self.commitment_index) + 1
    }
}

impl Default for BindingSlots {
    fn default() -> Self {
        Self {
            nullifier_index: 0,
            commitment_index: 1,
        }
    }
}

/// Read the binding from the configured public-input slots
pub fn bind_from_public_inputs(inputs: &[FieldElement], slots: BindingSlots) -> Result<Binding> {
    if inputs.len() < slots.required_len() {
        return Err(BridgeError::InsufficientPublicInputs {
            len: inputs.len(),
            required: slots.required_len(),
            nullifier_index: slots.nullifier_index,
            commitment_index: slots.commitment_index,
        });
    }
    Ok(Binding {
        nullifier: inputs[slots.nullifier_index].clone(),
        commitment: inputs[slots.commitment_index].clone(),
    })
}

/// Derive a binding from the intent
///
/// # Arguments
/// * `intent_hash` - Hash from [`crate::derive_intent`]
/// * `nonce` - Resolved request nonce
/// * `requested_at` - Request timestamp, empty when absent
/// * `verifier` - Target verifier name
///
/// # Returns
/// `felt(sha256(seed ":nullifier"))` and `felt(sha256(seed ":commitment"))`
/// for `seed = "{intent_hash}|{nonce}|{requested_at}|{verifier}"`.
pub fn derive_dynamic_binding(
    intent_hash: &FieldElement,
    nonce: &str,
    requested_at: Option<i64>,
    verifier: &str,
) -> Binding {
    let requested_at = requested_at.map(|ts| ts.to_string()).unwrap_or_default();
    let seed = format!("{}|{}|{}|{}", intent_hash, nonce, requested_at, verifier);

    Binding {
        nullifier: domain_hash(&seed, "nullifier"),
        commitment: domain_hash(&seed, "commitment"),
    }
}

fn domain_hash(seed: &str, domain: &str) -> FieldElement {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(domain.as_bytes());
    FieldElement::from_digest(&hasher.finalize())
}

/// Zero-pad `inputs` to hold both slots, then write the binding into them
pub fn apply_binding(
    mut inputs: Vec<FieldElement>,
    binding: &Binding,
    slots: BindingSlots,
) -> Vec<FieldElement> {
    if inputs.len() < slots.required_len() {
        inputs.resize(slots.required_len(), FieldElement::zero());
    }
    inputs[slots.nullifier_index] = binding.nullifier.clone();
    inputs[slots.commitment_index] = binding.commitment.clone();
    inputs
}
