//! Felt Artifacts - Field element codec and prover artifact reader
//!
//! This crate is the boundary between the bridge and whatever files an
//! external prover or calldata tool writes out. Every value that crosses that
//! boundary is canonicalized into a field element of the Stark scalar field.
//!
//! # Overview
//!
//! * [`FieldElement`] - integer reduced modulo `P = 2^251 + 17 * 2^192 + 1`,
//!   always serialized as lowercase `0x` hex
//! * [`read_felt_array`] - load a proof or public-input file, tolerating a
//!   bare array or an object with a named array field
//! * [`validate_proof_artifact`] - laxer shape check run before handing a
//!   proof file to downstream tooling (accepts Groth16 proof objects)
//!
//! # Usage
//!
//! ```no_run
//! use felt_artifacts::{normalize, read_felt_array};
//! use std::path::Path;
//!
//! let felt = normalize(&serde_json::json!("255")).unwrap();
//! assert_eq!(felt.to_string(), "0xff");
//!
//! let public_inputs = read_felt_array(Path::new("public.json"), Some("public_inputs")).unwrap();
//! println!("{} public inputs", public_inputs.len());
//! ```

pub mod error;
pub mod felt;
pub mod reader;

pub use error::ArtifactError;
pub use felt::{field_prime, normalize, FieldElement};
pub use reader::{
    parse_felt_list, read_felt_array, read_json_document, validate_proof_artifact, ProofFormat,
};

/// Result type for artifact operations
pub type Result<T> = std::result::Result<T, ArtifactError>;
