//! Garaga Bridge - Proof-request bridge between the backend and an external prover
//!
//! This crate turns one transaction-intent payload into a bound proof payload:
//! it derives the intent hash, runs the external prover under the admission
//! queue, loads the produced artifacts and splices the nullifier/commitment
//! binding into the public inputs.

pub mod binding;
pub mod calldata;
pub mod config;
pub mod error;
pub mod intent;
pub mod invoker;
pub mod modes;
pub mod request;
pub mod source;

pub use binding::{
    apply_binding, bind_from_public_inputs, derive_dynamic_binding, Binding, BindingSlots,
};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use intent::{derive_intent, FlowIntent, Intent};
pub use invoker::{ProverInvoker, ProverOutputs};
pub use modes::{Bridge, BridgePayload};
pub use request::ProofRequest;
pub use source::{ArtifactSource, ProverArtifacts};

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
