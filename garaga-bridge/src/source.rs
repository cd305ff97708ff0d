//! Where proof artifacts come from
//!
//! Two strategies share one interface. The real prover regenerates artifacts
//! for every request. The precomputed payload replays a fixed file and exists
//! for local development only.

use crate::calldata::generate_calldata;
use crate::config::{env, BridgeConfig, CalldataConfig};
use crate::error::BridgeError;
use crate::invoker::{ProverInvoker, ProverOutputs};
use crate::request::ProofRequest;
use crate::Result;
use felt_artifacts::{read_felt_array, FieldElement};
use std::path::PathBuf;
use std::time::Duration;

/// Proof and public inputs as produced, before binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProverArtifacts {
    pub proof: Vec<FieldElement>,
    pub public_inputs: Vec<FieldElement>,
}

/// Artifact production strategy
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// Run the per-request prover, then optionally `garaga calldata`
    RealProver {
        command: String,
        outputs: ProverOutputs,
        calldata: Option<CalldataConfig>,
    },
    /// Read both arrays from one developer-supplied file
    Precomputed { path: PathBuf },
}

impl ArtifactSource {
    /// Select the strategy from configuration
    ///
    /// A configured prover command always wins over a precomputed payload.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        if let Some(command) = &config.prover.command {
            if config.precomputed_payload.is_some() {
                tracing::warn!(
                    "{} is set, ignoring {}",
                    env::PROVE_CMD,
                    env::PRECOMPUTED_PAYLOAD_PATH
                );
            }
            return Ok(ArtifactSource::RealProver {
                command: command.clone(),
                outputs: ProverOutputs {
                    output_dir: config.prover.output_dir.clone(),
                    proof_path: config.prover.proof_path.clone(),
                    public_inputs_path: config.prover.public_inputs_path.clone(),
                },
                calldata: config.calldata.clone(),
            });
        }

        match &config.precomputed_payload {
            Some(path) => {
                tracing::warn!(
                    "Using precomputed payload {} (developer mode, proofs are not per-request)",
                    path.display()
                );
                Ok(ArtifactSource::Precomputed { path: path.clone() })
            }
            None => Err(BridgeError::Configuration(format!(
                "Missing required env: {}. Real per-request prover is mandatory.",
                env::PROVE_CMD
            ))),
        }
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, ArtifactSource::Precomputed { .. })
    }

    /// Produce artifacts for `request`
    pub async fn produce(
        &self,
        invoker: &ProverInvoker,
        request: &ProofRequest,
        timeout: Duration,
    ) -> Result<ProverArtifacts> {
        match self {
            ArtifactSource::RealProver {
                command,
                outputs,
                calldata,
            } => {
                tracing::info!("Running prover for request from {}", request.user_address);
                invoker
                    .invoke(command, &request.to_context_json()?, outputs, timeout)
                    .await?;

                let proof = match calldata {
                    Some(config) => {
                        generate_calldata(
                            config,
                            &outputs.proof_path,
                            outputs.public_inputs_path.as_deref(),
                            timeout,
                        )
                        .await?
                    }
                    None => read_felt_array(&outputs.proof_path, Some("proof"))?,
                };

                let public_inputs_file = outputs
                    .public_inputs_path
                    .as_deref()
                    .unwrap_or(&outputs.proof_path);
                let public_inputs = read_felt_array(public_inputs_file, Some("public_inputs"))?;

                Ok(ProverArtifacts {
                    proof,
                    public_inputs,
                })
            }
            ArtifactSource::Precomputed { path } => Ok(ProverArtifacts {
                proof: read_felt_array(path, Some("proof"))?,
                public_inputs: read_felt_array(path, Some("public_inputs"))?,
            }),
        }
    }
}
