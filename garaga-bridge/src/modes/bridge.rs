//! Bridge mode

use super::Bridge;
use crate::binding::{apply_binding, bind_from_public_inputs, derive_dynamic_binding};
use crate::intent::derive_intent;
use crate::request::ProofRequest;
use crate::Result;
use felt_artifacts::FieldElement;
use serde::Serialize;
use std::time::Instant;

/// Bound proof payload returned to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgePayload {
    pub nullifier: FieldElement,
    pub commitment: FieldElement,
    pub intent_hash: FieldElement,
    pub proof: Vec<FieldElement>,
    pub public_inputs: Vec<FieldElement>,
}

impl Bridge {
    /// Produce a bound proof for one request
    ///
    /// Either the full payload is returned or an error; no binding is applied
    /// to artifacts from a failed run.
    pub async fn bridge(&self, request: &ProofRequest) -> Result<BridgePayload> {
        let started = Instant::now();
        let source = self.artifact_source()?;
        let intent = derive_intent(request);
        tracing::info!("Bridging {} intent {}", intent.flow.kind(), intent.hash);

        let artifacts = source
            .produce(&self.invoker, request, self.config.prover.timeout)
            .await?;

        let slots = self.config.binding.slots;
        let (binding, public_inputs) = if self.config.binding.dynamic {
            let binding = derive_dynamic_binding(
                &intent.hash,
                &intent.nonce,
                request.requested_at_unix,
                &request.verifier,
            );
            let public_inputs = apply_binding(artifacts.public_inputs, &binding, slots);
            (binding, public_inputs)
        } else {
            let binding = bind_from_public_inputs(&artifacts.public_inputs, slots)?;
            (binding, artifacts.public_inputs)
        };

        tracing::info!(
            "Bound proof ({} felts, {} public inputs) in {:?}",
            artifacts.proof.len(),
            public_inputs.len(),
            started.elapsed()
        );

        Ok(BridgePayload {
            nullifier: binding.nullifier,
            commitment: binding.commitment,
            intent_hash: intent.hash,
            proof: artifacts.proof,
            public_inputs,
        })
    }
}
