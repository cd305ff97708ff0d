//! Warmup mode
//!
//! Pays the prover's cold-start cost (toolchain download, key loading) once,
//! ahead of traffic, with a longer deadline than a regular request.

use super::Bridge;
use crate::request::ProofRequest;
use crate::Result;
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub ok: bool,
    pub proof_len: usize,
    pub public_inputs_len: usize,
    pub elapsed_ms: u64,
}

/// Fixed request used to exercise the prover
pub(crate) fn warmup_request() -> ProofRequest {
    ProofRequest {
        user_address: "0x1".to_string(),
        verifier: "garaga".to_string(),
        requested_at_unix: Some(0),
        tx_context: json!({
            "flow": "swap",
            "from_token": "USDC",
            "to_token": "ETH",
            "amount": "1",
            "nonce": "warmup",
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    }
}

impl Bridge {
    /// Generate artifacts once for a sample request
    pub async fn warmup(&self) -> Result<WarmupReport> {
        let started = Instant::now();
        tracing::info!("Starting Garaga warmup (timeout {:?})", self.config.prover.warmup_timeout);

        let source = self.artifact_source()?;
        let artifacts = source
            .produce(&self.invoker, &warmup_request(), self.config.prover.warmup_timeout)
            .await?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!("Garaga warmup completed in {} ms", elapsed_ms);

        Ok(WarmupReport {
            ok: true,
            proof_len: artifacts.proof.len(),
            public_inputs_len: artifacts.public_inputs.len(),
            elapsed_ms,
        })
    }
}
