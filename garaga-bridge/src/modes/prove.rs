//! Prove mode
//!
//! Used as `GARAGA_PROVE_CMD` itself: delegates to the real prover command and
//! checks that both output files were written as JSON by this run.

use super::Bridge;
use crate::config::env;
use crate::error::BridgeError;
use crate::invoker::remove_stale_output;
use crate::Result;
use felt_artifacts::read_json_document;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProveReport {
    pub ok: bool,
    pub proof_path: PathBuf,
    pub public_inputs_path: PathBuf,
}

impl Bridge {
    /// Run the real prover and validate its outputs
    pub async fn prove(&self) -> Result<ProveReport> {
        let command = self.config.real_prover.command.as_deref().ok_or_else(|| {
            BridgeError::Configuration(format!("Missing required env: {}", env::REAL_PROVER_CMD))
        })?;
        let proof_path = self.config.prover.proof_path.clone();
        let public_inputs_path =
            self.config.prover.public_inputs_path.clone().ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "Missing required env: {}",
                    env::PUBLIC_INPUTS_PATH
                ))
            })?;

        for path in [&proof_path, &public_inputs_path] {
            create_parent(path)?;
            remove_stale_output(path)?;
        }

        let envs = [
            (env::OUTPUT_DIR, self.config.prover.output_dir.display().to_string()),
            (env::PROOF_PATH, proof_path.display().to_string()),
            (env::PUBLIC_INPUTS_PATH, public_inputs_path.display().to_string()),
        ];
        self.invoker
            .run_guarded(command, &envs, self.config.real_prover.timeout)
            .await?;

        read_json_document(&proof_path)?;
        read_json_document(&public_inputs_path)?;
        tracing::info!(
            "Real prover wrote {} and {}",
            proof_path.display(),
            public_inputs_path.display()
        );

        Ok(ProveReport {
            ok: true,
            proof_path,
            public_inputs_path,
        })
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|source| BridgeError::io(format!("creating {}", parent.display()), source)),
        _ => Ok(()),
    }
}
