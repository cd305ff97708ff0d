//! `garaga calldata` step
//!
//! Turns the prover's proof file into the full felt array with hints that the
//! on-chain verifier expects.

use crate::config::CalldataConfig;
use crate::error::BridgeError;
use crate::invoker::run_shell;
use crate::Result;
use felt_artifacts::{parse_felt_list, validate_proof_artifact, FieldElement};
use std::path::Path;
use std::time::Duration;

/// Build the calldata command line
pub fn calldata_command(
    config: &CalldataConfig,
    proof_path: &Path,
    public_inputs_path: Option<&Path>,
) -> String {
    let mut parts = vec![
        config.launcher.clone(),
        "garaga calldata".to_string(),
        format!("--system {}", shell_quote(&config.system)),
        format!("--vk {}", shell_quote(&config.vk_path.display().to_string())),
        format!("--proof {}", shell_quote(&proof_path.display().to_string())),
    ];
    if let Some(path) = public_inputs_path {
        parts.push(format!("--public-inputs {}", shell_quote(&path.display().to_string())));
    }
    parts.push("--format array".to_string());
    parts.join(" ")
}

/// Generate the full proof with hints for `proof_path`
pub async fn generate_calldata(
    config: &CalldataConfig,
    proof_path: &Path,
    public_inputs_path: Option<&Path>,
    timeout: Duration,
) -> Result<Vec<FieldElement>> {
    let format = validate_proof_artifact(proof_path)?;
    tracing::debug!("Proof artifact {} recognized as {:?}", proof_path.display(), format);

    let command = calldata_command(config, proof_path, public_inputs_path);
    let output = run_shell(&command, &[], timeout).await?;
    let calldata = parse_felt_list(&output.stdout).map_err(|err| match err {
        felt_artifacts::ArtifactError::MalformedList(reason) => {
            BridgeError::MalformedInput(format!("garaga calldata output: {}", reason))
        }
        other => BridgeError::Artifact(other),
    })?;

    tracing::info!("garaga calldata produced {} felts", calldata.len());
    Ok(calldata)
}

/// Quote `value` for POSIX `sh`
fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"@%+=:,./-_".contains(&b));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r#"'"'"'"#))
    }
}
