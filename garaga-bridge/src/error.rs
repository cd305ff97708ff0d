//! Bridge error taxonomy
//!
//! Every variant is fatal to the current request; the binary maps any of them
//! to a non-zero exit status with the message on stderr.

use admission_queue::QueueError;
use felt_artifacts::ArtifactError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Missing or invalid setting
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Request payload could not be parsed
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Proof or public-input artifact could not be loaded
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Public-input vector too short to extract the binding
    #[error(
        "public_inputs too short to bind nullifier/commitment: len={len}, required>={required}, \
         nullifier_idx={nullifier_index}, commitment_idx={commitment_index}"
    )]
    InsufficientPublicInputs {
        len: usize,
        required: usize,
        nullifier_index: usize,
        commitment_index: usize,
    },

    /// External command could not be started
    #[error("failed to run command: {command}: {source}")]
    ProverSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// External command exited unsuccessfully
    #[error("command failed ({status})\ncommand: {command}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    ProverCommand {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    /// External command exceeded its deadline and was killed
    #[error("command timeout ({timeout:?}): {command}")]
    ProverTimeout { command: String, timeout: Duration },

    /// Admission queue refused or failed
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BridgeError::Io {
            context: context.into(),
            source,
        }
    }
}
