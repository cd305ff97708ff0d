//! External command invocation
//!
//! Proving runs out of process. [`run_shell`] executes one command string
//! under a hard deadline; [`ProverInvoker`] adds the context file, the output
//! path hints and the admission-queue lease around it.

use crate::config::env;
use crate::error::BridgeError;
use crate::Result;
use admission_queue::AdmissionQueue;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Captured output of a successful command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Process group a command runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessGroup {
    /// New group led by the `sh` child; a timeout kills the whole group
    Own,
    /// Stay in this process's group so an outer caller's group kill reaches
    /// every descendant
    Inherit,
}

/// Run `command` through `sh -c` in its own process group
///
/// If the deadline passes, every process in the group is killed and the
/// shell is reaped before returning.
///
/// # Arguments
/// * `command` - Shell command string
/// * `envs` - Extra environment for the child
/// * `timeout` - Hard deadline
///
/// # Returns
/// * `Ok(CommandOutput)` - Child exited with status zero
/// * `Err(BridgeError::ProverCommand)` - Non-zero exit, with captured output
/// * `Err(BridgeError::ProverTimeout)` - Deadline passed
pub async fn run_shell(
    command: &str,
    envs: &[(&str, String)],
    timeout: Duration,
) -> Result<CommandOutput> {
    run_shell_in(command, envs, timeout, ProcessGroup::Own).await
}

/// [`run_shell`] with an explicit process-group policy
pub async fn run_shell_in(
    command: &str,
    envs: &[(&str, String)],
    timeout: Duration,
    group: ProcessGroup,
) -> Result<CommandOutput> {
    tracing::debug!("Running command (timeout {:?}, {:?} group): {}", timeout, group, command);

    let mut builder = Command::new("sh");
    builder
        .arg("-c")
        .arg(command)
        .envs(envs.iter().map(|(name, value)| (*name, value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    if group == ProcessGroup::Own {
        builder.process_group(0);
    }

    let spawn_error = |source| BridgeError::ProverSpawn {
        command: command.to_string(),
        source,
    };
    let mut child = builder.spawn().map_err(spawn_error)?;
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let collected = tokio::time::timeout(timeout, async {
        tokio::try_join!(child.wait(), read_pipe(stdout_pipe), read_pipe(stderr_pipe))
    })
    .await;

    let (status, stdout, stderr) = match collected {
        Ok(result) => result.map_err(spawn_error)?,
        Err(_) => {
            kill_tree(&mut child, group).await;
            tracing::warn!("Command exceeded {:?} and was killed: {}", timeout, command);
            return Err(BridgeError::ProverTimeout {
                command: command.to_string(),
                timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();
    if !status.success() {
        return Err(BridgeError::ProverCommand {
            command: command.to_string(),
            status: status.to_string(),
            stdout,
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGKILL the child (and its group when it leads one), then reap it
async fn kill_tree(child: &mut Child, group: ProcessGroup) {
    #[cfg(unix)]
    if group == ProcessGroup::Own {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                tracing::debug!("killpg({}) failed: {}", pgid, err);
            }
        }
    }
    if let Err(err) = child.kill().await {
        tracing::debug!("Failed to kill and reap timed-out child: {}", err);
    }
}

/// Delete an output file left behind by an earlier run
///
/// A missing file is fine. Afterwards, a prover that exits without writing
/// its outputs surfaces as a not-found artifact instead of a stale proof.
pub(crate) fn remove_stale_output(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed stale output {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BridgeError::io(
            format!("removing stale output {}", path.display()),
            source,
        )),
    }
}

/// Where the prover is told to write its artifacts
#[derive(Debug, Clone)]
pub struct ProverOutputs {
    pub output_dir: PathBuf,
    pub proof_path: PathBuf,
    pub public_inputs_path: Option<PathBuf>,
}

impl ProverOutputs {
    /// Remove both output files so only this run's artifacts can be read
    pub fn clear(&self) -> Result<()> {
        remove_stale_output(&self.proof_path)?;
        match &self.public_inputs_path {
            Some(path) => remove_stale_output(path),
            None => Ok(()),
        }
    }
}

/// Runs prover commands while holding an admission-queue slot
#[derive(Clone)]
pub struct ProverInvoker {
    queue: Arc<AdmissionQueue>,
    group: ProcessGroup,
}

impl ProverInvoker {
    /// Invoker whose prover runs in its own process group
    pub fn new(queue: Arc<AdmissionQueue>) -> Self {
        Self {
            queue,
            group: ProcessGroup::Own,
        }
    }

    /// Invoker for a nested run whose caller owns the process group
    pub fn nested(queue: Arc<AdmissionQueue>) -> Self {
        Self {
            queue,
            group: ProcessGroup::Inherit,
        }
    }

    /// Run a prover command with the request context
    ///
    /// Stale outputs are removed first. The context is written to a temporary
    /// JSON file whose path, together with the output hints, is passed
    /// through the environment. The child also gets `GARAGA_QUEUE_BYPASS=1`
    /// since this process already holds the slot.
    pub async fn invoke(
        &self,
        command: &str,
        context_json: &str,
        outputs: &ProverOutputs,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        std::fs::create_dir_all(&outputs.output_dir).map_err(|source| {
            BridgeError::io(
                format!("creating output dir {}", outputs.output_dir.display()),
                source,
            )
        })?;
        outputs.clear()?;

        let mut context_file = tempfile::Builder::new()
            .prefix("garaga-context-")
            .suffix(".json")
            .tempfile()
            .map_err(|source| BridgeError::io("creating context file", source))?;
        context_file
            .write_all(context_json.as_bytes())
            .and_then(|()| context_file.flush())
            .map_err(|source| BridgeError::io("writing context file", source))?;

        let mut envs = vec![
            (env::CONTEXT_PATH, context_file.path().display().to_string()),
            (env::OUTPUT_DIR, outputs.output_dir.display().to_string()),
            (env::PROOF_PATH, outputs.proof_path.display().to_string()),
            (env::QUEUE_BYPASS, "1".to_string()),
        ];
        if let Some(path) = &outputs.public_inputs_path {
            envs.push((env::PUBLIC_INPUTS_PATH, path.display().to_string()));
        }

        self.run_guarded(command, &envs, timeout).await
    }

    /// Run a command under a queue lease without any context file
    pub async fn run_guarded(
        &self,
        command: &str,
        envs: &[(&str, String)],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        self.queue
            .run_with_lease(async {
                let output = run_shell_in(command, envs, timeout, self.group).await?;
                tracing::info!("Prover command finished");
                Ok(output)
            })
            .await
    }
}
