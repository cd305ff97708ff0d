//! Bridge configuration
//!
//! All settings are read once at process start into [`BridgeConfig`] and then
//! passed to the components that need them. Nothing below this module looks at
//! the environment.

use crate::binding::BindingSlots;
use crate::error::BridgeError;
use crate::Result;
use admission_queue::{AdmissionQueue, CounterStore, QueueSettings, RedisCounterStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable names shared with the external prover scripts
pub mod env {
    pub const PROVE_CMD: &str = "GARAGA_PROVE_CMD";
    pub const TIMEOUT_SECS: &str = "GARAGA_TIMEOUT_SECS";
    pub const WARMUP_TIMEOUT_SECS: &str = "GARAGA_WARMUP_TIMEOUT_SECS";
    pub const OUTPUT_DIR: &str = "GARAGA_OUTPUT_DIR";
    pub const PROOF_PATH: &str = "GARAGA_PROOF_PATH";
    pub const PUBLIC_INPUTS_PATH: &str = "GARAGA_PUBLIC_INPUTS_PATH";
    pub const CONTEXT_PATH: &str = "GARAGA_CONTEXT_PATH";
    pub const VK_PATH: &str = "GARAGA_VK_PATH";
    pub const UVX_CMD: &str = "GARAGA_UVX_CMD";
    pub const SYSTEM: &str = "GARAGA_SYSTEM";
    pub const PRECOMPUTED_PAYLOAD_PATH: &str = "GARAGA_PRECOMPUTED_PAYLOAD_PATH";
    pub const ALLOW_PRECOMPUTED_PAYLOAD: &str = "GARAGA_ALLOW_PRECOMPUTED_PAYLOAD";
    pub const DYNAMIC_BINDING: &str = "GARAGA_DYNAMIC_BINDING";
    pub const NULLIFIER_INDEX: &str = "GARAGA_NULLIFIER_PUBLIC_INPUT_INDEX";
    pub const COMMITMENT_INDEX: &str = "GARAGA_COMMITMENT_PUBLIC_INPUT_INDEX";
    pub const REAL_PROVER_CMD: &str = "GARAGA_REAL_PROVER_CMD";
    pub const REAL_PROVER_TIMEOUT_SECS: &str = "GARAGA_REAL_PROVER_TIMEOUT_SECS";
    pub const QUEUE_REDIS_URL: &str = "GARAGA_QUEUE_REDIS_URL";
    pub const QUEUE_MAX_CONCURRENT: &str = "GARAGA_QUEUE_MAX_CONCURRENT";
    pub const QUEUE_TIMEOUT_SECS: &str = "GARAGA_QUEUE_TIMEOUT_SECS";
    pub const QUEUE_SLOT_TTL_SECS: &str = "GARAGA_QUEUE_SLOT_TTL_SECS";
    pub const QUEUE_POLL_MS: &str = "GARAGA_QUEUE_POLL_MS";
    pub const QUEUE_KEY: &str = "GARAGA_QUEUE_KEY";
    pub const QUEUE_FAIL_OPEN: &str = "GARAGA_QUEUE_FAIL_OPEN";
    pub const QUEUE_BYPASS: &str = "GARAGA_QUEUE_BYPASS";
}

const DEFAULT_OUTPUT_DIR: &str = "/tmp/garaga_auto_prover";

/// Per-request prover command and its file contract
#[derive(Debug, Clone)]
pub struct ProverConfig {
    /// Shell command regenerating proof/public-input files for one request
    pub command: Option<String>,
    pub timeout: Duration,
    pub warmup_timeout: Duration,
    pub output_dir: PathBuf,
    pub proof_path: PathBuf,
    /// When unset, public inputs are read from the proof file
    pub public_inputs_path: Option<PathBuf>,
}

/// `garaga calldata` invocation producing the full proof with hints
#[derive(Debug, Clone)]
pub struct CalldataConfig {
    /// Launcher prefix, e.g. `uvx --python 3.10`
    pub launcher: String,
    pub system: String,
    pub vk_path: PathBuf,
}

/// Prove-mode delegate
#[derive(Debug, Clone)]
pub struct RealProverConfig {
    pub command: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BindingConfig {
    pub slots: BindingSlots,
    /// Derive nullifier/commitment from the intent instead of reading them
    pub dynamic: bool,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Backing store address; `None` disables admission control
    pub redis_url: Option<String>,
    pub settings: QueueSettings,
    /// Set for nested invocations whose caller already holds a slot
    pub bypass: bool,
}

impl QueueConfig {
    /// Build the admission queue for this process
    ///
    /// Bypass or a missing store address yields a disabled queue. A store
    /// address that cannot even be parsed degrades the same way under
    /// fail-open and is fatal otherwise.
    pub fn build(&self) -> Result<AdmissionQueue> {
        if self.bypass {
            tracing::debug!("Admission queue bypassed by {}", env::QUEUE_BYPASS);
            return Ok(AdmissionQueue::disabled(self.settings.clone()));
        }
        let Some(url) = &self.redis_url else {
            return Ok(AdmissionQueue::disabled(self.settings.clone()));
        };

        match RedisCounterStore::open(url) {
            Ok(store) => {
                let store: Arc<dyn CounterStore> = Arc::new(store);
                Ok(AdmissionQueue::new(store, self.settings.clone()))
            }
            Err(err) if self.settings.fail_open => {
                tracing::warn!("Admission queue disabled, store unusable: {}", err);
                Ok(AdmissionQueue::disabled(self.settings.clone()))
            }
            Err(err) => Err(BridgeError::Queue(admission_queue::QueueError::Backend(err))),
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub prover: ProverConfig,
    pub calldata: Option<CalldataConfig>,
    /// Developer payload path, only populated when explicitly allowed
    pub precomputed_payload: Option<PathBuf>,
    pub binding: BindingConfig,
    pub real_prover: RealProverConfig,
    pub queue: QueueConfig,
}

impl BridgeConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let output_dir = vars
            .path(env::OUTPUT_DIR)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let proof_path = vars
            .path(env::PROOF_PATH)
            .unwrap_or_else(|| output_dir.join("proof.json"));

        let prover = ProverConfig {
            command: vars.string(env::PROVE_CMD),
            timeout: vars.seconds(env::TIMEOUT_SECS, 45)?,
            warmup_timeout: vars.seconds(env::WARMUP_TIMEOUT_SECS, 180)?,
            public_inputs_path: vars.path(env::PUBLIC_INPUTS_PATH),
            output_dir,
            proof_path,
        };

        let calldata = vars.path(env::VK_PATH).map(|vk_path| CalldataConfig {
            launcher: vars
                .string(env::UVX_CMD)
                .unwrap_or_else(|| "uvx --python 3.10".to_string()),
            system: vars
                .string(env::SYSTEM)
                .unwrap_or_else(|| "groth16".to_string()),
            vk_path,
        });

        let precomputed_payload = vars.path(env::PRECOMPUTED_PAYLOAD_PATH);
        if precomputed_payload.is_some() && !vars.flag(env::ALLOW_PRECOMPUTED_PAYLOAD, false)? {
            return Err(BridgeError::Configuration(format!(
                "{} is disabled in strict mode. Set {} for a real per-request prover, \
                 or explicitly set {}=true for developer mode.",
                env::PRECOMPUTED_PAYLOAD_PATH,
                env::PROVE_CMD,
                env::ALLOW_PRECOMPUTED_PAYLOAD
            )));
        }

        let binding = BindingConfig {
            slots: BindingSlots::new(
                vars.index(env::NULLIFIER_INDEX, 0)?,
                vars.index(env::COMMITMENT_INDEX, 1)?,
            )?,
            dynamic: vars.flag(env::DYNAMIC_BINDING, false)?,
        };

        let real_prover = RealProverConfig {
            command: vars.string(env::REAL_PROVER_CMD),
            timeout: vars.seconds(env::REAL_PROVER_TIMEOUT_SECS, 180)?,
        };

        let defaults = QueueSettings::default();
        let max_concurrent =
            vars.integer(env::QUEUE_MAX_CONCURRENT, u64::from(defaults.max_concurrent))?;
        let max_concurrent = u32::try_from(max_concurrent)
            .ok()
            .filter(|value| *value > 0)
            .ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "{} must be between 1 and {}",
                    env::QUEUE_MAX_CONCURRENT,
                    u32::MAX
                ))
            })?;

        let queue = QueueConfig {
            redis_url: vars.string(env::QUEUE_REDIS_URL),
            settings: QueueSettings {
                key: vars.string(env::QUEUE_KEY).unwrap_or(defaults.key),
                max_concurrent,
                queue_timeout: vars
                    .seconds(env::QUEUE_TIMEOUT_SECS, defaults.queue_timeout.as_secs())?,
                slot_ttl: vars.seconds(env::QUEUE_SLOT_TTL_SECS, defaults.slot_ttl.as_secs())?,
                poll_interval: Duration::from_millis(vars.integer(
                    env::QUEUE_POLL_MS,
                    u64::try_from(defaults.poll_interval.as_millis()).unwrap_or(250),
                )?),
                fail_open: vars.flag(env::QUEUE_FAIL_OPEN, defaults.fail_open)?,
            },
            bypass: vars.flag(env::QUEUE_BYPASS, false)?,
        };

        if queue.settings.slot_ttl.is_zero() {
            return Err(BridgeError::Configuration(format!(
                "{} must be > 0",
                env::QUEUE_SLOT_TTL_SECS
            )));
        }

        Ok(Self {
            prover,
            calldata,
            precomputed_payload,
            binding,
            real_prover,
            queue,
        })
    }
}

/// Typed accessors over a variable lookup; blank values count as unset
struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<'a, F: Fn(&str) -> Option<String>> Vars<'a, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.string(name).map(|value| expand_home(&value))
    }

    fn integer(&self, name: &str, default: u64) -> Result<u64> {
        match self.string(name) {
            None => Ok(default),
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                BridgeError::Configuration(format!(
                    "Invalid non-negative integer env {}={:?}",
                    name, raw
                ))
            }),
        }
    }

    fn index(&self, name: &str, default: usize) -> Result<usize> {
        let value = self.integer(name, default as u64)?;
        usize::try_from(value)
            .map_err(|_| BridgeError::Configuration(format!("{} is out of range", name)))
    }

    fn seconds(&self, name: &str, default: u64) -> Result<Duration> {
        self.integer(name, default).map(Duration::from_secs)
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.string(name) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(BridgeError::Configuration(format!(
                "Invalid boolean env {}={:?}",
                name, raw
            ))),
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => PathBuf::from(raw),
        },
        None => PathBuf::from(raw),
    }
}
