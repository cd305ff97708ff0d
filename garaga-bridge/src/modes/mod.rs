//! Operating modes
//!
//! [`Bridge`] owns the configuration, the selected artifact source and the
//! prover invoker. Each mode is one async method returning a serializable
//! report that the binary prints to stdout.

mod bridge;
mod prove;
mod warmup;

pub use bridge::BridgePayload;
pub use prove::ProveReport;
pub use self_test::{ProofSummary, SelfTestReport};
pub use warmup::WarmupReport;

use crate::config::BridgeConfig;
use crate::invoker::ProverInvoker;
use crate::source::ArtifactSource;
use crate::Result;
use admission_queue::AdmissionQueue;
use std::sync::Arc;

/// Proof-request bridge
pub struct Bridge {
    config: BridgeConfig,
    invoker: ProverInvoker,
}

impl Bridge {
    /// Bridge using the queue described by `config`
    pub fn from_config(config: BridgeConfig) -> Result<Self> {
        let queue = config.queue.build()?;
        Ok(Self::with_queue(config, Arc::new(queue)))
    }

    /// Bridge using an already-built queue
    ///
    /// A bypassed queue means an outer bridge is running this process as its
    /// prover, so children stay in the outer process group.
    pub fn with_queue(config: BridgeConfig, queue: Arc<AdmissionQueue>) -> Self {
        tracing::debug!(
            "Bridge configured (dynamic binding: {}, queue enabled: {})",
            config.binding.dynamic,
            queue.is_enabled()
        );
        let invoker = if config.queue.bypass {
            ProverInvoker::nested(queue)
        } else {
            ProverInvoker::new(queue)
        };
        Self { config, invoker }
    }

    /// Strategy used by bridge, warmup and self-test
    fn artifact_source(&self) -> Result<ArtifactSource> {
        ArtifactSource::from_config(&self.config)
    }
}
