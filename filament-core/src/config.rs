//! Runtime configuration.
//!
//! Each thread runs its own reactive runtime, and each runtime carries a
//! [`RuntimeConfig`]. Hosts install one with [`configure`] before building
//! their graph, typically from a JSON settings blob:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "scheduler": "frame" }"#)?;
//! filament_core::configure(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reactive::with_runtime;

/// How un-batched writes propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerMode {
    /// A write outside `batch` re-runs its dependents before returning.
    #[default]
    Immediate,

    /// Every write queues its dependents; nothing re-runs until the host
    /// calls [`flush`](crate::reactive::flush), e.g. once per frame.
    Frame,
}

/// Per-thread runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Propagation strategy for writes outside a batch.
    pub scheduler: SchedulerMode,

    /// Upper bound on owner runs within one flush. Exceeding it means an
    /// effect keeps re-triggering itself; the rest of the queue is dropped.
    pub max_updates_per_flush: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerMode::Immediate,
            max_updates_per_flush: 100_000,
        }
    }
}

impl RuntimeConfig {
    /// Configuration for frame-coalesced propagation.
    pub fn frame() -> Self {
        Self {
            scheduler: SchedulerMode::Frame,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the runaway-loop limit.
    pub fn with_max_updates_per_flush(mut self, limit: usize) -> Self {
        self.max_updates_per_flush = limit;
        self
    }
}

/// Install `config` for the current thread's runtime.
///
/// Switching from [`SchedulerMode::Frame`] to `Immediate` does not drain
/// work already queued; call [`flush`](crate::reactive::flush) for that.
pub fn configure(config: RuntimeConfig) {
    tracing::debug!(?config, "configuring reactive runtime");
    with_runtime(|rt| rt.set_config(config));
}

/// The current thread's runtime configuration.
pub fn runtime_config() -> RuntimeConfig {
    with_runtime(|rt| rt.config())
}
