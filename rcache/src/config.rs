use crate::routing::Topology;
use crate::script::ScriptDefinition;

/// What [`Cache::flush`](crate::Cache::flush) is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// `flush` wipes the whole store.
    #[default]
    Allow,
    /// `flush` only logs a warning and reports success.  Meant for stores
    /// shared with other applications.
    Never,
}

/// Configuration of a [`Cache`](crate::Cache).
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    pub(crate) topology: Topology,
    pub(crate) flush_policy: FlushPolicy,
    pub(crate) scripts: Vec<ScriptDefinition>,
}

impl CacheConfig {
    /// Creates a new config: single node, flushing allowed, built-in scripts
    /// only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how the store is deployed, default is [`Topology::Single`].
    pub fn set_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Sets what `flush` does, default is [`FlushPolicy::Allow`].
    pub fn set_flush_policy(mut self, flush_policy: FlushPolicy) -> Self {
        self.flush_policy = flush_policy;
        self
    }

    /// Registers an extra script, replacing a built-in one of the same name.
    pub fn add_script(mut self, script: ScriptDefinition) -> Self {
        self.scripts.push(script);
        self
    }

    /// Returns the configured deployment.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the configured flush policy.
    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush_policy
    }
}
