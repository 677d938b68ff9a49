//! Configuration for cfgsync
//!
//! Options for the manager and for the log-backed store, with sensible
//! defaults and builders.

use std::path::PathBuf;

// =============================================================================
// Manager Options
// =============================================================================

/// Options handed to a manager at construction
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Prefix of every store key owned by the manager
    /// (`None` uses the root type's `NAME`)
    pub namespace: Option<String>,

    /// How the tree and the store are brought into agreement at startup
    pub init_mode: InitMode,

    /// Log every persisted and deleted entry at `debug` level
    pub trace_entries: bool,
}

/// Startup policy for a manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitMode {
    /// Hydrate when the namespace already holds entries, else materialize
    #[default]
    Auto,

    /// The root value wins: write it out, deleting stale entries
    Materialize,

    /// The store wins: read entries over the root value's defaults
    Hydrate,
}

impl ManagerOptions {
    /// Create a new options builder
    pub fn builder() -> ManagerOptionsBuilder {
        ManagerOptionsBuilder::default()
    }
}

/// Builder for ManagerOptions
#[derive(Default)]
pub struct ManagerOptionsBuilder {
    options: ManagerOptions,
}

impl ManagerOptionsBuilder {
    /// Set the store key namespace (empty string for none)
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = Some(namespace.into());
        self
    }

    /// Set the startup policy
    pub fn init_mode(mut self, mode: InitMode) -> Self {
        self.options.init_mode = mode;
        self
    }

    /// Enable per-entry debug logging of updates
    pub fn trace_entries(mut self, enabled: bool) -> Self {
        self.options.trace_entries = enabled;
        self
    }

    pub fn build(self) -> ManagerOptions {
        self.options
    }
}

// =============================================================================
// Log Store Options
// =============================================================================

/// Options of a `LogStore`
#[derive(Debug, Clone)]
pub struct LogStoreOptions {
    /// Path of the log file
    pub path: PathBuf,

    /// Sync strategy: how often to fsync the log
    pub sync_strategy: SyncStrategy,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every record (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced records (balanced durability/performance)
    EveryNRecords { count: usize },
}

impl Default for LogStoreOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./cfgsync.log"),
            sync_strategy: SyncStrategy::EveryWrite,
        }
    }
}

impl LogStoreOptions {
    /// Options for a log at `path` with the default sync strategy
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }
}
