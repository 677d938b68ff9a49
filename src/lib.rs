//! # cfgsync
//!
//! Typed configuration trees kept in sync with a flat key-value store:
//! - Reflection of any serde type into an addressable node tree
//! - Dotted topics with per-section overrides (`database:db2.port`)
//! - Atomic partial updates: stage, validate, persist, commit
//! - In-memory and log-backed stores with crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Manager                               │
//! │            (Single Writer / Multi Reader lock)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌─────────────┐
//!   │    Node     │ │ TopicIndex  │   │  Validator  │
//!   │  (reflect)  │ │ (Sections)  │   │   Cascade   │
//!   └──────┬──────┘ └─────────────┘   └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Codec    │─────────►│   KvStore   │
//!   │ (flat view) │  (diff)  │ Mem / Log   │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let manager = Manager::new(MemStore::new(), Config::default())?;
//! manager.update(Changes::new().set("server.port", 9090))?;
//! let port: u16 = manager.get_as("server.port")?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod topic;
pub mod node;
pub mod schema;
pub mod codec;
pub mod store;
pub mod manager;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ConfigError, Result, StoreError, StoreResult, ValidationErrors, ValidationFailure};
pub use config::{InitMode, LogStoreOptions, ManagerOptions, SyncStrategy};
pub use node::{Node, NodeKind, Scalar};
pub use schema::{ConfigRoot, Section, Sections};
pub use codec::Entries;
pub use store::{KvStore, LogStore, MemStore};
pub use manager::{Changes, Manager, SectionHandle, UpdateOutcome, UpdatePhase};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cfgsync
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
