//! The coordination layer: domain store, derived fields, legacy migration
//! and the orchestrator that routes changes between the store, the
//! persistence engine and the file bridge.

mod derived;
mod gate;
mod migration;
mod orchestrator;
mod store;

pub use derived::{active_sprint_label, compute_derived, recompute_all, COMPLETED_SPRINT_LABEL};
pub use gate::{SuppressionState, WriteGate};
pub use migration::migrate_legacy_sprints;
pub use orchestrator::{SyncEvent, SyncOrchestrator};
pub use store::{DomainStore, MAX_ACTIVITIES};
