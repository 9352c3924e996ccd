pub mod bridge;
pub mod cli;
pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod storage;
pub mod sync;

pub use bridge::{BridgeEvent, FileBridge};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use storage::{CloudStore, DirectoryCloudStore, MemoryCloudStore, PersistenceEngine};
pub use sync::{DomainStore, SyncEvent, SyncOrchestrator};
