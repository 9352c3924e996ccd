mod cloud;
mod debounce;
mod persistence;

use std::fs;
use std::io;
use std::path::Path;

pub use cloud::{CloudStore, CloudSubscription, DirectoryCloudStore, MemoryCloudStore};
pub use debounce::Debouncer;
pub use persistence::{pick_latest, PersistenceEngine};

/// Write through a sibling temp file and rename, so readers never see a
/// half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
