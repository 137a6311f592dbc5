//! The `status` command: show each source's persisted checkpoint.

use lmsync_engine::{CheckpointStore, JsonFileCheckpointStore, SyncConfig};
use std::path::Path;

/// Prints one line per configured source with its persisted cursor.
pub fn run(config_path: &Path, state_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::load(config_path)?;
    let checkpoints = JsonFileCheckpointStore::open(state_path)?;

    for source in &config.sources {
        match checkpoints.load(&source.id)? {
            Some(seq) => println!("{}\t{}\t{}", source.id, source.kind.name(), seq),
            None => println!("{}\t{}\t<never synced>", source.id, source.kind.name()),
        }
    }
    Ok(())
}
