//! The `run` command: drive the sync engine against real databases.

use crate::couch::ReqwestClient;
use lmsync_engine::{CouchStore, JsonFileCheckpointStore, SyncConfig, SyncEngine, SyncMode};
use std::path::Path;
use std::sync::Arc;

/// Replicates the configured sources into the target, once or continuously.
pub fn run(
    config_path: &Path,
    state_path: &Path,
    continuous: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::load(config_path)?;
    let checkpoints = Arc::new(JsonFileCheckpointStore::open(state_path)?);

    let target = Arc::new(CouchStore::new(
        "target",
        &config.target_url,
        ReqwestClient::new()?,
    ));
    let mut engine = SyncEngine::new(config.clone(), target, checkpoints);
    for source in &config.sources {
        let store = Arc::new(CouchStore::new(
            &source.id,
            &source.url,
            ReqwestClient::new()?,
        ));
        engine.bind_source(&source.id, store)?;
    }

    let mode = if continuous {
        SyncMode::Continuous
    } else {
        SyncMode::OneShot
    };
    tracing::info!(
        sources = config.sources.len(),
        target = %config.target_url,
        continuous,
        "starting sync"
    );
    engine.run(mode)?;

    let stats = engine.stats();
    tracing::info!(
        cycles = stats.cycles_completed,
        accepted = stats.docs_accepted,
        conflicted = stats.docs_conflicted,
        skipped = stats.docs_skipped,
        "sync finished"
    );
    Ok(())
}
