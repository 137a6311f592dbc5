//! The `check-config` command: parse and validate a configuration file.

use lmsync_engine::SyncConfig;
use std::path::Path;

/// Loads the configuration, validates it, and prints a summary.
pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::load(config_path)?;

    println!(
        "{}: ok ({} source(s), target {})",
        config_path.display(),
        config.sources.len(),
        config.target_url
    );
    for source in &config.sources {
        let prefix = if source.id_prefix().is_empty() {
            "<none>".to_string()
        } else {
            source.id_prefix().to_string()
        };
        println!(
            "  {}\t{}\t{}\tprefix {}",
            source.id,
            source.kind.name(),
            source.url,
            prefix
        );
    }
    Ok(())
}
