//! Checkpoint command implementation.

use super::CliResult;
use lodekv_core::{Config, Engine, SnapshotMeta};
use std::path::Path;

/// Runs the checkpoint command.
pub fn run(path: &Path, node_id: &str) -> CliResult<()> {
    let meta = checkpoint(path, node_id)?;
    println!("Checkpoint written for {}", path.display());
    println!("  Last revision: {}", meta.last_revision);
    println!("  Log offset:    {}", meta.last_wal_offset);
    Ok(())
}

/// Opens an existing data directory, recovers it and writes a checkpoint.
pub fn checkpoint(path: &Path, node_id: &str) -> CliResult<SnapshotMeta> {
    let config = Config::new(path).node_id(node_id).create_if_missing(false);
    let engine = Engine::open(config)?;
    let stats = engine.stats();
    tracing::info!(items = stats.items, last_seq = stats.last_seq, "recovered, writing checkpoint");
    Ok(engine.snapshot()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodekv_core::snapshot::read_meta;
    use tempfile::tempdir;

    #[test]
    fn writes_meta_for_existing_directory() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open(Config::new(dir.path()).node_id("writer")).unwrap();
            engine.put("a", "1").unwrap();
            engine.put("b", "2").unwrap();
        }

        let meta = checkpoint(dir.path(), "cli").unwrap();
        assert_eq!((meta.last_revision, meta.last_wal_offset), (2, 2));
        assert_eq!(meta.created_by_node, "cli");

        let on_disk = read_meta(&dir.path().join("wal")).unwrap().unwrap();
        assert_eq!(on_disk, meta);
    }

    #[test]
    fn refuses_to_create_a_directory() {
        let dir = tempdir().unwrap();
        assert!(checkpoint(&dir.path().join("absent"), "cli").is_err());
    }
}
