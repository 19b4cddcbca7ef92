//! Loads workflow definitions from `OPSCORE_SEED_WORKFLOWS` at startup, if
//! configured. Each file in the directory is parsed independently; one bad
//! file logs a warning and is skipped rather than aborting startup.

use std::path::Path;

use crate::workflow::WorkflowEngine;

pub async fn load_seed_workflows(dir: &Path, engine: &WorkflowEngine) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "could not read seed workflows directory");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "error reading seed workflows directory entry");
                break;
            }
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read seed workflow file");
                continue;
            }
        };

        match engine.create_workflow_from_text(&raw).await {
            Ok(id) => tracing::info!(path = %path.display(), workflow_id = %id, "seeded workflow definition"),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to seed workflow definition"),
        }
    }
}
