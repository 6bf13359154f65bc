use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{error, info, warn};

use super::record::{Artifact, ArtifactDraft};

const HISTORY_FILE: &str = "history.json";

/// Artifact history persisted as a single JSON array on disk.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the history. A missing or unreadable file yields an empty list.
    pub fn load(&self) -> Vec<Artifact> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Failed to load history from {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(e) => {
                error!("Failed to parse history {}: {}", self.path.display(), e);
                self.set_aside();
                Vec::new()
            }
        }
    }

    /// Moves an unreadable history file to `history.json.bak` so the next save
    /// does not overwrite it.
    fn set_aside(&self) {
        let backup = self.backup_path();
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => warn!("Moved unreadable history to {}", backup.display()),
            Err(e) => warn!("Failed to move unreadable history to {}: {}", backup.display(), e),
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    /// Writes the history back. Failures are logged and otherwise ignored.
    pub fn save(&self, history: &[Artifact]) {
        if let Err(e) = self.try_save(history) {
            warn!("Error saving history: {:#}", e);
        }
    }

    fn try_save(&self, history: &[Artifact]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string(history)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Inserts or replaces artifacts by id and persists the result.
    pub fn upsert(&self, artifacts: &[Artifact]) {
        let mut history = self.load();
        for artifact in artifacts {
            match history.iter_mut().find(|a| a.id == artifact.id) {
                Some(existing) => *existing = artifact.clone(),
                None => history.push(artifact.clone()),
            }
        }
        self.save(&history);
    }

    /// Finds an artifact by full id or unique id prefix.
    pub fn find(&self, id: &str) -> Result<Artifact> {
        let history = self.load();
        if let Some(found) = history.iter().find(|a| a.id == id) {
            return Ok(found.clone());
        }

        let mut matches = history.into_iter().filter(|a| a.id.starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(found),
            (Some(_), Some(_)) => Err(anyhow::anyhow!("Artifact id {} is ambiguous", id)),
            _ => Err(anyhow::anyhow!("No artifact with id {}", id)),
        }
    }
}

/// Writes the pretty-printed artifact JSON into `dir` and returns the file path.
pub fn export_json(artifact: &Artifact, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(artifact.export_file_name());
    let raw = artifact.to_pretty_json()?;
    std::fs::write(&path, raw)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Exported artifact {} to {}", artifact.id, path.display());
    Ok(path)
}

/// Reads one artifact from a local path or an http(s) URL.
pub async fn fetch_artifact(client: &Client, source: &str) -> Result<Artifact> {
    let draft: ArtifactDraft = if source.starts_with("http://") || source.starts_with("https://") {
        let response = client.get(source).send().await
            .with_context(|| format!("Failed to fetch {}", source))?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch {}: {}", source, response.status()));
        }
        response.json().await
            .with_context(|| format!("Invalid artifact JSON from {}", source))?
    } else {
        let raw = tokio::fs::read_to_string(source).await
            .with_context(|| format!("Failed to read {}", source))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid artifact JSON in {}", source))?
    };
    Ok(draft.into())
}

/// Loads every source it can; failed sources are logged and skipped.
pub async fn import_artifacts(sources: &[String]) -> Vec<Artifact> {
    let client = Client::new();
    let mut imported = Vec::new();
    for source in sources {
        match fetch_artifact(&client, source).await {
            Ok(artifact) => {
                info!("Imported {} ({})", artifact.name, artifact.id);
                imported.push(artifact);
            }
            Err(e) => error!("Failed to import {}: {:#}", source, e),
        }
    }
    imported
}
