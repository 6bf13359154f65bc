pub mod docx;
pub mod error;
pub mod html;

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::info;

use crate::artifact::{self, Artifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Full artifact record
    Json,
    /// Word document converted from the article body
    Docx,
    /// The article HTML as-is
    Html,
}

/// Writes `artifact` into `dir` in the requested format and returns the path.
pub fn export_artifact(artifact: &Artifact, format: ExportFormat, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = match format {
        ExportFormat::Json => return artifact::export_json(artifact, dir),
        ExportFormat::Docx => {
            let path = dir.join(format!("{}.docx", artifact.file_stem()));
            let bytes = docx::generate(&artifact.html)
                .with_context(|| format!("Failed to convert {} to docx", artifact.id))?;
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            path
        }
        ExportFormat::Html => {
            let path = dir.join(format!("{}.html", artifact.file_stem()));
            std::fs::write(&path, &artifact.html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            path
        }
    };

    info!("Exported artifact {} to {}", artifact.id, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_format_lands_next_to_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::new("Printer Fix", "<html><body><h1>Printer</h1></body></html>", None);

        let json = export_artifact(&artifact, ExportFormat::Json, dir.path()).unwrap();
        let docx = export_artifact(&artifact, ExportFormat::Docx, dir.path()).unwrap();
        let html = export_artifact(&artifact, ExportFormat::Html, dir.path()).unwrap();

        assert!(json.ends_with("printer_fix_artifact.json"));
        assert!(docx.ends_with("printer_fix.docx"));
        assert_eq!(std::fs::read_to_string(html).unwrap(), artifact.html);
        assert_eq!(&std::fs::read(docx).unwrap()[..2], b"PK");
    }
}
