use std::collections::HashSet;
use std::path::{Path, PathBuf};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, warn};

use super::error::IngestError;

/// A user-supplied input file held in memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// A file ready to be put on the wire: name, type and base64 payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFile {
    pub name: String,
    pub mime_type: String,
    pub base64: String,
}

impl EncodedFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

impl SourceFile {
    pub async fn read(path: &Path) -> Result<Self, IngestError> {
        let data = tokio::fs::read(path).await.map_err(|source| IngestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(path, data))
    }

    pub fn from_bytes(path: &Path, data: Vec<u8>) -> Self {
        let name = path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        Self {
            name,
            mime_type,
            path: path.to_path_buf(),
            data,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }

    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
            || matches!(
                self.extension().as_deref(),
                Some("md" | "markdown" | "log" | "txt" | "js" | "ts" | "py" | "json")
            )
    }

    pub fn extension(&self) -> Option<String> {
        self.path.extension().map(|e| e.to_string_lossy().to_lowercase())
    }

    pub fn encode(&self) -> EncodedFile {
        EncodedFile {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            base64: STANDARD.encode(&self.data),
        }
    }
}

/// Expands CLI input arguments into concrete file paths.
///
/// Existing files are taken as-is, directories are walked recursively and
/// anything else is treated as a glob pattern. Order is kept, duplicates dropped.
pub fn collect_inputs(args: &[String]) -> Result<Vec<PathBuf>, IngestError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.clone()) {
            files.push(path);
        }
    };

    for arg in args {
        let path = PathBuf::from(arg);
        if path.is_file() {
            push(path);
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(&path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect();
            found.sort();
            info!("Found {} files under {}", found.len(), path.display());
            found.into_iter().for_each(&mut push);
        } else {
            let matches = glob::glob(arg).map_err(|e| IngestError::Pattern {
                pattern: arg.clone(),
                message: e.to_string(),
            })?;
            let mut matched = 0;
            for entry in matches {
                match entry {
                    Ok(p) if p.is_file() => {
                        matched += 1;
                        push(p);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable match for {}: {}", arg, e),
                }
            }
            if matched == 0 {
                return Err(IngestError::NoMatch(arg.clone()));
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_is_guessed_from_extension() {
        let png = SourceFile::from_bytes(Path::new("dir/shot.PNG"), vec![1, 2, 3]);
        assert_eq!(png.name, "shot.PNG");
        assert_eq!(png.mime_type, "image/png");
        assert!(png.encode().is_image());

        let pdf = SourceFile::from_bytes(Path::new("guide.pdf"), vec![]);
        assert!(pdf.is_pdf());

        let unknown = SourceFile::from_bytes(Path::new("blob.zzz9"), vec![]);
        assert_eq!(unknown.mime_type, "application/octet-stream");
    }

    #[test]
    fn logs_and_markdown_count_as_text() {
        assert!(SourceFile::from_bytes(Path::new("app.log"), vec![]).is_text());
        assert!(SourceFile::from_bytes(Path::new("notes.md"), vec![]).is_text());
        assert!(!SourceFile::from_bytes(Path::new("shot.png"), vec![]).is_text());
    }

    #[test]
    fn encode_produces_data_uri() {
        let file = SourceFile::from_bytes(Path::new("a.png"), b"foo".to_vec()).encode();
        assert_eq!(file.base64, "Zm9v");
        assert_eq!(file.data_uri(), "data:image/png;base64,Zm9v");
    }

    #[test]
    fn collect_expands_dirs_and_globs_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("shots");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b.png"), b"b").unwrap();
        std::fs::write(sub.join("a.png"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.md"), b"# hi").unwrap();

        let notes = dir.path().join("notes.md").to_string_lossy().to_string();
        let pattern = dir.path().join("*.md").to_string_lossy().to_string();
        let args = vec![notes.clone(), sub.to_string_lossy().to_string(), pattern];

        let files = collect_inputs(&args).unwrap();
        assert_eq!(files, vec![
            PathBuf::from(&notes),
            sub.join("a.png"),
            sub.join("b.png"),
        ]);
    }

    #[test]
    fn unmatched_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("*.nothing").to_string_lossy().to_string();
        assert!(matches!(collect_inputs(&[pattern]), Err(IngestError::NoMatch(_))));
    }
}
