use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::source::SourceFile;

lazy_static! {
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").unwrap();
    static ref MARKDOWN_HEADER: Regex = Regex::new(r"^(#{1,6})\s+(.+)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Text,
    Image,
    Code,
    Table,
    SectionHeader,
    Pdf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub level: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub filename: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline: Option<Vec<OutlineEntry>>,
}

/// A sanitised text input with enough metadata to describe it in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub metadata: SourceMetadata,
}

impl RawNode {
    /// Context snippet appended to the extracted text sent to the model.
    pub fn context_entry(&self) -> String {
        format!("[File {}]\n{}", self.metadata.filename, self.content)
    }
}

/// Removes control characters but keeps newlines, tabs and carriage returns.
pub fn sanitize(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, "").into_owned()
}

pub fn markdown_outline(text: &str) -> Vec<OutlineEntry> {
    text.split('\n')
        .filter_map(|line| {
            let caps = MARKDOWN_HEADER.captures(line)?;
            Some(OutlineEntry {
                level: caps[1].len(),
                text: caps[2].trim().to_string(),
            })
        })
        .collect()
}

/// Turns a text-like file (markdown, log, source code, plain text) into a [`RawNode`].
pub fn process_text_file(file: &SourceFile) -> RawNode {
    let text = String::from_utf8_lossy(&file.data);
    let name = file.name.to_lowercase();
    let content = sanitize(&text);

    let mut node_type = NodeType::Text;
    let mut outline = None;
    let syntax = if name.ends_with(".md") || name.ends_with(".markdown") || file.mime_type == "text/markdown" {
        outline = Some(markdown_outline(&text));
        "markdown".to_string()
    } else if name.ends_with(".log") {
        node_type = NodeType::Code;
        "log".to_string()
    } else if let Some(ext) = [".js", ".ts", ".py", ".json"].iter().find(|ext| name.ends_with(*ext)) {
        node_type = NodeType::Code;
        ext.trim_start_matches('.').to_string()
    } else {
        "plaintext".to_string()
    };

    RawNode {
        id: Uuid::new_v4(),
        content,
        node_type,
        metadata: SourceMetadata {
            filename: file.name.clone(),
            mime_type: if file.mime_type.is_empty() { "text/plain".to_string() } else { file.mime_type.clone() },
            size: Some(file.data.len()),
            processed_at: Some(Utc::now()),
            syntax: Some(syntax),
            outline,
        },
    }
}
