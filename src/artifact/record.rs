use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ARTIFACT_NAME: &str = "Generated Article";

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"(?i)[^a-z0-9]").unwrap();
}

/// A generated document together with what it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub html: String,
    /// Data URI of the first input file, kept for side-by-side comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, html: impl Into<String>, original_image: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            html: html.into(),
            original_image,
            timestamp: Utc::now(),
        }
    }

    /// File name used when exporting: every character outside `[a-z0-9]`
    /// becomes `_`, then the whole name is lowercased.
    pub fn file_stem(&self) -> String {
        NON_ALNUM.replace_all(&self.name, "_").to_lowercase()
    }

    pub fn export_file_name(&self) -> String {
        format!("{}_artifact.json", self.file_stem())
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Artifact JSON as found in the wild: `id` and `timestamp` may be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDraft {
    pub id: Option<String>,
    pub name: String,
    pub html: String,
    #[serde(default)]
    pub original_image: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<ArtifactDraft> for Artifact {
    fn from(draft: ArtifactDraft) -> Self {
        Self {
            id: draft.id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: draft.name,
            html: draft.html,
            original_image: draft.original_image,
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            attachments: Some(attachments),
            artifact_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, artifact_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            attachments: None,
            artifact_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_name_is_sanitised() {
        let artifact = Artifact::new("VPN Setup (v2).png", "<p/>", None);
        assert_eq!(artifact.export_file_name(), "vpn_setup__v2__png_artifact.json");
    }

    #[test]
    fn json_uses_camel_case_and_skips_missing_image() {
        let artifact = Artifact::new("a", "<p/>", None);
        let json = serde_json::to_value(&artifact).unwrap();
        assert!(json.get("originalImage").is_none());
        assert!(json["timestamp"].as_str().unwrap().contains('T'));

        let with_image = Artifact::new("a", "<p/>", Some("data:image/png;base64,AA".into()));
        let json = serde_json::to_value(&with_image).unwrap();
        assert_eq!(json["originalImage"], "data:image/png;base64,AA");
    }

    #[test]
    fn draft_fills_missing_id_and_timestamp() {
        let draft: ArtifactDraft = serde_json::from_str(r#"{"name":"x","html":"<p/>"}"#).unwrap();
        let artifact = Artifact::from(draft);
        assert!(Uuid::parse_str(&artifact.id).is_ok());
        assert_eq!(artifact.original_image, None);
    }

    #[test]
    fn empty_draft_id_gets_a_fresh_one() {
        let parse = || -> Artifact {
            serde_json::from_str::<ArtifactDraft>(r#"{"id":"","name":"x","html":"<p/>"}"#).unwrap().into()
        };
        let (a, b) = (parse(), parse());
        assert!(Uuid::parse_str(&a.id).is_ok());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn draft_keeps_existing_fields() {
        let draft: ArtifactDraft = serde_json::from_str(
            r#"{"id":"abc","name":"x","html":"<p/>","timestamp":"2024-05-01T10:00:00Z"}"#,
        ).unwrap();
        let artifact = Artifact::from(draft);
        assert_eq!(artifact.id, "abc");
        assert_eq!(artifact.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn assistant_message_references_artifact() {
        let msg = Message::assistant("done", Some("id-1".into()));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["artifactId"], "id-1");
        assert!(json.get("attachments").is_none());
    }
}
