use std::collections::HashMap;
use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::artifact::{Artifact, Attachment, Message, DEFAULT_ARTIFACT_NAME};
use crate::ingest::{process_text_file, PdfWorker, SourceFile};
use crate::llm::{generate_kb, update_article, ModelProvider};

pub const GENERATED_REPLY: &str = "Here is the knowledge base article I generated for you.";
pub const REFINED_REPLY: &str = "I've updated the article based on your feedback.";

/// One conversation: the message log, the artifacts it produced and which one
/// is currently being refined.
pub struct Session<P: ModelProvider> {
    provider: P,
    pdf: PdfWorker,
    messages: Vec<Message>,
    artifacts: HashMap<String, Artifact>,
    active_artifact_id: Option<String>,
    is_generating: bool,
}

impl<P: ModelProvider> Session<P> {
    pub fn new(provider: P, pdf: PdfWorker) -> Self {
        Self {
            provider,
            pdf,
            messages: Vec::new(),
            artifacts: HashMap::new(),
            active_artifact_id: None,
            is_generating: false,
        }
    }

    /// Makes previously saved artifacts available for selection and refinement.
    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        self.artifacts.extend(artifacts.into_iter().map(|a| (a.id.clone(), a)));
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn active_artifact(&self) -> Option<&Artifact> {
        self.active_artifact_id.as_ref().and_then(|id| self.artifacts.get(id))
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    /// Clears the active artifact so the next message starts a new article.
    pub fn reset(&mut self) {
        self.active_artifact_id = None;
    }

    pub fn select(&mut self, id: &str) -> Result<&Artifact> {
        let artifact = self.artifacts.get(id)
            .ok_or_else(|| anyhow::anyhow!("No artifact with id {}", id))?;
        self.active_artifact_id = Some(id.to_string());
        Ok(artifact)
    }

    /// Replaces an artifact's HTML, e.g. after a manual edit.
    pub fn set_html(&mut self, id: &str, html: String) -> Result<()> {
        let artifact = self.artifacts.get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("No artifact with id {}", id))?;
        artifact.html = html;
        Ok(())
    }

    /// Handles one user turn and returns the assistant's reply.
    ///
    /// With an active artifact and no attachments the text is treated as
    /// refinement instructions; otherwise a new article is generated. Failures
    /// become an `Error: ...` reply rather than an `Err`.
    pub async fn send_message(&mut self, text: &str, files: Vec<SourceFile>) -> Message {
        let attachments = files.iter()
            .map(|f| Attachment { name: f.name.clone(), mime_type: f.mime_type.clone() })
            .collect();
        self.messages.push(Message::user(text, attachments));
        self.is_generating = true;

        let reply = match self.respond(text, &files).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Generation error: {:#}", e);
                Message::assistant(format!("Error: {}", e), None)
            }
        };

        self.is_generating = false;
        self.messages.push(reply.clone());
        reply
    }

    async fn respond(&mut self, text: &str, files: &[SourceFile]) -> Result<Message> {
        let mut encoded = Vec::with_capacity(files.len());
        let mut context = Vec::new();

        for file in files {
            encoded.push(file.encode());

            if file.is_pdf() {
                let extracted = self.pdf.extract_text(file.data.clone()).await;
                if extracted.is_empty() {
                    warn!("No text extracted from {}", file.name);
                } else {
                    context.push(extracted);
                }
            } else if file.is_text() {
                context.push(process_text_file(file).context_entry());
            }
        }

        if files.is_empty() {
            if let Some(id) = self.active_artifact_id.clone() {
                if let Some(current) = self.artifacts.get(&id).map(|a| a.html.clone()) {
                    let html = update_article(&self.provider, &current, text).await?;
                    self.set_html(&id, html)?;
                    info!("Refined artifact {}", id);
                    return Ok(Message::assistant(REFINED_REPLY, Some(id)));
                }
            }
        }

        let html = generate_kb(&self.provider, text, &encoded, &context.join("\n\n")).await?;
        if html.trim().is_empty() {
            return Err(anyhow::anyhow!("The model returned an empty document"));
        }

        let name = files.first()
            .map(|f| f.name.clone())
            .unwrap_or_else(|| DEFAULT_ARTIFACT_NAME.to_string());
        let original_image = encoded.first().map(|f| f.data_uri());
        let artifact = Artifact::new(name, html, original_image);
        let id = artifact.id.clone();

        info!("Created artifact {} ({})", artifact.name, id);
        self.artifacts.insert(id.clone(), artifact);
        self.active_artifact_id = Some(id.clone());

        Ok(Message::assistant(GENERATED_REPLY, Some(id)))
    }

    /// Looks up an artifact by id or unique prefix.
    pub fn resolve(&self, id: &str) -> Result<&Artifact> {
        if let Some(found) = self.artifacts.get(id) {
            return Ok(found);
        }
        let mut matches = self.artifacts.values().filter(|a| a.id.starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(found), None) => Ok(found),
            (Some(_), Some(_)) => Err(anyhow::anyhow!("Artifact id {} is ambiguous", id)),
            _ => Err(anyhow::anyhow!("No artifact with id {}", id)).context("Use `list` to see saved artifacts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::artifact::Role;
    use crate::ingest::pdf::sample_pdf;
    use crate::llm::mock::MockProvider;
    use crate::llm::provider::ContentPart;

    fn session(provider: MockProvider) -> Session<MockProvider> {
        Session::new(provider, PdfWorker::spawn().unwrap())
    }

    fn file(name: &str, data: &[u8]) -> SourceFile {
        SourceFile::from_bytes(Path::new(name), data.to_vec())
    }

    #[tokio::test]
    async fn first_message_generates_a_default_named_artifact() {
        let mut s = session(MockProvider::with_responses(vec!["<!DOCTYPE html><h1>KB</h1>".into()]));
        let reply = s.send_message("wifi drops", vec![]).await;

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, GENERATED_REPLY);
        let artifact = s.active_artifact().unwrap();
        assert_eq!(artifact.name, DEFAULT_ARTIFACT_NAME);
        assert_eq!(artifact.original_image, None);
        assert_eq!(reply.artifact_id.as_deref(), Some(artifact.id.as_str()));
        assert_eq!(s.messages().len(), 2);
        assert!(!s.is_generating());
    }

    #[tokio::test]
    async fn follow_up_without_files_refines_active_artifact() {
        let provider = MockProvider::with_responses(vec![
            "<h1>v1</h1>".into(),
            "```html\n<h1>v2</h1>".into(),
        ]);
        let mut s = session(provider.clone());
        s.send_message("draft", vec![]).await;
        let id = s.active_artifact().unwrap().id.clone();

        let reply = s.send_message("make it v2", vec![]).await;
        assert_eq!(reply.content, REFINED_REPLY);
        assert_eq!(reply.artifact_id.as_deref(), Some(id.as_str()));
        assert_eq!(s.artifact(&id).unwrap().html, "<h1>v2</h1>");
        assert_eq!(s.artifacts().count(), 1);

        let ContentPart::Text(prompt) = &provider.requests()[1].parts[0] else { panic!("expected text") };
        assert!(prompt.contains("<h1>v1</h1>"));
    }

    #[tokio::test]
    async fn attachments_start_a_new_article_even_when_one_is_active() {
        let mut s = session(MockProvider::with_responses(vec!["<h1>a</h1>".into(), "<h1>b</h1>".into()]));
        s.send_message("first", vec![]).await;
        let first = s.active_artifact().unwrap().id.clone();

        s.send_message("", vec![file("Screen Shot.png", b"img")]).await;
        let second = s.active_artifact().unwrap();
        assert_ne!(second.id, first);
        assert_eq!(second.name, "Screen Shot.png");
        assert_eq!(second.original_image.as_deref(), Some("data:image/png;base64,aW1n"));
        assert_eq!(s.artifacts().count(), 2);

        let user = &s.messages()[2];
        assert_eq!(user.attachments.as_ref().unwrap()[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn images_and_text_files_reach_the_prompt() {
        let provider = MockProvider::with_responses(vec!["<h1>kb</h1>".into()]);
        let mut s = session(provider.clone());
        s.send_message("document this", vec![
            file("shot.png", b"img"),
            file("notes.md", b"# Steps\nreboot"),
        ]).await;

        let request = &provider.requests()[0];
        let ContentPart::Text(ctx) = &request.parts[0] else { panic!("expected text") };
        assert!(ctx.contains("[File notes.md]\n# Steps\nreboot"));
        assert!(ctx.contains("<file name=\"shot.png\" type=\"image/png\" />"));
        assert_eq!(request.parts.len(), 2);
    }

    #[tokio::test]
    async fn unreadable_pdf_still_generates() {
        let provider = MockProvider::with_responses(vec!["<h1>kb</h1>".into()]);
        let mut s = session(provider.clone());
        let reply = s.send_message("", vec![file("broken.pdf", b"not a pdf")]).await;

        assert_eq!(reply.content, GENERATED_REPLY);
        let ContentPart::Text(ctx) = &provider.requests()[0].parts[0] else { panic!("expected text") };
        assert!(!ctx.contains("<extracted_text_content>"));
    }

    #[tokio::test]
    async fn pdf_pages_and_text_files_are_joined_in_order() {
        let provider = MockProvider::with_responses(vec!["<h1>kb</h1>".into()]);
        let mut s = session(provider.clone());
        s.send_message("", vec![
            file("manual.pdf", &sample_pdf(&["AlphaPage", "BetaPage"])),
            file("notes.md", b"reboot"),
        ]).await;

        let ContentPart::Text(ctx) = &provider.requests()[0].parts[0] else { panic!("expected text") };
        assert!(ctx.contains(
            "<extracted_text_content>[Page 1] AlphaPage\n\n[Page 2] BetaPage\n\n[File notes.md]\nreboot</extracted_text_content>"
        ));
    }

    #[tokio::test]
    async fn provider_failure_becomes_error_message() {
        let mut s = session(MockProvider::failing());
        let reply = s.send_message("anything", vec![]).await;

        assert!(reply.content.starts_with("Error: Generation failed: "));
        assert_eq!(reply.artifact_id, None);
        assert!(s.active_artifact().is_none());
        assert!(!s.is_generating());
    }

    #[tokio::test]
    async fn reset_makes_next_message_generate() {
        let mut s = session(MockProvider::with_responses(vec!["<h1>a</h1>".into(), "<h1>b</h1>".into()]));
        s.send_message("one", vec![]).await;
        s.reset();
        let reply = s.send_message("two", vec![]).await;
        assert_eq!(reply.content, GENERATED_REPLY);
        assert_eq!(s.artifacts().count(), 2);
    }

    #[test]
    fn select_and_resolve_saved_artifacts() {
        let mut saved = Artifact::new("saved", "<p/>", None);
        saved.id = "1234-abcd".into();
        let mut s = session(MockProvider::default()).with_artifacts(vec![saved]);

        assert_eq!(s.resolve("1234").unwrap().name, "saved");
        assert!(s.select("nope").is_err());
        s.select("1234-abcd").unwrap();
        s.set_html("1234-abcd", "<p>edited</p>".into()).unwrap();
        assert_eq!(s.active_artifact().unwrap().html, "<p>edited</p>");
    }
}
