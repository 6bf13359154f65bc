//! Background PDF text extraction.
//!
//! A single worker thread owns all PDF parsing. Callers hand it a byte buffer
//! and wait on a one-shot reply that is either the ordered per-page text or an
//! error message. Every request carries its own reply channel, so concurrent
//! callers never see each other's results; requests are served in order.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::error::IngestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page: usize,
    pub text: String,
}

/// Reply sent back by the worker for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerReply {
    #[serde(rename = "SUCCESS")]
    Success { payload: Vec<PageText> },
    #[serde(rename = "ERROR")]
    Error { error: String },
}

struct PdfJob {
    data: Vec<u8>,
    reply: oneshot::Sender<WorkerReply>,
}

#[derive(Debug, Clone)]
pub struct PdfWorker {
    tx: mpsc::UnboundedSender<PdfJob>,
}

impl PdfWorker {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PdfJob>();

        thread::Builder::new()
            .name("pdf-worker".into())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    let reply = extract_pages(&job.data);
                    // The caller may have given up waiting.
                    let _ = job.reply.send(reply);
                }
                debug!("PDF worker shutting down");
            })?;

        info!("Started PDF worker thread");
        Ok(Self { tx })
    }

    /// Sends one buffer to the worker and waits for its reply.
    pub async fn request(&self, data: Vec<u8>) -> Result<WorkerReply, IngestError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PdfJob { data, reply })
            .map_err(|_| IngestError::WorkerGone)?;
        rx.await.map_err(|_| IngestError::WorkerGone)
    }

    /// Extracts the text of a PDF as `[Page N] text` blocks separated by blank lines.
    /// Failures are logged and yield an empty string so generation can proceed.
    pub async fn extract_text(&self, data: Vec<u8>) -> String {
        match self.request(data).await {
            Ok(WorkerReply::Success { payload }) => format_pages(&payload),
            Ok(WorkerReply::Error { error }) => {
                error!("PDF worker error: {}", error);
                String::new()
            }
            Err(e) => {
                error!("PDF worker unavailable: {}", e);
                String::new()
            }
        }
    }
}

pub fn format_pages(pages: &[PageText]) -> String {
    pages.iter()
        .map(|p| format!("[Page {}] {}", p.page, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Numbers pages from 1 and collapses each page's whitespace into single spaces.
pub fn number_pages(pages: Vec<String>) -> Vec<PageText> {
    pages.into_iter()
        .enumerate()
        .map(|(i, page)| PageText {
            page: i + 1,
            text: page.split_whitespace().collect::<Vec<_>>().join(" "),
        })
        .collect()
}

fn extract_pages(data: &[u8]) -> WorkerReply {
    // pdf-extract panics on some malformed documents.
    let result = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem_by_pages(data)));

    match result {
        Ok(Ok(pages)) => WorkerReply::Success { payload: number_pages(pages) },
        Ok(Err(e)) => WorkerReply::Error { error: e.to_string() },
        Err(_) => WorkerReply::Error { error: "PDF parser panicked".to_string() },
    }
}

/// Builds a minimal PDF with one Helvetica text line per page.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + i * 2))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", text);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + i * 2
        ));
        objects.push(format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", objects.len() + 1, xref).as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_numbered_and_whitespace_collapsed() {
        let pages = number_pages(vec!["\n\nIntro  text\nmore".into(), "".into(), "Second\tpage ".into()]);
        assert_eq!(pages, vec![
            PageText { page: 1, text: "Intro text more".into() },
            PageText { page: 2, text: "".into() },
            PageText { page: 3, text: "Second page".into() },
        ]);
    }

    #[test]
    fn pages_are_labelled() {
        let pages = vec![
            PageText { page: 1, text: "a".into() },
            PageText { page: 2, text: "b".into() },
        ];
        assert_eq!(format_pages(&pages), "[Page 1] a\n\n[Page 2] b");
    }

    #[test]
    fn reply_protocol_shape() {
        let ok = WorkerReply::Success { payload: vec![PageText { page: 1, text: "x".into() }] };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({ "type": "SUCCESS", "payload": [{ "page": 1, "text": "x" }] })
        );
        let err: WorkerReply = serde_json::from_str(r#"{"type":"ERROR","error":"bad"}"#).unwrap();
        assert_eq!(err, WorkerReply::Error { error: "bad".into() });
    }

    #[tokio::test]
    async fn real_pdf_yields_one_entry_per_page() {
        let worker = PdfWorker::spawn().unwrap();
        let data = sample_pdf(&["AlphaPage", "BetaPage"]);

        let reply = worker.request(data.clone()).await.unwrap();
        assert_eq!(reply, WorkerReply::Success { payload: vec![
            PageText { page: 1, text: "AlphaPage".into() },
            PageText { page: 2, text: "BetaPage".into() },
        ] });
        assert_eq!(worker.extract_text(data).await, "[Page 1] AlphaPage\n\n[Page 2] BetaPage");
    }

    #[tokio::test]
    async fn garbage_input_is_an_error_reply() {
        let worker = PdfWorker::spawn().unwrap();
        let reply = worker.request(b"definitely not a pdf".to_vec()).await.unwrap();
        assert!(matches!(reply, WorkerReply::Error { .. }));
        assert_eq!(worker.extract_text(b"still not a pdf".to_vec()).await, "");
    }

    #[tokio::test]
    async fn concurrent_requests_get_their_own_reply() {
        let worker = PdfWorker::spawn().unwrap();
        let (a, b) = tokio::join!(
            worker.request(b"first".to_vec()),
            worker.request(b"second".to_vec()),
        );
        assert!(matches!(a.unwrap(), WorkerReply::Error { .. }));
        assert!(matches!(b.unwrap(), WorkerReply::Error { .. }));
    }
}
