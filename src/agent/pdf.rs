//! PDF assistant backed by an OpenAI-compatible chat endpoint

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::agent::PdfAssistant;
use crate::core::{PilotError, Result};
use crate::llm::provider::openai::OpenAiClient;

const PDF_INSTRUCTIONS: &str = "You are a helpful assistant that can analyze the content of a PDF file and give an answer that matches the given task, or retrieve relevant content that matches the task.";

/// Sends the downloaded file inline with the task question
pub struct ChatPdfAssistant {
    client: Arc<OpenAiClient>,
    model: String,
}

impl ChatPdfAssistant {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

async fn read_pdf(pdf: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = tokio::fs::read(pdf)
        .await
        .map_err(|e| PilotError::with_context(format!("reading {}", pdf.display()), e))?;
    let filename = pdf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    Ok((filename, bytes))
}

#[async_trait]
impl PdfAssistant for ChatPdfAssistant {
    async fn answer(&self, pdf: &Path, question: &str) -> Result<String> {
        let (filename, bytes) = read_pdf(pdf).await?;
        info!(file = %filename, bytes = bytes.len(), model = %self.model, "asking about PDF");
        let response = self
            .client
            .ask_about_pdf(&self.model, PDF_INSTRUCTIONS, &filename, &bytes, question)
            .await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;

    #[tokio::test]
    async fn test_read_pdf_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annual-report.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let (filename, bytes) = read_pdf(&path).await.unwrap();
        assert_eq!(filename, "annual-report.pdf");
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let mut config = Config::default();
        config.openai.api_key = "sk-test".to_string();
        let client = Arc::new(OpenAiClient::from_config(&config).unwrap());
        let assistant = ChatPdfAssistant::new(client, "gpt-4o");

        let err = assistant
            .answer(Path::new("/nonexistent/missing.pdf"), "total?")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.pdf"));
    }
}
