//! Meeting report generation from a transcript

use odv_report::html::strip_tags;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::generator::TextGenerator;
use crate::{ExtractError, Result};

/// Prompt sent for a transcript: the operator's template followed by the
/// tag-stripped transcript inside `<TRASCRIZIONE>` markers.
pub fn build_summary_prompt(template: &str, transcript_html: &str) -> String {
    format!(
        "{}\n\n<TRASCRIZIONE>\n{}\n</TRASCRIZIONE>",
        template.trim(),
        strip_tags(transcript_html)
    )
}

/// Generates report text from meeting transcripts.
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Report text for `transcript_html`, following `template`.
    #[instrument(skip_all, fields(generator = self.generator.name()))]
    pub async fn summarize(&self, template: &str, transcript_html: &str) -> Result<String> {
        if template.trim().is_empty() {
            return Err(ExtractError::MissingPrompt);
        }

        let prompt = build_summary_prompt(template, transcript_html);
        let summary = self.generator.generate(&prompt).await?;

        info!(prompt_len = prompt.len(), summary_len = summary.len(), "Summary generated");
        Ok(summary)
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("generator", &self.generator.name())
            .finish()
    }
}
