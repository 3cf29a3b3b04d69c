//! Generative text service integration
//!
//! Builds the prompts sent to the summarization service and parses what
//! comes back:
//!
//! - Meeting report text from a transcript and the operator's template
//! - Client registry fields extracted from uploaded company documents
//!
//! The service itself sits behind the [`TextGenerator`] trait.

pub mod extractor;
pub mod generator;
pub mod summarizer;

pub use extractor::{combine_documents, strip_code_fence, ClientData, ClientDataExtractor, Extraction, SourceDocument};
pub use generator::TextGenerator;
pub use summarizer::{build_summary_prompt, Summarizer};

/// Error types for extraction operations
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("No text could be read from the uploaded documents")]
    NoText,

    #[error("Summary prompt template is empty")]
    MissingPrompt,

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Unusable generator response: {reason}")]
    InvalidResponse { reason: String, raw: String },

    #[error("Report error: {0}")]
    Report(#[from] odv_report::ReportError),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractError::InvalidResponse {
            reason: "expected value at line 1 column 1".to_string(),
            raw: "Nessun dato".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unusable generator response: expected value at line 1 column 1"
        );
        assert!(ExtractError::NoText.to_string().contains("documents"));
    }
}
