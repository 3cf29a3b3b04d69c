//! Report processing for the ODV back-office
//!
//! Turns the text produced by the summarization service into a formatted
//! meeting report:
//!
//! - HTML to plain text conversion that keeps paragraph breaks
//! - Section parsing of the numbered report headings
//! - Placeholder substitution inside a `.docx` template
//! - Transcript and summary formatting for the web editor
//!
//! Parsing and substitution never fail on malformed text: missing
//! sections become empty strings and unknown placeholders stay verbatim.

pub mod docx;
pub mod fields;
pub mod html;
pub mod sections;
pub mod template;
pub mod transcript;

pub use docx::{DocxDocument, Paragraph, Run};
pub use fields::{MeetingDetails, TemplateFieldMap, SECTION_PLACEHOLDERS};
pub use html::html_to_text;
pub use sections::{parse_sections, Heading, Section, SectionBlock, SectionKey, SectionMap, SectionParser};
pub use template::{FillReport, TemplateFiller};
pub use transcript::{format_transcription, html_paragraphs, summary_to_html, transcript_to_docx};

/// Error types for report operations
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid document package: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("Document XML error: {0}")]
    Xml(String),

    #[error("Missing package part: {0}")]
    MissingPart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ReportError>;
