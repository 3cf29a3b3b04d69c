//! Generated text to archived report

use chrono::{NaiveDate, Utc};
use odv_core::{ClientInfo, FileType, ReportConfig, SubstitutionMode};
use odv_report::{DocxDocument, FillReport, MeetingDetails, SectionParser, TemplateFiller};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::service::{ArchiveService, UploadedFile};

/// A filled report and what the fill did.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub document: DocxDocument,
    pub fill: FillReport,
    /// Number of sections found in the generated text, 4.1 and 4.2 counting as one
    pub sections: usize,
}

/// Parses generated report text and fills the report template with it.
#[derive(Debug, Clone)]
pub struct ReportPipeline {
    template: DocxDocument,
    parser: SectionParser,
    filler: TemplateFiller,
}

impl ReportPipeline {
    pub fn new(template: DocxDocument, mode: SubstitutionMode) -> Self {
        Self {
            template,
            parser: SectionParser::new(),
            filler: TemplateFiller::with_mode(mode),
        }
    }

    /// Pipeline using the configured template file.
    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        let template = DocxDocument::open(&config.template_path)?;
        Ok(Self::new(template, config.substitution_mode))
    }

    pub fn template(&self) -> &DocxDocument {
        &self.template
    }

    /// Parse `generated_text`, then fill a copy of the template with its
    /// sections and the meeting fields.
    #[instrument(skip_all, fields(report_number = details.report_number))]
    pub fn render(&self, generated_text: &str, details: &MeetingDetails, today: NaiveDate) -> Result<RenderedReport> {
        let extra = details.to_fields(today)?;

        let sections = self.parser.parse(generated_text);
        if sections.is_empty() {
            warn!("No report sections recognized, section placeholders will be empty");
        }

        let (document, fill) = self.filler.fill_with_report(&sections, extra, &self.template);

        info!(
            sections = sections.len(),
            replacements = fill.replacements,
            unresolved = fill.unresolved.len(),
            "Report rendered"
        );

        Ok(RenderedReport {
            document,
            fill,
            sections: sections.len(),
        })
    }

    /// [`render`](Self::render) serialized to `.docx` bytes.
    pub fn render_bytes(&self, generated_text: &str, details: &MeetingDetails, today: NaiveDate) -> Result<Vec<u8>> {
        let rendered = self.render(generated_text, details, today)?;
        Ok(rendered.document.to_bytes()?)
    }

    /// Render and store the report as `verbale_odv_<n>_<timestamp>.docx`.
    pub async fn archive(
        &self,
        archive: &ArchiveService,
        generated_text: &str,
        details: &MeetingDetails,
        client: Option<&ClientInfo>,
    ) -> Result<UploadedFile> {
        let today = Utc::now().date_naive();
        let rendered = self.render(generated_text, details, today)?;
        Self::archive_rendered(archive, &rendered, details, client).await
    }

    /// Store an already rendered report as `verbale_odv_<n>_<timestamp>.docx`.
    pub async fn archive_rendered(
        archive: &ArchiveService,
        rendered: &RenderedReport,
        details: &MeetingDetails,
        client: Option<&ClientInfo>,
    ) -> Result<UploadedFile> {
        let base_name = format!("verbale_odv_{}", details.report_number);
        archive
            .upload_document(&rendered.document, &base_name, &FileType::Report, client)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDrive;
    use odv_core::{ArchiveConfig, NoopNotifier};
    use odv_infra::{RetryPolicy, RetryingClient};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const GENERATED: &str = "<h2>1 Oggetto della riunione</h2><p>Verifica annuale del modello.</p>\
        <h2>4.1 Premessa</h2><p>Il Presidente apre la seduta.</p>\
        <h2>4.2 Argomenti trattati</h2><p>Analisi dei flussi informativi.</p>\
        <h2>6 Conclusioni</h2><p>Nessuna criticità.</p>";

    fn template() -> DocxDocument {
        DocxDocument::from_paragraphs(&[
            "Verbale n. {NUMERO_VERBALE} del {DATA_RIUNIONE}",
            "{SEZIONE_1}",
            "{SEZIONE_4_PREMESSA}",
            "{SEZIONE_4_ARGOMENTI}",
            "{SEZIONE_6}",
            "Redatto il {DATA_REDAZIONE} - {FIRMA}",
        ])
        .unwrap()
    }

    fn details() -> MeetingDetails {
        MeetingDetails {
            verification: "Verifica periodica".to_string(),
            report_number: 7,
            location: "Milano".to_string(),
            meeting_date: "2025-03-14".to_string(),
            start_time: "10:00".to_string(),
            end_time: "11:30".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
    }

    #[test]
    fn test_render_fills_sections_and_details() {
        let pipeline = ReportPipeline::new(template(), SubstitutionMode::Run);
        let rendered = pipeline.render(GENERATED, &details(), today()).unwrap();

        let texts: Vec<String> = rendered.document.paragraphs().iter().map(|p| p.text()).collect();
        assert_eq!(
            texts,
            vec![
                "Verbale n. 7 del 14/03/2025",
                "Verifica annuale del modello.",
                "Il Presidente apre la seduta.",
                "Analisi dei flussi informativi.",
                "Nessuna criticità.",
                "Redatto il 15/03/2025 - {FIRMA}",
            ]
        );
        assert_eq!(rendered.sections, 3);
        assert_eq!(rendered.fill.unresolved, vec!["{FIRMA}".to_string()]);
    }

    #[test]
    fn test_render_without_headings_leaves_sections_empty() {
        let pipeline = ReportPipeline::new(template(), SubstitutionMode::Run);
        let rendered = pipeline.render("testo libero", &details(), today()).unwrap();

        assert_eq!(rendered.sections, 0);
        assert_eq!(rendered.document.paragraphs()[1].text(), "");
    }

    #[test]
    fn test_invalid_meeting_date_rejected() {
        let pipeline = ReportPipeline::new(template(), SubstitutionMode::Run);
        let mut details = details();
        details.meeting_date = "14/03/2025".to_string();

        assert!(pipeline.render(GENERATED, &details, today()).is_err());
    }

    #[test]
    fn test_render_bytes_reopens() {
        let pipeline = ReportPipeline::new(template(), SubstitutionMode::Paragraph);
        let bytes = pipeline.render_bytes(GENERATED, &details(), today()).unwrap();

        let reopened = DocxDocument::from_bytes(&bytes).unwrap();
        assert!(reopened.plain_text().contains("Verbale n. 7 del 14/03/2025"));
    }

    #[tokio::test]
    async fn test_archive_uploads_into_report_folder() {
        let drive = Arc::new(InMemoryDrive::new());
        let retry = RetryingClient::new(RetryPolicy::default(), Arc::new(NoopNotifier));
        let archive = ArchiveService::new(drive, &ArchiveConfig::default(), retry);
        let pipeline = ReportPipeline::new(template(), SubstitutionMode::Run);
        let client = ClientInfo::new("Beta Srl", None);

        let uploaded = pipeline
            .archive(&archive, GENERATED, &details(), Some(&client))
            .await
            .unwrap();

        assert!(uploaded.folder_path.starts_with("Modello231/Beta_Srl/Verbali/"));
        assert!(uploaded.name.starts_with("verbale_odv_7_"));
    }

    #[tokio::test]
    async fn test_archive_rendered_stores_the_rendered_document() {
        let drive = Arc::new(InMemoryDrive::new());
        let retry = RetryingClient::new(RetryPolicy::default(), Arc::new(NoopNotifier));
        let archive = ArchiveService::new(drive.clone(), &ArchiveConfig::default(), retry);
        let pipeline = ReportPipeline::new(template(), SubstitutionMode::Run);

        let rendered = pipeline.render(GENERATED, &details(), today()).unwrap();
        let uploaded = ReportPipeline::archive_rendered(&archive, &rendered, &details(), None)
            .await
            .unwrap();

        let folder = drive.folder_id(&uploaded.folder_path).unwrap();
        let stored = drive.file_content(&folder, &uploaded.name).unwrap();
        let reopened = DocxDocument::from_bytes(&stored).unwrap();
        assert_eq!(reopened.plain_text(), rendered.document.plain_text());
    }
}
