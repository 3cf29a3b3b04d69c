//! Client registry data from uploaded company documents

use odv_report::DocxDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::generator::TextGenerator;
use crate::{ExtractError, Result};

const DOCX_CONTENT_TYPES: [&str; 2] = [
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
];

const RAW_TEXT_PREVIEW: usize = 1000;

const STRING_FIELDS: [&str; 11] = [
    "ragione_sociale",
    "codice_fiscale",
    "telefono",
    "email",
    "pec",
    "indirizzo",
    "citta",
    "provincia",
    "rappresentante_legale",
    "cf_rappresentante",
    "settore_attivita",
];

/// An uploaded document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content,
        }
    }

    /// Text of the document, when its type is readable here.
    pub fn text(&self) -> Option<String> {
        let content_type = self.content_type.trim().to_ascii_lowercase();

        let text = if content_type.starts_with("text/") {
            String::from_utf8_lossy(&self.content).into_owned()
        } else if DOCX_CONTENT_TYPES.contains(&content_type.as_str()) {
            match DocxDocument::from_bytes(&self.content) {
                Ok(document) => document.plain_text(),
                Err(e) => {
                    warn!(filename = %self.filename, error = %e, "Unreadable Word document");
                    return None;
                }
            }
        } else {
            debug!(filename = %self.filename, content_type = %content_type, "Unsupported document type");
            return None;
        };

        (!text.trim().is_empty()).then_some(text)
    }
}

/// Validated client registry data. Fields that failed validation are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ragione_sociale: Option<String>,
    /// VAT number, exactly 11 digits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partita_iva: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codice_fiscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indirizzo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citta: Option<String>,
    /// Postal code, exactly 5 digits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provincia: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rappresentante_legale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cf_rappresentante: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settore_attivita: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_dipendenti: Option<i64>,
}

impl ClientData {
    /// Keep the fields of a generated JSON object that pass validation.
    pub fn from_generated(object: &Map<String, Value>) -> Self {
        let mut data = ClientData {
            partita_iva: digits_field(object.get("partita_iva"), 11),
            cap: digits_field(object.get("cap"), 5),
            numero_dipendenti: object.get("numero_dipendenti").and_then(integer_value),
            ..Default::default()
        };

        for field in STRING_FIELDS {
            let value = object.get(field).and_then(string_value);
            let slot = match field {
                "ragione_sociale" => &mut data.ragione_sociale,
                "codice_fiscale" => &mut data.codice_fiscale,
                "telefono" => &mut data.telefono,
                "email" => &mut data.email,
                "pec" => &mut data.pec,
                "indirizzo" => &mut data.indirizzo,
                "citta" => &mut data.citta,
                "provincia" => &mut data.provincia,
                "rappresentante_legale" => &mut data.rappresentante_legale,
                "cf_rappresentante" => &mut data.cf_rappresentante,
                _ => &mut data.settore_attivita,
            };
            *slot = value;
        }

        data
    }
}

/// Trimmed text of a scalar, `None` for null, empty or structured values.
fn string_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn digits_field(value: Option<&Value>, len: usize) -> Option<String> {
    let cleaned: String = string_value(value?)?
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .collect();

    (cleaned.len() == len && cleaned.chars().all(|c| c.is_ascii_digit())).then_some(cleaned)
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Remove a surrounding markdown code fence.
pub fn strip_code_fence(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Outcome of an extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub data: ClientData,
    /// Start of the text the data was extracted from
    pub raw_text: String,
}

/// Extracts client registry data from company documents through the
/// generative service.
pub struct ClientDataExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl ClientDataExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Combine the readable documents, ask the generator for the client
    /// fields and validate the answer.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn extract(&self, documents: &[SourceDocument]) -> Result<Extraction> {
        let combined = combine_documents(documents).ok_or(ExtractError::NoText)?;

        let response = self.generator.generate(&extraction_prompt(&combined)).await?;
        let json = strip_code_fence(&response);

        let object = match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                return Err(ExtractError::InvalidResponse {
                    reason: "expected a JSON object".to_string(),
                    raw: response,
                })
            }
            Err(e) => {
                return Err(ExtractError::InvalidResponse {
                    reason: e.to_string(),
                    raw: response,
                })
            }
        };

        let data = ClientData::from_generated(&object);
        info!(
            has_vat = data.partita_iva.is_some(),
            has_name = data.ragione_sociale.is_some(),
            "Client data extracted"
        );

        Ok(Extraction {
            data,
            raw_text: preview(&combined),
        })
    }
}

impl std::fmt::Debug for ClientDataExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDataExtractor")
            .field("generator", &self.generator.name())
            .finish()
    }
}

/// `=== <filename> ===` blocks of every readable document, or `None` when
/// no document has text.
pub fn combine_documents(documents: &[SourceDocument]) -> Option<String> {
    let blocks: Vec<String> = documents
        .iter()
        .filter_map(|document| {
            let text = document.text()?;
            Some(format!("=== {} ===\n{}\n", document.filename, text))
        })
        .collect();

    (!blocks.is_empty()).then(|| blocks.join("\n"))
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(RAW_TEXT_PREVIEW) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Analizza il seguente testo estratto da documenti aziendali e estrai le informazioni del cliente.

TESTO DA ANALIZZARE:
{text}

Estrai le seguenti informazioni se presenti:
- ragione_sociale (nome completo dell'azienda)
- partita_iva (11 cifre)
- codice_fiscale (16 caratteri per persone fisiche o 11 per aziende)
- telefono
- email
- pec (email certificata)
- indirizzo (via, numero civico)
- citta
- cap (5 cifre)
- provincia (2 lettere)
- rappresentante_legale (nome e cognome)
- cf_rappresentante (codice fiscale del rappresentante)
- settore_attivita
- numero_dipendenti (solo numero)

IMPORTANTE:
- Restituisci SOLO un JSON valido
- Se un campo non è presente, usa null
- Non aggiungere testo prima o dopo il JSON"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedGenerator {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedGenerator {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    fn visura() -> SourceDocument {
        SourceDocument::new(
            "visura.txt",
            "text/plain; charset=utf-8",
            b"ALFA S.R.L. - P.IVA 12345678901".to_vec(),
        )
    }

    #[test]
    fn test_validation_rules() {
        let object = json!({
            "ragione_sociale": "  ALFA S.R.L. ",
            "partita_iva": "123-456 789 01",
            "cap": 7010,
            "numero_dipendenti": "25",
            "email": "",
            "pec": null,
            "provincia": "BA"
        });

        let data = ClientData::from_generated(object.as_object().unwrap());

        assert_eq!(data.ragione_sociale.as_deref(), Some("ALFA S.R.L."));
        assert_eq!(data.partita_iva.as_deref(), Some("12345678901"));
        assert_eq!(data.cap, None);
        assert_eq!(data.numero_dipendenti, Some(25));
        assert_eq!(data.email, None);
        assert_eq!(data.pec, None);
        assert_eq!(data.provincia.as_deref(), Some("BA"));
    }

    #[test]
    fn test_numeric_fields_from_numbers() {
        let object = json!({ "partita_iva": 12345678901u64, "cap": "70100", "numero_dipendenti": 12.0 });
        let data = ClientData::from_generated(object.as_object().unwrap());

        assert_eq!(data.partita_iva.as_deref(), Some("12345678901"));
        assert_eq!(data.cap.as_deref(), Some("70100"));
        assert_eq!(data.numero_dipendenti, Some(12));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_combine_documents_skips_unreadable() {
        let documents = vec![
            visura(),
            SourceDocument::new("logo.png", "image/png", vec![0x89, 0x50]),
            SourceDocument::new("vuoto.txt", "text/plain", b"   ".to_vec()),
        ];

        assert_eq!(
            combine_documents(&documents).as_deref(),
            Some("=== visura.txt ===\nALFA S.R.L. - P.IVA 12345678901\n")
        );
    }

    #[test]
    fn test_docx_document_text() {
        let bytes = DocxDocument::from_paragraphs(&["Statuto", "BETA SPA"])
            .unwrap()
            .to_bytes()
            .unwrap();
        let document = SourceDocument::new("statuto.docx", DOCX_CONTENT_TYPES[0], bytes);

        assert_eq!(document.text().as_deref(), Some("Statuto\nBETA SPA"));
    }

    #[tokio::test]
    async fn test_extract_parses_fenced_response() {
        let generator = CannedGenerator::new("```json\n{\"ragione_sociale\": \"ALFA S.R.L.\", \"cap\": \"70100\"}\n```");
        let extractor = ClientDataExtractor::new(generator.clone());

        let extraction = extractor.extract(&[visura()]).await.unwrap();

        assert_eq!(extraction.data.ragione_sociale.as_deref(), Some("ALFA S.R.L."));
        assert_eq!(extraction.data.cap.as_deref(), Some("70100"));
        assert!(extraction.raw_text.starts_with("=== visura.txt ==="));
        assert!(generator.prompts.lock().unwrap()[0].contains("P.IVA 12345678901"));
    }

    #[tokio::test]
    async fn test_extract_without_text() {
        let extractor = ClientDataExtractor::new(CannedGenerator::new("{}"));
        let documents = [SourceDocument::new("scan.pdf", "application/pdf", vec![1, 2, 3])];

        assert!(matches!(extractor.extract(&documents).await, Err(ExtractError::NoText)));
    }

    #[tokio::test]
    async fn test_extract_invalid_json() {
        let extractor = ClientDataExtractor::new(CannedGenerator::new("Non ho trovato dati."));

        match extractor.extract(&[visura()]).await {
            Err(ExtractError::InvalidResponse { raw, .. }) => assert_eq!(raw, "Non ho trovato dati."),
            other => panic!("expected invalid response, got {other:?}"),
        }
    }

    #[test]
    fn test_preview_truncates() {
        let long = "a".repeat(1200);
        assert_eq!(preview(&long).len(), 1003);
        assert_eq!(preview("short"), "short");
    }
}
