//! Report section parser
//!
//! A generated report is a sequence of numbered headings, each followed by
//! free text:
//!
//! ```text
//! 1 Oggetto della riunione
//! 2 Processo interessato dal controllo dell'OdV
//! 3 Documenti esaminati
//! 4.1 Premessa
//! 4.2 Argomenti trattati
//! 5 Considerazioni
//! 6 Conclusioni
//! ```
//!
//! The parser splits the text on a single alternation of the seven
//! headings and pairs every heading with the text up to the next one.
//! Parsing never fails: absent headings leave no entry and text without
//! any heading yields an empty map.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::html::html_to_text;

/// One of the seven recognized report headings, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Heading {
    Subject,
    AuditedProcess,
    ExaminedDocuments,
    Premise,
    TopicsDiscussed,
    Considerations,
    Conclusions,
}

impl Heading {
    pub const ALL: [Heading; 7] = [
        Heading::Subject,
        Heading::AuditedProcess,
        Heading::ExaminedDocuments,
        Heading::Premise,
        Heading::TopicsDiscussed,
        Heading::Considerations,
        Heading::Conclusions,
    ];

    /// Heading number as printed in the report.
    pub fn number(&self) -> &'static str {
        match self {
            Heading::Subject => "1",
            Heading::AuditedProcess => "2",
            Heading::ExaminedDocuments => "3",
            Heading::Premise => "4.1",
            Heading::TopicsDiscussed => "4.2",
            Heading::Considerations => "5",
            Heading::Conclusions => "6",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Heading::Subject => "Oggetto della riunione",
            Heading::AuditedProcess => "Processo interessato dal controllo dell’OdV",
            Heading::ExaminedDocuments => "Documenti esaminati",
            Heading::Premise => "Premessa",
            Heading::TopicsDiscussed => "Argomenti trattati",
            Heading::Considerations => "Considerazioni",
            Heading::Conclusions => "Conclusioni",
        }
    }

    /// Section the heading contributes to.
    pub fn key(&self) -> SectionKey {
        match self {
            Heading::Subject => SectionKey::Subject,
            Heading::AuditedProcess => SectionKey::AuditedProcess,
            Heading::ExaminedDocuments => SectionKey::ExaminedDocuments,
            Heading::Premise | Heading::TopicsDiscussed => SectionKey::Discussion,
            Heading::Considerations => SectionKey::Considerations,
            Heading::Conclusions => SectionKey::Conclusions,
        }
    }

    fn pattern(&self) -> String {
        let number = regex::escape(self.number());
        let title = match self {
            // The apostrophe comes out typographic, straight or missing
            Heading::AuditedProcess => {
                r"Processo\s+interessato\s+dal\s+controllo\s+dell\s*['’`]?\s*OdV".to_string()
            }
            _ => self
                .title()
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+"),
        };

        // Optional markdown marker before, optional colon and bold close after
        format!(r"(?:#+[ \t]*|\*\*[ \t]*)?\b{number}\.?\s+{title}[ \t]*:*(?:[ \t]*\*\*)?[ \t]*:*")
    }
}

impl std::fmt::Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.number(), self.title())
    }
}

/// Key of a report section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectionKey {
    Subject,
    AuditedProcess,
    ExaminedDocuments,
    Discussion,
    Considerations,
    Conclusions,
}

impl SectionKey {
    pub const ALL: [SectionKey; 6] = [
        SectionKey::Subject,
        SectionKey::AuditedProcess,
        SectionKey::ExaminedDocuments,
        SectionKey::Discussion,
        SectionKey::Considerations,
        SectionKey::Conclusions,
    ];

    pub fn number(&self) -> u8 {
        match self {
            SectionKey::Subject => 1,
            SectionKey::AuditedProcess => 2,
            SectionKey::ExaminedDocuments => 3,
            SectionKey::Discussion => 4,
            SectionKey::Considerations => 5,
            SectionKey::Conclusions => 6,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.number() == number)
    }
}

/// Parsed report section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Section {
    Subject(String),
    AuditedProcess(String),
    ExaminedDocuments(String),
    /// Section 4 only exists through its two sub-headings.
    Discussion {
        premessa: Option<String>,
        argomenti: Option<String>,
    },
    Considerations(String),
    Conclusions(String),
}

impl Section {
    pub fn key(&self) -> SectionKey {
        match self {
            Section::Subject(_) => SectionKey::Subject,
            Section::AuditedProcess(_) => SectionKey::AuditedProcess,
            Section::ExaminedDocuments(_) => SectionKey::ExaminedDocuments,
            Section::Discussion { .. } => SectionKey::Discussion,
            Section::Considerations(_) => SectionKey::Considerations,
            Section::Conclusions(_) => SectionKey::Conclusions,
        }
    }

    /// Section body. For section 4 this is premessa and argomenti
    /// separated by a blank line, skipping the empty ones.
    pub fn content(&self) -> String {
        match self {
            Section::Subject(text)
            | Section::AuditedProcess(text)
            | Section::ExaminedDocuments(text)
            | Section::Considerations(text)
            | Section::Conclusions(text) => text.clone(),
            Section::Discussion { premessa, argomenti } => [premessa, argomenti]
                .into_iter()
                .flatten()
                .filter(|part| !part.is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    fn with_content(key: SectionKey, content: String) -> Self {
        match key {
            SectionKey::Subject => Section::Subject(content),
            SectionKey::AuditedProcess => Section::AuditedProcess(content),
            SectionKey::ExaminedDocuments => Section::ExaminedDocuments(content),
            SectionKey::Discussion => Section::Discussion {
                premessa: Some(content),
                argomenti: None,
            },
            SectionKey::Considerations => Section::Considerations(content),
            SectionKey::Conclusions => Section::Conclusions(content),
        }
    }
}

/// Sections found in a report, keyed by section number.
///
/// Lookups of absent sections return empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMap {
    sections: BTreeMap<SectionKey, Section>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: SectionKey) -> Option<&Section> {
        self.sections.get(&key)
    }

    pub fn content(&self, key: SectionKey) -> String {
        self.get(key).map(Section::content).unwrap_or_default()
    }

    pub fn premessa(&self) -> &str {
        match self.get(SectionKey::Discussion) {
            Some(Section::Discussion {
                premessa: Some(text),
                ..
            }) => text,
            _ => "",
        }
    }

    pub fn argomenti(&self) -> &str {
        match self.get(SectionKey::Discussion) {
            Some(Section::Discussion {
                argomenti: Some(text),
                ..
            }) => text,
            _ => "",
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    /// Store the block found under `heading`. A repeated heading replaces
    /// the earlier block.
    pub fn insert_block(&mut self, heading: Heading, content: String) {
        let key = heading.key();
        match heading {
            Heading::Premise | Heading::TopicsDiscussed => {
                let entry = self.sections.entry(key).or_insert(Section::Discussion {
                    premessa: None,
                    argomenti: None,
                });
                if let Section::Discussion { premessa, argomenti } = entry {
                    if heading == Heading::Premise {
                        *premessa = Some(content);
                    } else {
                        *argomenti = Some(content);
                    }
                }
            }
            _ => {
                self.sections.insert(key, Section::with_content(key, content));
            }
        }
    }
}

/// A heading and the text block that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionBlock {
    pub heading: Heading,
    pub content: String,
    /// Byte offset of the heading in the plain text
    pub offset: usize,
}

static HEADINGS: Lazy<Regex> = Lazy::new(|| {
    let alternation = Heading::ALL
        .iter()
        .map(|heading| format!("({})", heading.pattern()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}")).expect("heading patterns are valid")
});

/// Splits generated reports into sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionParser;

impl SectionParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse HTML or plain text into a section map.
    pub fn parse(&self, text: &str) -> SectionMap {
        let blocks = self.blocks(text);

        let mut map = SectionMap::new();
        for block in blocks {
            map.insert_block(block.heading, block.content);
        }

        if map.is_empty() && !text.trim().is_empty() {
            warn!(len = text.len(), "No report headings recognized, section map is empty");
        }

        map
    }

    /// Heading blocks in document order, repeated headings included.
    pub fn blocks(&self, text: &str) -> Vec<SectionBlock> {
        let plain = html_to_text(text);

        let matches: Vec<(Heading, usize, usize)> = HEADINGS
            .captures_iter(&plain)
            .filter_map(|caps| {
                let index = (1..=Heading::ALL.len()).find(|&i| caps.get(i).is_some())?;
                let whole = caps.get(0)?;
                Some((Heading::ALL[index - 1], whole.start(), whole.end()))
            })
            .collect();

        let blocks: Vec<SectionBlock> = matches
            .iter()
            .enumerate()
            .map(|(i, &(heading, start, end))| {
                let stop = matches.get(i + 1).map(|&(_, next, _)| next).unwrap_or(plain.len());
                SectionBlock {
                    heading,
                    content: plain[end..stop].trim().to_string(),
                    offset: start,
                }
            })
            .collect();

        debug!(headings = blocks.len(), "Parsed report sections");
        blocks
    }
}

/// Parse with the default parser.
pub fn parse_sections(text: &str) -> SectionMap {
    SectionParser::new().parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = "\
1 Oggetto della riunione:
Verifica periodica del modello organizzativo.

2 Processo interessato dal controllo dell’OdV
Gestione degli acquisti.

3 Documenti esaminati
Procedura acquisti rev. 3.

4.1 Premessa
L'OdV si è riunito in videoconferenza.

4.2 Argomenti trattati
Analisi dei flussi informativi.

5 Considerazioni
Nessuna criticità rilevata.

6 Conclusioni
Il modello risulta adeguato.";

    #[test]
    fn test_parse_all_sections() {
        let map = SectionParser::new().parse(REPORT);

        assert_eq!(map.len(), 6);
        assert_eq!(map.content(SectionKey::Subject), "Verifica periodica del modello organizzativo.");
        assert_eq!(map.content(SectionKey::AuditedProcess), "Gestione degli acquisti.");
        assert_eq!(map.content(SectionKey::ExaminedDocuments), "Procedura acquisti rev. 3.");
        assert_eq!(map.premessa(), "L'OdV si è riunito in videoconferenza.");
        assert_eq!(map.argomenti(), "Analisi dei flussi informativi.");
        assert_eq!(map.content(SectionKey::Considerations), "Nessuna criticità rilevata.");
        assert_eq!(map.content(SectionKey::Conclusions), "Il modello risulta adeguato.");
    }

    #[test]
    fn test_seven_blocks_in_document_order() {
        let blocks = SectionParser::new().blocks(REPORT);

        let headings: Vec<Heading> = blocks.iter().map(|b| b.heading).collect();
        assert_eq!(headings, Heading::ALL.to_vec());

        // Non-overlapping and ordered
        for pair in blocks.windows(2) {
            assert!(pair[0].offset + pair[0].content.len() <= pair[1].offset);
        }
    }

    #[test]
    fn test_no_headings_yields_empty_map() {
        let map = SectionParser::new().parse("Testo libero senza alcuna intestazione.");
        assert!(map.is_empty());
        assert_eq!(map.content(SectionKey::Subject), "");
        assert_eq!(map.premessa(), "");

        let map = SectionParser::new().parse("");
        assert!(map.is_empty());
    }

    #[test]
    fn test_heading_without_content_is_empty_string() {
        let map = SectionParser::new().parse("1 Oggetto della riunione\n5 Considerazioni\nTutto in ordine.");

        assert_eq!(map.get(SectionKey::Subject), Some(&Section::Subject(String::new())));
        assert_eq!(map.content(SectionKey::Considerations), "Tutto in ordine.");
        assert!(map.get(SectionKey::Conclusions).is_none());
    }

    #[test]
    fn test_case_insensitive_and_colons() {
        let map = SectionParser::new().parse("6 CONCLUSIONI::\nApprovato.");
        assert_eq!(map.content(SectionKey::Conclusions), "Approvato.");
    }

    #[test]
    fn test_straight_apostrophe_and_dotted_number() {
        let map = SectionParser::new().parse("2. Processo interessato dal controllo dell'OdV\nCiclo passivo.");
        assert_eq!(map.content(SectionKey::AuditedProcess), "Ciclo passivo.");
    }

    #[test]
    fn test_html_input() {
        let html = "<h2>1 Oggetto della riunione</h2><p>Verifica <strong>annuale</strong>.</p>\
                    <h3>4.1 Premessa</h3><p>Riunione in sede.</p>\
                    <h3>4.2 Argomenti trattati</h3><p>Formazione 231.</p>";
        let map = SectionParser::new().parse(html);

        assert_eq!(map.content(SectionKey::Subject), "Verifica annuale.");
        assert_eq!(map.premessa(), "Riunione in sede.");
        assert_eq!(map.argomenti(), "Formazione 231.");
        assert_eq!(
            map.content(SectionKey::Discussion),
            "Riunione in sede.\n\nFormazione 231."
        );
    }

    #[test]
    fn test_markdown_bold_headings() {
        let map = SectionParser::new().parse("**5 Considerazioni**\nNessuna.\n**6 Conclusioni:**\nFine.");
        assert_eq!(map.content(SectionKey::Considerations), "Nessuna.");
        assert_eq!(map.content(SectionKey::Conclusions), "Fine.");
    }

    #[test]
    fn test_only_premessa_present() {
        let map = SectionParser::new().parse("4.1 Premessa\nSolo premessa.");

        assert_eq!(
            map.get(SectionKey::Discussion),
            Some(&Section::Discussion {
                premessa: Some("Solo premessa.".to_string()),
                argomenti: None,
            })
        );
        assert_eq!(map.argomenti(), "");
        assert_eq!(map.content(SectionKey::Discussion), "Solo premessa.");
    }

    #[test]
    fn test_repeated_heading_last_wins() {
        let map = SectionParser::new().parse("5 Considerazioni\nprima\n5 Considerazioni\nseconda");
        assert_eq!(map.content(SectionKey::Considerations), "seconda");
        assert_eq!(SectionParser::new().blocks("5 Considerazioni\na\n5 Considerazioni\nb").len(), 2);
    }

    #[test]
    fn test_year_is_not_a_heading() {
        let map = SectionParser::new().parse("Nel 2025 Considerazioni generali sono state espresse.");
        assert!(map.is_empty());
    }

    #[test]
    fn test_preamble_before_first_heading_is_ignored() {
        let map = parse_sections("VERBALE DELLA RIUNIONE\n1 Oggetto della riunione\nControllo.");
        assert_eq!(map.len(), 1);
        assert_eq!(map.content(SectionKey::Subject), "Controllo.");
    }

    #[test]
    fn test_section_key_numbers() {
        assert_eq!(SectionKey::from_number(4), Some(SectionKey::Discussion));
        assert_eq!(SectionKey::from_number(7), None);
        assert_eq!(Heading::Premise.to_string(), "4.1 Premessa");
    }

    #[test]
    fn test_section_wire_form() {
        let json = serde_json::to_value(Section::Discussion {
            premessa: Some("Apertura".to_string()),
            argomenti: None,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "discussion",
                "content": { "premessa": "Apertura", "argomenti": null }
            })
        );

        let subject: Section = serde_json::from_str(r#"{"kind":"subject","content":"Verifica"}"#).unwrap();
        assert_eq!(subject, Section::Subject("Verifica".to_string()));
    }
}
