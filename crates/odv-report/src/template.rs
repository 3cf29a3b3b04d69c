//! Template placeholder substitution

use odv_core::SubstitutionMode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::docx::{DocxDocument, Paragraph};
use crate::fields::TemplateFieldMap;
use crate::sections::SectionMap;

static UNRESOLVED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[A-Z0-9_]+\}").expect("valid regex"));

/// Outcome of a fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    /// Number of placeholder occurrences replaced
    pub replacements: usize,
    /// Placeholder-shaped tokens still present after the fill
    pub unresolved: Vec<String>,
}

/// Fills `{KEY}` placeholders of a report template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFiller {
    mode: SubstitutionMode,
}

impl TemplateFiller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: SubstitutionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SubstitutionMode {
        self.mode
    }

    /// Build the field map from sections and extras, then fill a copy of
    /// `template`.
    pub fn fill<K, V, I>(&self, sections: &SectionMap, extra_fields: I, template: &DocxDocument) -> DocxDocument
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.fill_with_report(sections, extra_fields, template).0
    }

    /// [`fill`](Self::fill), also returning what was substituted.
    pub fn fill_with_report<K, V, I>(
        &self,
        sections: &SectionMap,
        extra_fields: I,
        template: &DocxDocument,
    ) -> (DocxDocument, FillReport)
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = TemplateFieldMap::from_sections(sections).with_extra(extra_fields);
        let mut document = template.clone();
        let report = self.fill_in_place(&fields, &mut document);
        (document, report)
    }

    /// Substitute every mapped token in body and table paragraphs. Tokens
    /// without a mapping are left as written.
    pub fn fill_in_place(&self, fields: &TemplateFieldMap, document: &mut DocxDocument) -> FillReport {
        let mut replacements = 0;
        for paragraph in document.paragraphs_mut() {
            replacements += match self.mode {
                SubstitutionMode::Run => replace_in_runs(paragraph, fields),
                SubstitutionMode::Paragraph => replace_in_paragraph(paragraph, fields),
            };
        }

        let unresolved: BTreeSet<String> = document
            .paragraphs()
            .iter()
            .flat_map(|p| {
                UNRESOLVED
                    .find_iter(&p.text())
                    .map(|m| m.as_str().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        let unresolved: Vec<String> = unresolved.into_iter().collect();

        if unresolved.is_empty() {
            debug!(replacements, mode = ?self.mode, "Template filled");
        } else {
            warn!(
                replacements,
                unresolved = ?unresolved,
                mode = ?self.mode,
                "Template filled with unresolved placeholders"
            );
        }

        FillReport {
            replacements,
            unresolved,
        }
    }
}

/// Literal replacement inside each run. A token split across runs is not seen.
fn replace_in_runs(paragraph: &mut Paragraph, fields: &TemplateFieldMap) -> usize {
    let mut count = 0;
    for run in paragraph.runs_mut() {
        let mut text = run.text().to_string();
        for (token, value) in fields.iter() {
            let hits = text.matches(token).count();
            if hits > 0 {
                text = text.replace(token, value);
                count += hits;
            }
        }
        if text != run.text() {
            run.set_text(text);
        }
    }
    count
}

/// Replacement over the joined paragraph text. The value lands in the run
/// holding the start of the token, the rest of the token is cut from the
/// runs it spans, and surrounding text keeps its run.
fn replace_in_paragraph(paragraph: &mut Paragraph, fields: &TemplateFieldMap) -> usize {
    let mut count = 0;
    for (token, value) in fields.iter() {
        // Resume after the inserted value so a value containing its own
        // token is not expanded again
        let mut from = 0;
        while let Some(found) = paragraph.text().get(from..).and_then(|rest| rest.find(token)) {
            let start = from + found;
            splice(paragraph, start, start + token.len(), value);
            from = start + value.len();
            count += 1;
        }
    }
    count
}

fn splice(paragraph: &mut Paragraph, start: usize, end: usize, value: &str) {
    let mut offset = 0;
    let mut placed = false;

    for run in paragraph.runs_mut() {
        let text = run.text().to_string();
        let run_start = offset;
        let run_end = offset + text.len();
        offset = run_end;

        if run_end <= start || run_start >= end {
            continue;
        }

        let cut_from = start.saturating_sub(run_start).min(text.len());
        let cut_to = end.saturating_sub(run_start).min(text.len());

        let mut updated = String::with_capacity(text.len() + value.len());
        updated.push_str(&text[..cut_from]);
        if !placed {
            updated.push_str(value);
            placed = true;
        }
        updated.push_str(&text[cut_to..]);
        run.set_text(updated);
    }
}
