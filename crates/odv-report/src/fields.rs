//! Placeholder field maps

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sections::{SectionKey, SectionMap};
use crate::{ReportError, Result};

/// The eight section placeholders every report template carries.
pub const SECTION_PLACEHOLDERS: [&str; 8] = [
    "{SEZIONE_1}",
    "{SEZIONE_2}",
    "{SEZIONE_3}",
    "{SEZIONE_4}",
    "{SEZIONE_4_PREMESSA}",
    "{SEZIONE_4_ARGOMENTI}",
    "{SEZIONE_5}",
    "{SEZIONE_6}",
];

/// Ordered placeholder token to replacement map.
///
/// Section placeholders come first, extra fields follow in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFieldMap {
    entries: Vec<(String, String)>,
}

impl TemplateFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Section placeholders filled from parsed sections. Absent sections map
    /// to empty strings.
    pub fn from_sections(sections: &SectionMap) -> Self {
        let values = [
            sections.content(SectionKey::Subject),
            sections.content(SectionKey::AuditedProcess),
            sections.content(SectionKey::ExaminedDocuments),
            sections.content(SectionKey::Discussion),
            sections.premessa().to_string(),
            sections.argomenti().to_string(),
            sections.content(SectionKey::Considerations),
            sections.content(SectionKey::Conclusions),
        ];

        let entries = SECTION_PLACEHOLDERS
            .iter()
            .zip(values)
            .map(|(token, value)| (token.to_string(), value))
            .collect();

        Self { entries }
    }

    /// Add every extra field under its `{KEY}` token.
    pub fn with_extra<K, V, I>(mut self, fields: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in fields {
            self.insert(format!("{{{}}}", key.as_ref()), value);
        }
        self
    }

    /// Insert a full token. An existing token keeps its position and takes
    /// the new value.
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == token) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((token, value)),
        }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == token)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Meeting data entered by the operator when the report is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingDetails {
    pub verification: String,
    pub report_number: u32,
    pub location: String,
    /// `YYYY-MM-DD`
    pub meeting_date: String,
    pub start_time: String,
    pub end_time: String,
}

impl MeetingDetails {
    /// Extra template fields for this meeting, dated `today`.
    pub fn to_fields(&self, today: NaiveDate) -> Result<Vec<(String, String)>> {
        let meeting_date = NaiveDate::parse_from_str(self.meeting_date.trim(), "%Y-%m-%d").map_err(|e| {
            ReportError::InvalidField {
                field: "DATA_RIUNIONE".to_string(),
                reason: format!("expected YYYY-MM-DD, got '{}': {e}", self.meeting_date),
            }
        })?;

        Ok(vec![
            ("DATA_RIUNIONE".to_string(), format_date(meeting_date)),
            ("ORARIO_INIZIO".to_string(), self.start_time.clone()),
            ("ORARIO_FINE".to_string(), self.end_time.clone()),
            ("LUOGO_RIUNIONE".to_string(), self.location.clone()),
            ("DATA_REDAZIONE".to_string(), format_date(today)),
            ("NUMERO_VERBALE".to_string(), self.report_number.to_string()),
            ("VERIFICA".to_string(), self.verification.clone()),
        ])
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SectionParser;

    fn details(date: &str) -> MeetingDetails {
        MeetingDetails {
            verification: "Verifica periodica".to_string(),
            report_number: 12,
            location: "Milano".to_string(),
            meeting_date: date.to_string(),
            start_time: "10:00".to_string(),
            end_time: "12:30".to_string(),
        }
    }

    #[test]
    fn test_from_sections_has_all_placeholders() {
        let sections = SectionParser::new().parse("4.1 Premessa\nIntro\n4.2 Argomenti trattati\nPunti\n6 Conclusioni\nOk");
        let map = TemplateFieldMap::from_sections(&sections);

        assert_eq!(map.len(), 8);
        let tokens: Vec<&str> = map.iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, SECTION_PLACEHOLDERS.to_vec());

        assert_eq!(map.get("{SEZIONE_1}"), Some(""));
        assert_eq!(map.get("{SEZIONE_4}"), Some("Intro\n\nPunti"));
        assert_eq!(map.get("{SEZIONE_4_PREMESSA}"), Some("Intro"));
        assert_eq!(map.get("{SEZIONE_4_ARGOMENTI}"), Some("Punti"));
        assert_eq!(map.get("{SEZIONE_6}"), Some("Ok"));
    }

    #[test]
    fn test_extra_fields_wrapped() {
        let map = TemplateFieldMap::from_sections(&SectionMap::new())
            .with_extra([("LUOGO_RIUNIONE", "Torino"), ("SEZIONE_6", "override")]);

        assert_eq!(map.len(), 9);
        assert_eq!(map.get("{LUOGO_RIUNIONE}"), Some("Torino"));
        assert_eq!(map.get("{SEZIONE_6}"), Some("override"));
        assert_eq!(map.get("LUOGO_RIUNIONE"), None);
    }

    #[test]
    fn test_meeting_fields() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let fields = details("2025-03-15").to_fields(today).unwrap();

        let get = |key: &str| fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("DATA_RIUNIONE"), Some("15/03/2025"));
        assert_eq!(get("DATA_REDAZIONE"), Some("20/03/2025"));
        assert_eq!(get("NUMERO_VERBALE"), Some("12"));
        assert_eq!(get("ORARIO_FINE"), Some("12:30"));
        assert_eq!(fields.len(), 7);
    }

    #[test]
    fn test_invalid_meeting_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let err = details("15/03/2025").to_fields(today).unwrap_err();

        assert!(matches!(err, ReportError::InvalidField { ref field, .. } if field == "DATA_RIUNIONE"));
    }
}
