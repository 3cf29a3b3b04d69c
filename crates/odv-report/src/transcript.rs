//! Transcript and summary formatting for the web editor.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::docx::DocxDocument;
use crate::html::{decode_entities, escape_html, strip_tags};
use crate::Result;

/// Sentence end followed by the start of a new sentence.
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.?!]\s+[A-ZÀ-Ú]").expect("valid regex"));

static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("valid regex"));

static SUMMARY_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*(\d+(?:\.\d+)?)[.)]?\s?(.*?)\*\*$").expect("valid regex"));

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));

/// Turn a raw transcript into `<p>` paragraphs, one per sentence run.
///
/// The text is escaped first. A new paragraph starts after `.`, `?` or `!`
/// followed by whitespace and an upper-case letter.
pub fn format_transcription(raw: &str) -> String {
    let escaped = escape_html(raw);

    let mut pieces = Vec::new();
    let mut from = 0;
    for m in SENTENCE_BREAK.find_iter(&escaped) {
        // Keep the punctuation, drop the whitespace, keep the capital
        let cut = m.start() + 1;
        let capital_len = m.as_str().chars().last().map(char::len_utf8).unwrap_or(0);
        pieces.push(&escaped[from..cut]);
        from = m.end() - capital_len;
    }
    pieces.push(&escaped[from..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| format!("<p>{piece}</p>"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of every `<p>` element, tags stripped and entities decoded.
pub fn html_paragraphs(html: &str) -> Vec<String> {
    PARAGRAPH
        .captures_iter(html)
        .map(|caps| decode_entities(&strip_tags(&caps[1])).trim().to_string())
        .collect()
}

/// A `.docx` with one paragraph per `<p>` of an edited transcript.
pub fn transcript_to_docx(html: &str) -> Result<DocxDocument> {
    DocxDocument::from_paragraphs(&html_paragraphs(html))
}

/// Render a model-generated summary as editor HTML.
///
/// Text that already contains `<p>` or heading tags is returned unchanged.
/// Otherwise `**N title**` lines become `<h2>` (`<h3>` for `N.M`), other
/// `**bold**` spans become `<strong>` and every other non-empty line
/// becomes a paragraph.
pub fn summary_to_html(text: &str) -> String {
    if text.contains("<p>") || text.contains("<h") {
        return text.to_string();
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if let Some(caps) = SUMMARY_HEADING.captures(line) {
                let number = &caps[1];
                let level = if number.contains('.') { 3 } else { 2 };
                let title = format!("{} {}", number, &caps[2]);
                return format!("<h{level}>{}</h{level}>", title.trim());
            }
            format!("<p>{}</p>", BOLD.replace_all(line, "<strong>$1</strong>"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_transcription_splits_sentences() {
        let raw = "Buongiorno a tutti. Iniziamo la riunione? Sì, procediamo! È presente il presidente.";
        assert_eq!(
            format_transcription(raw),
            "<p>Buongiorno a tutti.</p>\n<p>Iniziamo la riunione?</p>\n<p>Sì, procediamo!</p>\n<p>È presente il presidente.</p>"
        );
    }

    #[test]
    fn test_format_transcription_keeps_lowercase_continuations() {
        assert_eq!(
            format_transcription("Art. 6 del decreto. segue testo"),
            "<p>Art. 6 del decreto. segue testo</p>"
        );
    }

    #[test]
    fn test_format_transcription_escapes() {
        assert_eq!(format_transcription("Rossi & C. <srl>"), "<p>Rossi &amp; C. &lt;srl&gt;</p>");
        assert_eq!(format_transcription("   "), "");
    }

    #[test]
    fn test_html_paragraphs() {
        let html = "<p>Prima &amp; unica</p>\n<p class=\"x\"> Seconda <em>riga</em> </p><h2>titolo</h2>";
        assert_eq!(html_paragraphs(html), vec!["Prima & unica", "Seconda riga"]);
    }

    #[test]
    fn test_transcript_to_docx() {
        let doc = transcript_to_docx("<p>Uno.</p><p>Due &#39;bis&#39;.</p>").unwrap();
        assert_eq!(doc.plain_text(), "Uno.\nDue 'bis'.");
    }

    #[test]
    fn test_summary_to_html() {
        let text = "**1 Oggetto della riunione**\nVerifica **annuale** del modello.\n\n**4.1 Premessa**\nIn sede.";
        assert_eq!(
            summary_to_html(text),
            "<h2>1 Oggetto della riunione</h2>\n\
             <p>Verifica <strong>annuale</strong> del modello.</p>\n\
             <h3>4.1 Premessa</h3>\n\
             <p>In sede.</p>"
        );
    }

    #[test]
    fn test_summary_heading_with_dot_after_number() {
        assert_eq!(summary_to_html("**5. Considerazioni**"), "<h2>5 Considerazioni</h2>");
    }

    #[test]
    fn test_summary_already_html_passthrough() {
        let html = "<h2>1 Oggetto</h2><p>testo</p>";
        assert_eq!(summary_to_html(html), html);
    }
}
