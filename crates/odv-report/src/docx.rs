//! Minimal `.docx` codec
//!
//! A `.docx` file is a zip package. Only `word/document.xml` is parsed; all
//! other parts are carried through byte for byte. The main document is kept
//! as the original XML event stream so that saving rewrites only the text
//! of runs that were changed. Paragraph and run formatting, tables, headers
//! and footers survive untouched.
//!
//! Line breaks (`w:br`) and tabs (`w:tab`) inside a run read as `\n` and
//! `\t`, and are written back as elements when the run text changes.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::{ReportError, Result};

pub const DOCUMENT_PART: &str = "word/document.xml";

const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// A formatted run of text inside a paragraph.
#[derive(Debug, Clone)]
pub struct Run {
    text: String,
    original: String,
    /// Event indices of the text nodes inside the run's `w:t` elements
    slots: Vec<usize>,
    /// Event index of the first `w:t` start tag
    t_start: Option<usize>,
    /// Event indices of the run's `w:br` and `w:tab` elements
    breaks: Vec<usize>,
}

impl Run {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_modified(&self) -> bool {
        self.text != self.original
    }

    /// Runs without a `w:t` element (lone breaks, tabs, drawings) cannot
    /// be rewritten.
    pub fn has_text_slot(&self) -> bool {
        !self.slots.is_empty()
    }
}

/// A paragraph of the main document.
#[derive(Debug, Clone, Default)]
pub struct Paragraph {
    runs: Vec<Run>,
    in_table: bool,
}

impl Paragraph {
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn runs_mut(&mut self) -> &mut [Run] {
        &mut self.runs
    }

    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(Run::text).collect()
    }

    pub fn in_table(&self) -> bool {
        self.in_table
    }
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// An opened `.docx` package.
#[derive(Debug, Clone)]
pub struct DocxDocument {
    parts: Vec<Part>,
    events: Vec<Event<'static>>,
    paragraphs: Vec<Paragraph>,
}

impl DocxDocument {
    /// Open a package from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Read a package from memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            let name = file.name().to_string();
            if file.is_dir() {
                parts.push(Part {
                    name,
                    data: Vec::new(),
                    is_dir: true,
                });
                continue;
            }

            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push(Part {
                name,
                data,
                is_dir: false,
            });
        }

        let document = parts
            .iter()
            .find(|part| part.name == DOCUMENT_PART)
            .ok_or_else(|| ReportError::MissingPart(DOCUMENT_PART.to_string()))?;

        let (events, paragraphs) = parse_document(&document.data)?;
        debug!(
            parts = parts.len(),
            paragraphs = paragraphs.len(),
            "Opened document package"
        );

        Ok(Self {
            parts,
            events,
            paragraphs,
        })
    }

    /// Build a package around the given main document XML.
    pub fn from_document_xml(xml: &str) -> Result<Self> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            (DOCUMENT_PART, xml),
        ] {
            zip.start_file(name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        let bytes = zip.finish()?.into_inner();
        Self::from_bytes(&bytes)
    }

    /// Build a document with one single-run paragraph per entry.
    pub fn from_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Result<Self> {
        let runs: Vec<Vec<&str>> = paragraphs.iter().map(|p| vec![p.as_ref()]).collect();
        Self::from_runs(&runs)
    }

    /// Build a document where each paragraph is split into the given runs.
    pub fn from_runs<S: AsRef<str>>(paragraphs: &[Vec<S>]) -> Result<Self> {
        let mut body = String::new();
        for runs in paragraphs {
            body.push_str("<w:p>");
            for run in runs {
                let escaped = quick_xml::escape::escape(run.as_ref())
                    .replace('\n', "</w:t><w:br/><w:t xml:space=\"preserve\">")
                    .replace('\t', "</w:t><w:tab/><w:t xml:space=\"preserve\">");
                body.push_str("<w:r><w:t xml:space=\"preserve\">");
                body.push_str(&escaped);
                body.push_str("</w:t></w:r>");
            }
            body.push_str("</w:p>");
        }

        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <w:document xmlns:w=\"{WORDML_NS}\"><w:body>{body}</w:body></w:document>"
        );
        Self::from_document_xml(&xml)
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn paragraphs_mut(&mut self) -> &mut [Paragraph] {
        &mut self.paragraphs
    }

    /// Paragraph texts separated by newlines.
    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Names of all package parts in their original order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|part| part.name.as_str())
    }

    /// Serialize the package, rewriting the main document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let document = self.render_document()?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for part in &self.parts {
            if part.is_dir {
                zip.add_directory(part.name.as_str(), options)?;
                continue;
            }

            zip.start_file(part.name.as_str(), options)?;
            if part.name == DOCUMENT_PART {
                zip.write_all(&document)?;
            } else {
                zip.write_all(&part.data)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    fn render_document(&self) -> Result<Vec<u8>> {
        let mut replaced: HashMap<usize, Vec<Event<'static>>> = HashMap::new();
        let mut dropped: HashSet<usize> = HashSet::new();

        let modified = self
            .paragraphs
            .iter()
            .flat_map(|p| p.runs.iter())
            .filter(|run| run.is_modified() && run.has_text_slot());

        for run in modified {
            // The whole run text goes into the first text node, breaks and
            // tabs are rebuilt from it
            for (i, &slot) in run.slots.iter().enumerate() {
                let events = if i == 0 {
                    text_events(&run.text)
                } else {
                    vec![Event::Text(BytesText::new(""))]
                };
                replaced.insert(slot, events);
            }
            dropped.extend(run.breaks.iter().copied());

            if let Some(index) = run.t_start {
                if let Event::Start(start) = &self.events[index] {
                    replaced.insert(index, vec![Event::Start(preserve_space(start))]);
                }
            }
        }

        let mut writer = Writer::new(Vec::new());
        for (index, event) in self.events.iter().enumerate() {
            if dropped.contains(&index) {
                continue;
            }
            match replaced.get(&index) {
                Some(events) => {
                    for event in events {
                        write_event(&mut writer, event)?;
                    }
                }
                None => write_event(&mut writer, event)?,
            }
        }

        Ok(writer.into_inner())
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: &Event<'_>) -> Result<()> {
    writer
        .write_event(event.borrow())
        .map_err(|e| ReportError::Xml(e.to_string()))
}

/// Events for run text placed inside an open `w:t`. Each `\n` closes the
/// element, emits `<w:br/>` and reopens it; `\t` does the same with `<w:tab/>`.
fn text_events(text: &str) -> Vec<Event<'static>> {
    let mut events = Vec::new();
    let mut rest = text;

    while let Some(at) = rest.find(['\n', '\t']) {
        let element = if rest[at..].starts_with('\n') { "w:br" } else { "w:tab" };
        events.push(Event::Text(BytesText::new(&rest[..at]).into_owned()));
        events.push(Event::End(BytesEnd::new("w:t")));
        events.push(Event::Empty(BytesStart::new(element)));
        events.push(Event::Start(
            BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
        ));
        rest = &rest[at + 1..];
    }

    events.push(Event::Text(BytesText::new(rest).into_owned()));
    events
}

/// Text a run-level empty element stands for. Page and column breaks are
/// layout, not text.
fn break_text(element: &BytesStart<'_>) -> Option<char> {
    match element.name().as_ref() {
        b"w:tab" => Some('\t'),
        b"w:cr" => Some('\n'),
        b"w:br" => {
            let kind = element
                .attributes()
                .flatten()
                .find(|attr| attr.key.as_ref() == b"w:type")
                .map(|attr| attr.value.into_owned());
            match kind.as_deref() {
                None | Some(b"textWrapping") => Some('\n'),
                Some(_) => None,
            }
        }
        _ => None,
    }
}

fn preserve_space(start: &BytesStart<'_>) -> BytesStart<'static> {
    let present = start
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"xml:space");

    let mut owned = start.clone().into_owned();
    if !present {
        owned.push_attribute(("xml:space", "preserve"));
    }
    owned
}

fn parse_document(xml: &[u8]) -> Result<(Vec<Event<'static>>, Vec<Paragraph>)> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut events: Vec<Event<'static>> = Vec::new();
    let mut paragraphs: Vec<Paragraph> = Vec::new();

    let mut paragraph_stack: Vec<usize> = Vec::new();
    let mut run_stack: Vec<Run> = Vec::new();
    let mut table_depth = 0usize;
    let mut in_text = false;
    let mut text_seen = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ReportError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?
            .into_owned();
        buf.clear();

        match &event {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => {
                    paragraphs.push(Paragraph {
                        runs: Vec::new(),
                        in_table: table_depth > 0,
                    });
                    paragraph_stack.push(paragraphs.len() - 1);
                }
                b"w:tbl" => table_depth += 1,
                b"w:r" => run_stack.push(Run {
                    text: String::new(),
                    original: String::new(),
                    slots: Vec::new(),
                    t_start: None,
                    breaks: Vec::new(),
                }),
                b"w:t" => {
                    in_text = true;
                    text_seen = false;
                    if let Some(run) = run_stack.last_mut() {
                        run.t_start.get_or_insert(events.len());
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(Paragraph {
                    runs: Vec::new(),
                    in_table: table_depth > 0,
                }),
                b"w:t" => {
                    // Expand `<w:t/>` so the run has a text node to write into
                    if let Some(run) = run_stack.last_mut() {
                        run.t_start.get_or_insert(events.len());
                        run.slots.push(events.len() + 1);
                        events.push(Event::Start(e.clone().into_owned()));
                        events.push(Event::Text(BytesText::new("")));
                        events.push(Event::End(e.to_end().into_owned()));
                        continue;
                    }
                }
                _ => {
                    if let (Some(run), Some(ch)) = (run_stack.last_mut(), break_text(e)) {
                        run.text.push(ch);
                        run.original.push(ch);
                        run.breaks.push(events.len());
                    }
                }
            },
            Event::Text(t) if in_text => {
                if let Some(run) = run_stack.last_mut() {
                    let text = t.unescape().map_err(|e| ReportError::Xml(e.to_string()))?;
                    run.text.push_str(&text);
                    run.original.push_str(&text);
                    run.slots.push(events.len());
                    text_seen = true;
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => {
                    if !text_seen {
                        if let Some(run) = run_stack.last_mut() {
                            run.slots.push(events.len());
                            events.push(Event::Text(BytesText::new("")));
                        }
                    }
                    in_text = false;
                }
                b"w:r" => {
                    if let Some(run) = run_stack.pop() {
                        if let Some(&index) = paragraph_stack.last() {
                            paragraphs[index].runs.push(run);
                        }
                    }
                }
                b"w:p" => {
                    paragraph_stack.pop();
                }
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            _ => {}
        }

        events.push(event);
    }

    Ok((events, paragraphs))
}
