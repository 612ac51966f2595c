//! OOXML rendering of generated documents.

mod docx;
mod pptx;
mod xlsx;

use std::borrow::Cow;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::ai::pipeline::{DocumentBody, DocumentFormat, GeneratedDocument};
use crate::error::AppError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn render(document: &GeneratedDocument) -> Result<RenderedFile> {
    let bytes = match document.format {
        DocumentFormat::Word => docx::render(document)?,
        DocumentFormat::Excel => xlsx::render(document)?,
        DocumentFormat::PowerPoint => pptx::render(document)?,
    };

    Ok(RenderedFile {
        filename: file_name(&document.document_name, document.format),
        content_type: document.format.content_type(),
        bytes,
    })
}

/// `Risk Register (v2)` becomes `Risk_Register_v2.xlsx`.
pub fn file_name(document_name: &str, format: DocumentFormat) -> String {
    let mut stem = String::with_capacity(document_name.len());
    for c in document_name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            stem.push(c);
        } else if c.is_whitespace() && !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "PM_Document" } else { stem };
    format!("{}.{}", stem, format.extension())
}

pub(crate) fn esc(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

pub(crate) const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

pub(crate) const RELS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";

const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// A zip package under construction.
pub(crate) struct Package {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

fn zip_error(e: impl std::fmt::Display) -> AppError {
    AppError::InternalError(format!("Failed to write document package: {}", e))
}

impl Package {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    pub fn add(&mut self, path: &str, contents: &str) -> Result<()> {
        self.zip.start_file(path, self.options).map_err(zip_error)?;
        self.zip.write_all(contents.as_bytes()).map_err(zip_error)?;
        Ok(())
    }

    /// `[Content_Types].xml` plus the root relationship to `main_part`.
    pub fn add_manifest(&mut self, overrides: &[(&str, &str)], main_part: &str) -> Result<()> {
        let mut types = format!(
            "{XML_HEADER}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
             <Default Extension=\"rels\" ContentType=\"{RELS_CONTENT_TYPE}\"/>\
             <Default Extension=\"xml\" ContentType=\"application/xml\"/>"
        );
        for (part, content_type) in overrides {
            types.push_str(&format!(
                "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
                part, content_type
            ));
        }
        types.push_str("</Types>");
        self.add("[Content_Types].xml", &types)?;

        let rels = relationships(&[("rId1", OFFICE_DOCUMENT_REL, main_part)]);
        self.add("_rels/.rels", &rels)
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.zip.finish().map_err(zip_error)?;
        Ok(cursor.into_inner())
    }
}

/// A `.rels` part. Entries are `(id, type, target)`.
pub(crate) fn relationships(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = format!(
        "{XML_HEADER}<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">"
    );
    for (id, kind, target) in entries {
        xml.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"/>",
            id, kind, target
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

/// Header row plus data rows. Section documents become a two column
/// section/detail grid with one row per line of content.
pub fn tabulate(document: &GeneratedDocument) -> (Vec<String>, Vec<Vec<String>>) {
    match &document.body {
        DocumentBody::Table { columns, rows } => (columns.clone(), rows.clone()),
        DocumentBody::Sections { sections } => {
            let rows = sections
                .iter()
                .flat_map(|s| lines(&s.content).map(move |l| vec![s.heading.clone(), l.to_string()]))
                .collect();
            (vec!["Section".into(), "Detail".into()], rows)
        }
    }
}

/// Splits section text into non-empty lines with list markers removed.
pub(crate) fn lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(|l| l.trim())
        .map(|l| l.trim_start_matches(['-', '*', '•']).trim_start())
        .filter(|l| !l.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::pipeline::{Analysis, DocumentBody, DocumentStructure, Section};
    use chrono::Utc;
    use std::io::Read;

    pub fn document(format: DocumentFormat) -> GeneratedDocument {
        let body = match format {
            DocumentFormat::Excel => DocumentBody::Table {
                columns: vec!["ID".into(), "Risk & Impact".into()],
                rows: vec![vec!["R1".into(), "Vendor <late>".into()]],
            },
            _ => DocumentBody::Sections {
                sections: vec![
                    Section { heading: "Scope".into(), content: "- Migrate EHR\n- Train staff".into() },
                    Section { heading: "Risks & Issues".into(), content: "Data loss".into() },
                ],
            },
        };
        GeneratedDocument {
            document_name: "Risk Register (v2)".into(),
            format,
            analysis: Analysis {
                category: "Risk Register".into(),
                knowledge_area: "Project Risk Management".into(),
                process_group: "Planning".into(),
                recommended_format: format,
                purpose: "Track risks".into(),
            },
            structure: DocumentStructure { format, headings: vec!["Scope".into()] },
            body,
            generated_at: Utc::now(),
        }
    }

    pub fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(file_name("Risk Register (v2)", DocumentFormat::Excel), "Risk_Register_v2.xlsx");
        assert_eq!(file_name("  ", DocumentFormat::Word), "PM_Document.docx");
        assert_eq!(file_name("../../etc", DocumentFormat::PowerPoint), "etc.pptx");
    }

    #[test]
    fn every_format_renders_a_package() {
        for format in [DocumentFormat::Word, DocumentFormat::Excel, DocumentFormat::PowerPoint] {
            let rendered = render(&document(format)).unwrap();
            assert_eq!(rendered.content_type, format.content_type());
            let types = read_part(&rendered.bytes, "[Content_Types].xml");
            assert!(types.contains("<Types"));
            let rels = read_part(&rendered.bytes, "_rels/.rels");
            assert!(rels.contains("officeDocument"));
        }
    }

    #[test]
    fn sections_flatten_into_two_columns() {
        let (columns, rows) = tabulate(&document(DocumentFormat::Word));
        assert_eq!(columns, vec!["Section", "Detail"]);
        assert_eq!(rows[0], vec!["Scope", "Migrate EHR"]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn list_markers_are_stripped() {
        let collected: Vec<&str> = lines("- one\n\n* two\n three").collect();
        assert_eq!(collected, vec!["one", "two", "three"]);
    }
}
