use crate::ai::pipeline::{DocumentBody, GeneratedDocument};
use crate::ai::render::{esc, lines, relationships, Package, XML_HEADER};
use crate::Result;

const MAIN_PART: &str = "word/document.xml";
const STYLES_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="120"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:sz w:val="48"/><w:color w:val="1F3864"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Subtitle"><w:name w:val="Subtitle"/><w:basedOn w:val="Normal"/><w:rPr><w:i/><w:color w:val="595959"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/><w:color w:val="2F5496"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="ListBullet"><w:name w:val="List Bullet"/><w:basedOn w:val="Normal"/><w:pPr><w:ind w:left="360" w:hanging="360"/></w:pPr></w:style>
</w:styles>"#;

fn paragraph(style: &str, text: &str) -> String {
    format!(
        "<w:p><w:pPr><w:pStyle w:val=\"{}\"/></w:pPr><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
        style,
        esc(text)
    )
}

fn table(columns: &[String], rows: &[Vec<String>]) -> String {
    let cell = |text: &str, bold: bool| {
        let props = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
        format!(
            "<w:tc><w:p><w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r></w:p></w:tc>",
            props,
            esc(text)
        )
    };

    let mut xml = String::from(
        "<w:tbl><w:tblPr><w:tblStyle w:val=\"TableGrid\"/><w:tblW w:w=\"0\" w:type=\"auto\"/>\
         <w:tblBorders><w:top w:val=\"single\" w:sz=\"4\"/><w:left w:val=\"single\" w:sz=\"4\"/>\
         <w:bottom w:val=\"single\" w:sz=\"4\"/><w:right w:val=\"single\" w:sz=\"4\"/>\
         <w:insideH w:val=\"single\" w:sz=\"4\"/><w:insideV w:val=\"single\" w:sz=\"4\"/></w:tblBorders></w:tblPr>",
    );
    xml.push_str("<w:tr>");
    for column in columns {
        xml.push_str(&cell(column, true));
    }
    xml.push_str("</w:tr>");
    for row in rows {
        xml.push_str("<w:tr>");
        for value in row {
            xml.push_str(&cell(value, false));
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

fn document_xml(document: &GeneratedDocument) -> String {
    let mut body = paragraph("Title", &document.document_name);
    body.push_str(&paragraph(
        "Subtitle",
        &format!(
            "{} | {} | {} process group",
            document.analysis.category, document.analysis.knowledge_area, document.analysis.process_group
        ),
    ));

    match &document.body {
        DocumentBody::Sections { sections } => {
            for section in sections {
                body.push_str(&paragraph("Heading1", &section.heading));
                let bulleted = section.content.lines().any(|l| l.trim_start().starts_with(['-', '*', '•']));
                for line in lines(&section.content) {
                    if bulleted {
                        body.push_str(&paragraph("ListBullet", &format!("• {}", line)));
                    } else {
                        body.push_str(&paragraph("Normal", line));
                    }
                }
            }
        }
        DocumentBody::Table { columns, rows } => body.push_str(&table(columns, rows)),
    }

    format!(
        "{XML_HEADER}<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr><w:pgSz w:w=\"12240\" w:h=\"15840\"/>\
         <w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/>\
         </w:sectPr></w:body></w:document>"
    )
}

pub fn render(document: &GeneratedDocument) -> Result<Vec<u8>> {
    let mut package = Package::new();
    package.add_manifest(
        &[
            (MAIN_PART, "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"),
            ("word/styles.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"),
        ],
        MAIN_PART,
    )?;
    package.add(MAIN_PART, &document_xml(document))?;
    package.add("word/styles.xml", STYLES)?;
    package.add(
        "word/_rels/document.xml.rels",
        &relationships(&[("rId1", STYLES_REL, "styles.xml")]),
    )?;
    package.finish()
}
