use crate::ai::pipeline::GeneratedDocument;
use crate::ai::render::{esc, relationships, tabulate, Package, XML_HEADER};
use crate::Result;

const MAIN_PART: &str = "xl/workbook.xml";
const SHEET_PART: &str = "xl/worksheets/sheet1.xml";
const WORKSHEET_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const STYLES_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

// Style 1 is the bold, filled header row.
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><color rgb="FFFFFFFF"/><name val="Calibri"/></font></fonts>
<fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FF2F5496"/><bgColor indexed="64"/></patternFill></fill></fills>
<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment wrapText="1" vertical="top"/></xf></cellXfs>
<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#;

/// `0` → `A`, `25` → `Z`, `26` → `AA`.
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn row_xml(number: usize, cells: &[String], style: u8) -> String {
    let mut xml = format!("<row r=\"{}\">", number);
    for (i, value) in cells.iter().enumerate() {
        xml.push_str(&format!(
            "<c r=\"{}{}\" t=\"inlineStr\" s=\"{}\"><is><t xml:space=\"preserve\">{}</t></is></c>",
            column_letter(i),
            number,
            style,
            esc(value)
        ));
    }
    xml.push_str("</row>");
    xml
}

fn sheet_xml(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut data = row_xml(1, columns, 1);
    for (i, row) in rows.iter().enumerate() {
        data.push_str(&row_xml(i + 2, row, 2));
    }

    let last = format!("{}{}", column_letter(columns.len().saturating_sub(1)), rows.len() + 1);
    format!(
        "{XML_HEADER}<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
         <sheetViews><sheetView workbookViewId=\"0\"><pane ySplit=\"1\" topLeftCell=\"A2\" activePane=\"bottomLeft\" state=\"frozen\"/></sheetView></sheetViews>\
         <sheetFormatPr defaultRowHeight=\"15\"/><cols><col min=\"1\" max=\"{count}\" width=\"28\" customWidth=\"1\"/></cols>\
         <sheetData>{data}</sheetData><autoFilter ref=\"A1:{last}\"/></worksheet>",
        count = columns.len().max(1),
    )
}

/// Excel caps sheet names at 31 characters and forbids a few symbols.
fn sheet_name(category: &str) -> String {
    let cleaned: String = category
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '?' | '*' | '[' | ']' | ':'))
        .take(31)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() { "Sheet1".to_string() } else { cleaned.to_string() }
}

pub fn render(document: &GeneratedDocument) -> Result<Vec<u8>> {
    let (columns, rows) = tabulate(document);

    let workbook = format!(
        "{XML_HEADER}<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
         <sheets><sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>",
        esc(&sheet_name(&document.analysis.category))
    );

    let mut package = Package::new();
    package.add_manifest(
        &[
            (MAIN_PART, "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"),
            (SHEET_PART, "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"),
            ("xl/styles.xml", "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"),
        ],
        MAIN_PART,
    )?;
    package.add(MAIN_PART, &workbook)?;
    package.add(
        "xl/_rels/workbook.xml.rels",
        &relationships(&[
            ("rId1", WORKSHEET_REL, "worksheets/sheet1.xml"),
            ("rId2", STYLES_REL, "styles.xml"),
        ]),
    )?;
    package.add(SHEET_PART, &sheet_xml(&columns, &rows))?;
    package.add("xl/styles.xml", STYLES)?;
    package.finish()
}
