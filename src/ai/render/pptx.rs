use crate::ai::pipeline::{DocumentBody, GeneratedDocument};
use crate::ai::render::{esc, lines, relationships, Package, XML_HEADER};
use crate::Result;

const MAIN_PART: &str = "ppt/presentation.xml";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS: &str = "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
    xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
    xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"";
const CT_BASE: &str = "application/vnd.openxmlformats-officedocument";

// 16:9 in EMU.
const SLIDE_WIDTH: i64 = 12_192_000;
const SLIDE_HEIGHT: i64 = 6_858_000;
const MAX_BULLETS_PER_SLIDE: usize = 8;

const EMPTY_TREE: &str = "<p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
    <p:grpSpPr/></p:spTree></p:cSld>";

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Blueprint">
<a:themeElements>
<a:clrScheme name="Blueprint"><a:dk1><a:srgbClr val="000000"/></a:dk1><a:lt1><a:srgbClr val="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F3864"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="2F5496"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme>
<a:fontScheme name="Blueprint"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme>
<a:fmtScheme name="Blueprint">
<a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst>
<a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst>
<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>
<a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst>
</a:fmtScheme>
</a:themeElements>
</a:theme>"#;

struct Slide {
    title: String,
    bullets: Vec<String>,
}

fn slides(document: &GeneratedDocument) -> Vec<Slide> {
    let mut deck = vec![Slide {
        title: document.document_name.clone(),
        bullets: vec![
            document.analysis.category.clone(),
            format!("{} | {}", document.analysis.knowledge_area, document.analysis.process_group),
        ],
    }];

    match &document.body {
        DocumentBody::Sections { sections } => {
            for section in sections {
                let bullets: Vec<String> = lines(&section.content).map(str::to_string).collect();
                if bullets.is_empty() {
                    deck.push(Slide { title: section.heading.clone(), bullets });
                    continue;
                }
                let parts = bullets.chunks(MAX_BULLETS_PER_SLIDE).count();
                for (i, chunk) in bullets.chunks(MAX_BULLETS_PER_SLIDE).enumerate() {
                    let title = if parts > 1 {
                        format!("{} ({}/{})", section.heading, i + 1, parts)
                    } else {
                        section.heading.clone()
                    };
                    deck.push(Slide { title, bullets: chunk.to_vec() });
                }
            }
        }
        DocumentBody::Table { columns, rows } => {
            for row in rows {
                let title = row.first().cloned().unwrap_or_default();
                let bullets = columns
                    .iter()
                    .zip(row.iter())
                    .skip(1)
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(c, v)| format!("{}: {}", c, v))
                    .collect();
                deck.push(Slide { title, bullets });
            }
        }
    }

    deck
}

fn text_box(id: u32, name: &str, y: i64, height: i64, paragraphs: &str) -> String {
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"{name}\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr>\
         <p:spPr><a:xfrm><a:off x=\"609600\" y=\"{y}\"/><a:ext cx=\"{cx}\" cy=\"{height}\"/></a:xfrm>\
         <a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr>\
         <p:txBody><a:bodyPr wrap=\"square\"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>",
        cx = SLIDE_WIDTH - 2 * 609_600,
    )
}

fn slide_xml(slide: &Slide) -> String {
    let title = format!(
        "<a:p><a:r><a:rPr lang=\"en-US\" sz=\"3600\" b=\"1\"><a:solidFill><a:schemeClr val=\"tx2\"/></a:solidFill></a:rPr>\
         <a:t>{}</a:t></a:r></a:p>",
        esc(&slide.title)
    );

    let mut body = String::new();
    for bullet in &slide.bullets {
        body.push_str(&format!(
            "<a:p><a:pPr marL=\"342900\" indent=\"-342900\"><a:buChar char=\"•\"/></a:pPr>\
             <a:r><a:rPr lang=\"en-US\" sz=\"2000\"/><a:t>{}</a:t></a:r></a:p>",
            esc(bullet)
        ));
    }
    if body.is_empty() {
        body.push_str("<a:p><a:endParaRPr lang=\"en-US\"/></a:p>");
    }

    format!(
        "{XML_HEADER}<p:sld {NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
         <p:grpSpPr/>{}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>",
        text_box(2, "Title", 457_200, 1_143_000, &title),
        text_box(3, "Content", 1_828_800, SLIDE_HEIGHT - 2_438_400, &body),
    )
}

pub fn render(document: &GeneratedDocument) -> Result<Vec<u8>> {
    let deck = slides(document);

    let mut overrides = vec![
        (MAIN_PART.to_string(), format!("{CT_BASE}.presentationml.presentation.main+xml")),
        ("ppt/slideMasters/slideMaster1.xml".into(), format!("{CT_BASE}.presentationml.slideMaster+xml")),
        ("ppt/slideLayouts/slideLayout1.xml".into(), format!("{CT_BASE}.presentationml.slideLayout+xml")),
        ("ppt/theme/theme1.xml".into(), format!("{CT_BASE}.theme+xml")),
    ];
    for n in 1..=deck.len() {
        overrides.push((format!("ppt/slides/slide{}.xml", n), format!("{CT_BASE}.presentationml.slide+xml")));
    }
    let overrides: Vec<(&str, &str)> = overrides.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();

    let mut package = Package::new();
    package.add_manifest(&overrides, MAIN_PART)?;

    // Presentation relationships: master, theme, then one per slide.
    let slide_master_rel = format!("{REL_BASE}/slideMaster");
    let theme_rel = format!("{REL_BASE}/theme");
    let slide_rel = format!("{REL_BASE}/slide");
    let layout_rel = format!("{REL_BASE}/slideLayout");

    let slide_targets: Vec<(String, String)> = (1..=deck.len())
        .map(|n| (format!("rId{}", n + 2), format!("slides/slide{}.xml", n)))
        .collect();
    let mut rels = vec![
        ("rId1", slide_master_rel.as_str(), "slideMasters/slideMaster1.xml"),
        ("rId2", theme_rel.as_str(), "theme/theme1.xml"),
    ];
    for (id, target) in &slide_targets {
        rels.push((id.as_str(), slide_rel.as_str(), target.as_str()));
    }
    package.add("ppt/_rels/presentation.xml.rels", &relationships(&rels))?;

    let slide_ids: String = slide_targets
        .iter()
        .enumerate()
        .map(|(i, (id, _))| format!("<p:sldId id=\"{}\" r:id=\"{}\"/>", 256 + i, id))
        .collect();
    package.add(
        MAIN_PART,
        &format!(
            "{XML_HEADER}<p:presentation {NS}>\
             <p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/></p:sldMasterIdLst>\
             <p:sldIdLst>{slide_ids}</p:sldIdLst>\
             <p:sldSz cx=\"{SLIDE_WIDTH}\" cy=\"{SLIDE_HEIGHT}\"/><p:notesSz cx=\"6858000\" cy=\"9144000\"/></p:presentation>"
        ),
    )?;

    package.add(
        "ppt/slideMasters/slideMaster1.xml",
        &format!(
            "{XML_HEADER}<p:sldMaster {NS}>{EMPTY_TREE}\
             <p:clrMap bg1=\"lt1\" tx1=\"dk1\" bg2=\"lt2\" tx2=\"dk2\" accent1=\"accent1\" accent2=\"accent2\" \
             accent3=\"accent3\" accent4=\"accent4\" accent5=\"accent5\" accent6=\"accent6\" hlink=\"hlink\" folHlink=\"folHlink\"/>\
             <p:sldLayoutIdLst><p:sldLayoutId id=\"2147483649\" r:id=\"rId1\"/></p:sldLayoutIdLst></p:sldMaster>"
        ),
    )?;
    package.add(
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        &relationships(&[
            ("rId1", layout_rel.as_str(), "../slideLayouts/slideLayout1.xml"),
            ("rId2", theme_rel.as_str(), "../theme/theme1.xml"),
        ]),
    )?;
    package.add(
        "ppt/slideLayouts/slideLayout1.xml",
        &format!(
            "{XML_HEADER}<p:sldLayout {NS} type=\"blank\" preserve=\"1\">{EMPTY_TREE}\
             <p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"
        ),
    )?;
    package.add(
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        &relationships(&[("rId1", slide_master_rel.as_str(), "../slideMasters/slideMaster1.xml")]),
    )?;
    package.add("ppt/theme/theme1.xml", THEME)?;

    for (i, slide) in deck.iter().enumerate() {
        let n = i + 1;
        package.add(&format!("ppt/slides/slide{}.xml", n), &slide_xml(slide))?;
        package.add(
            &format!("ppt/slides/_rels/slide{}.xml.rels", n),
            &relationships(&[("rId1", layout_rel.as_str(), "../slideLayouts/slideLayout1.xml")]),
        )?;
    }

    package.finish()
}
