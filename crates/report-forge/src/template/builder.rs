//! DOCX template injection
//!
//! The template is a regular Word package whose text contains `{{TAG}}`
//! placeholders. Field tags are replaced in place; section tags
//! (`{{DINAMICA_EVENTI}}` and friends) replace their whole paragraph with one
//! paragraph per block of generated text.

use once_cell::sync::Lazy;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};
use crate::types::ReportContext;

/// Template tag to `ReportContext` key
pub const FIELD_TAGS: [(&str, &str); 20] = [
    ("CLIENT", "client"),
    ("CLIENTADDRESS1", "client_address1"),
    ("CLIENTADDRESS2", "client_address2"),
    ("DATE", "date"),
    ("VSRIF", "vs_rif"),
    ("RIFBROKER", "rif_broker"),
    ("POLIZZA", "polizza"),
    ("NSRIF", "ns_rif"),
    ("ASSICURATO", "assicurato"),
    ("INDIRIZZOASSICURATO1", "indirizzo_ass1"),
    ("INDIRIZZOASSICURATO2", "indirizzo_ass2"),
    ("LUOGO", "luogo"),
    ("DATADANNO", "data_danno"),
    ("CAUSE", "cause"),
    ("DATAINCARICO", "data_incarico"),
    ("MERCE", "merce"),
    ("PESOMERCE", "peso_merce"),
    ("VALOREMERCE", "valore_merce"),
    ("DATAINTERVENTO", "data_intervento"),
    ("ALLEGATI", "allegati"),
];

/// Section tag to `ReportContext` key; these expand into paragraphs
pub const SECTION_TAGS: [(&str, &str); 4] = [
    ("DINAMICA_EVENTI", "dinamica_eventi"),
    ("ACCERTAMENTI", "accertamenti"),
    ("QUANTIFICAZIONE", "quantificazione"),
    ("COMMENTO", "commento"),
];

const MAIN_PART: &str = "word/document.xml";

const PARAGRAPH: &[u8] = b"w:p";
const PARAGRAPH_PROPS: &[u8] = b"w:pPr";
const RUN: &[u8] = b"w:r";
const RUN_PROPS: &[u8] = b"w:rPr";
const TEXT: &[u8] = b"w:t";
const BOLD: &[u8] = b"w:b";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));

type XmlEvent = Event<'static>;

fn is_header_or_footer(name: &str) -> bool {
    name.starts_with("word/header") || name.starts_with("word/footer")
}

/// Inject a report context into the template at `template_path`
pub async fn inject(template_path: &Path, ctx: &ReportContext, request_id: &str) -> Result<Vec<u8>> {
    tracing::info!(
        "[{}] Starting document generation with template: {}",
        request_id,
        template_path.display()
    );

    let template = tokio::fs::read(template_path).await.map_err(|e| {
        Error::doc_builder(format!(
            "Cannot read template {}: {}",
            template_path.display(),
            e
        ))
    })?;

    let ctx = ctx.clone();
    let bytes = tokio::task::spawn_blocking(move || inject_bytes(&template, &ctx))
        .await
        .map_err(|e| Error::doc_builder(format!("document generation task failed: {}", e)))??;

    tracing::info!(
        "[{}] Successfully generated document, size: {} bytes",
        request_id,
        bytes.len()
    );
    Ok(bytes)
}

/// Inject a report context into an in-memory template package
pub fn inject_bytes(template: &[u8], ctx: &ReportContext) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(template))
        .map_err(|e| Error::doc_builder(format!("Invalid template package: {}", e)))?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut found_main = false;

    for i in 0..archive.len() {
        let name = archive
            .by_index_raw(i)
            .map_err(|e| Error::doc_builder(format!("Corrupt template entry #{}: {}", i, e)))?
            .name()
            .to_string();

        if name == MAIN_PART || is_header_or_footer(&name) {
            let mut xml = String::new();
            archive
                .by_index(i)
                .and_then(|mut f| f.read_to_string(&mut xml).map_err(Into::into))
                .map_err(|e| Error::doc_builder(format!("Cannot read {}: {}", name, e)))?;

            let is_main = name == MAIN_PART;
            found_main |= is_main;
            let rendered = render_part(&xml, ctx, is_main)?;

            writer
                .start_file(name.as_str(), options)
                .map_err(|e| Error::doc_builder(format!("Cannot write {}: {}", name, e)))?;
            writer
                .write_all(&rendered)
                .map_err(|e| Error::doc_builder(format!("Cannot write {}: {}", name, e)))?;
        } else {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| Error::doc_builder(format!("Corrupt template entry {}: {}", name, e)))?;
            writer
                .raw_copy_file(file)
                .map_err(|e| Error::doc_builder(format!("Cannot copy {}: {}", name, e)))?;
        }
    }

    if !found_main {
        return Err(Error::doc_builder("Template has no word/document.xml part"));
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::doc_builder(format!("Cannot finalize document: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Value for a field tag; `None` for section tags, which are handled per paragraph
fn field_value(tag: &str, ctx: &ReportContext) -> Option<String> {
    let tag = tag.to_uppercase();
    if SECTION_TAGS.iter().any(|(t, _)| *t == tag) {
        return None;
    }
    match FIELD_TAGS.iter().find(|(t, _)| *t == tag) {
        Some((_, key)) => Some(ctx.get(key).unwrap_or_default()),
        None => {
            tracing::debug!("Unknown template tag {{{{{}}}}} replaced with empty text", tag);
            Some(String::new())
        }
    }
}

fn section_for(text: &str) -> Option<&'static str> {
    TAG_RE.captures_iter(text).find_map(|caps| {
        let tag = caps[1].to_uppercase();
        SECTION_TAGS.iter().find(|(t, _)| *t == tag).map(|(_, key)| *key)
    })
}

/// Replace field tags in a plain string, leaving section tags alone
fn substitute(text: &str, ctx: &ReportContext) -> String {
    TAG_RE
        .replace_all(text, |caps: &Captures| match field_value(&caps[1], ctx) {
            Some(value) => value,
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn has_field_tag(text: &str) -> bool {
    TAG_RE
        .captures_iter(text)
        .any(|caps| field_value(&caps[1], &ReportContext::default()).is_some())
}

/// Stream one package part through the paragraph renderer.
///
/// Paragraphs nested in text boxes are rendered first and kept opaque inside
/// their enclosing paragraph. Everything outside `<w:p>` is copied as read.
fn render_part(xml: &str, ctx: &ReportContext, expand_sections: bool) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut open: Vec<Paragraph> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::doc_builder(format!("Malformed XML at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(start) if start.name().as_ref() == PARAGRAPH => {
                open.push(Paragraph {
                    start: start.into_owned(),
                    nodes: Vec::new(),
                });
            }
            Event::End(end) if end.name().as_ref() == PARAGRAPH => {
                let paragraph = open
                    .pop()
                    .ok_or_else(|| Error::doc_builder("Unbalanced </w:p> in template"))?;
                let rendered = paragraph.render(ctx, expand_sections);
                match open.last_mut() {
                    Some(parent) => parent.nodes.push(Node::Nested(rendered)),
                    None => write_events(&mut writer, rendered)?,
                }
            }
            other => match open.last_mut() {
                Some(paragraph) => paragraph.nodes.push(Node::Event(other.into_owned())),
                None => write_events(&mut writer, [other.into_owned()])?,
            },
        }
    }

    if !open.is_empty() {
        return Err(Error::doc_builder("Unclosed <w:p> in template"));
    }
    Ok(writer.into_inner())
}

fn write_events(writer: &mut Writer<Vec<u8>>, events: impl IntoIterator<Item = XmlEvent>) -> Result<()> {
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| Error::doc_builder(format!("Cannot serialize XML: {}", e)))?;
    }
    Ok(())
}

/// Content of a paragraph being rendered
#[derive(Debug, Clone)]
enum Node {
    Event(XmlEvent),
    /// An inner paragraph, already rendered
    Nested(Vec<XmlEvent>),
}

struct Paragraph {
    start: BytesStart<'static>,
    nodes: Vec<Node>,
}

impl Paragraph {
    fn render(self, ctx: &ReportContext, expand_sections: bool) -> Vec<XmlEvent> {
        if expand_sections {
            if let Some(key) = section_for(&direct_text(&self.nodes)) {
                let content = ctx.get(key).unwrap_or_default();
                return self.render_section(&content);
            }
        }
        self.render_fields(ctx)
    }

    fn render_fields(self, ctx: &ReportContext) -> Vec<XmlEvent> {
        let text = direct_text(&self.nodes);
        if !has_field_tag(&text) {
            return wrap(self.start, self.nodes);
        }

        // Tags fully inside one text node keep their run formatting
        let original = self.nodes.clone();
        let nodes = map_text_nodes(self.nodes, |_, inner| {
            TAG_RE
                .is_match(inner)
                .then(|| text_events(&substitute(inner, ctx)))
        });
        if !has_field_tag(&direct_text(&nodes)) {
            return wrap(self.start, nodes);
        }

        // A tag split across runs: the whole text goes into the first node
        let full = substitute(&text, ctx);
        let nodes = map_text_nodes(original, |idx, _| {
            Some(text_events(if idx == 0 { full.as_str() } else { "" }))
        });
        wrap(self.start, nodes)
    }

    /// Expand a section placeholder paragraph into one paragraph per text block
    fn render_section(self, content: &str) -> Vec<XmlEvent> {
        let events: Vec<XmlEvent> = self
            .nodes
            .into_iter()
            .filter_map(|node| match node {
                Node::Event(event) => Some(event),
                Node::Nested(_) => None,
            })
            .collect();

        let ppr = find_element(&events, PARAGRAPH_PROPS).unwrap_or_default();
        let base_rpr = find_element(&events, RUN)
            .and_then(|run| find_element(&run, RUN_PROPS))
            .map(without_bold);

        let blocks: Vec<&str> = content
            .split("\n\n")
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect();

        let mut out = Vec::new();
        if blocks.is_empty() {
            out.push(Event::Start(self.start));
            out.extend(ppr);
            out.extend(run_events("", false, None));
            out.push(Event::End(BytesEnd::new("w:p")));
            return out;
        }

        // Paragraph ids must stay unique, so only the first copy keeps them
        let copy_start = without_paragraph_ids(&self.start);
        for (idx, block) in blocks.iter().enumerate() {
            let start = if idx == 0 { self.start.clone() } else { copy_start.clone() };
            out.push(Event::Start(start));
            out.extend(ppr.iter().cloned());
            for (text, bold) in markdown_runs(block) {
                out.extend(run_events(&text, bold, base_rpr.as_deref()));
            }
            out.push(Event::End(BytesEnd::new("w:p")));
        }
        out
    }
}

fn wrap(start: BytesStart<'static>, nodes: Vec<Node>) -> Vec<XmlEvent> {
    let mut events = vec![Event::Start(start)];
    for node in nodes {
        match node {
            Node::Event(event) => events.push(event),
            Node::Nested(inner) => events.extend(inner),
        }
    }
    events.push(Event::End(BytesEnd::new("w:p")));
    events
}

fn is_named(event: &XmlEvent, name: &[u8]) -> bool {
    match event {
        Event::Start(e) | Event::Empty(e) => e.name().as_ref() == name,
        Event::End(e) => e.name().as_ref() == name,
        _ => false,
    }
}

fn unescaped(text: &BytesText<'_>) -> String {
    text.unescape()
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(text).into_owned())
}

/// Text of the paragraph's own `<w:t>` nodes, ignoring nested paragraphs
fn direct_text(nodes: &[Node]) -> String {
    let mut text = String::new();
    let mut in_text = false;
    for node in nodes {
        let Node::Event(event) = node else { continue };
        match event {
            Event::Start(e) if e.name().as_ref() == TEXT => in_text = true,
            Event::End(e) if e.name().as_ref() == TEXT => in_text = false,
            Event::Text(t) if in_text => text.push_str(&unescaped(t)),
            _ => {}
        }
    }
    text
}

/// Offer every `<w:t>` element (with its index and text) to `f`; a returned
/// event list replaces the element.
fn map_text_nodes<F>(nodes: Vec<Node>, mut f: F) -> Vec<Node>
where
    F: FnMut(usize, &str) -> Option<Vec<XmlEvent>>,
{
    let mut out = Vec::with_capacity(nodes.len());
    let mut element: Option<Vec<XmlEvent>> = None;
    let mut index = 0;

    let mut replace = |events: Vec<XmlEvent>, out: &mut Vec<Node>| {
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                Event::Text(t) => Some(unescaped(t)),
                _ => None,
            })
            .collect();
        let events = f(index, &text).unwrap_or(events);
        out.extend(events.into_iter().map(Node::Event));
        index += 1;
    };

    for node in nodes {
        let Node::Event(event) = node else {
            out.push(node);
            continue;
        };

        if let Some(mut events) = element.take() {
            let closes = matches!(&event, Event::End(e) if e.name().as_ref() == TEXT);
            events.push(event);
            if closes {
                replace(events, &mut out);
            } else {
                element = Some(events);
            }
            continue;
        }

        let opens = matches!(&event, Event::Start(e) if e.name().as_ref() == TEXT);
        let empty = matches!(&event, Event::Empty(e) if e.name().as_ref() == TEXT);
        if opens {
            element = Some(vec![event]);
        } else if empty {
            replace(vec![event], &mut out);
        } else {
            out.push(Node::Event(event));
        }
    }

    if let Some(events) = element {
        out.extend(events.into_iter().map(Node::Event));
    }
    out
}

/// First element called `name` with its whole subtree
fn find_element(events: &[XmlEvent], name: &[u8]) -> Option<Vec<XmlEvent>> {
    let first = events
        .iter()
        .position(|e| matches!(e, Event::Start(_) | Event::Empty(_)) && is_named(e, name))?;
    if matches!(events[first], Event::Empty(_)) {
        return Some(vec![events[first].clone()]);
    }

    let mut depth = 0usize;
    for (offset, event) in events[first..].iter().enumerate() {
        match event {
            Event::Start(e) if e.name().as_ref() == name => depth += 1,
            Event::End(e) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    return Some(events[first..=first + offset].to_vec());
                }
            }
            _ => {}
        }
    }
    None
}

fn without_bold(rpr: Vec<XmlEvent>) -> Vec<XmlEvent> {
    rpr.into_iter().filter(|e| !is_named(e, BOLD)).collect()
}

fn without_paragraph_ids(start: &BytesStart<'static>) -> BytesStart<'static> {
    let attributes: Vec<Attribute> = start
        .attributes()
        .flatten()
        .filter(|a| !matches!(a.key.as_ref(), b"w14:paraId" | b"w14:textId"))
        .collect();
    BytesStart::new("w:p").with_attributes(attributes)
}

/// Insert `<w:b/>` after the style and font elements, which must come first
fn with_bold(rpr: &[XmlEvent]) -> Vec<XmlEvent> {
    let bold = Event::Empty(BytesStart::new("w:b"));
    if let [Event::Empty(_)] = rpr {
        return vec![
            Event::Start(BytesStart::new("w:rPr")),
            bold,
            Event::End(BytesEnd::new("w:rPr")),
        ];
    }

    let leading = rpr
        .iter()
        .skip(1)
        .take_while(|e| match e {
            Event::Empty(s) => matches!(s.name().as_ref(), b"w:rStyle" | b"w:rFonts"),
            Event::Text(t) => t.iter().all(u8::is_ascii_whitespace),
            _ => false,
        })
        .count();

    let mut out = rpr.to_vec();
    out.insert((1 + leading).min(out.len()), bold);
    out
}

/// Split `**bold**` spans into (text, bold) segments
fn markdown_runs(text: &str) -> Vec<(String, bool)> {
    let mut segments = Vec::new();
    let mut pos = 0;
    for m in BOLD_RE.captures_iter(text) {
        let (Some(whole), Some(inner)) = (m.get(0), m.get(1)) else {
            continue;
        };
        if whole.start() > pos {
            segments.push((text[pos..whole.start()].to_string(), false));
        }
        segments.push((inner.as_str().to_string(), true));
        pos = whole.end();
    }
    if pos < text.len() {
        segments.push((text[pos..].to_string(), false));
    }
    segments
}

fn run_events(text: &str, bold: bool, base_rpr: Option<&[XmlEvent]>) -> Vec<XmlEvent> {
    let mut events = vec![Event::Start(BytesStart::new("w:r"))];
    match (bold, base_rpr) {
        (true, Some(rpr)) => events.extend(with_bold(rpr)),
        (true, None) => events.extend([
            Event::Start(BytesStart::new("w:rPr")),
            Event::Empty(BytesStart::new("w:b")),
            Event::End(BytesEnd::new("w:rPr")),
        ]),
        (false, Some(rpr)) => events.extend(rpr.iter().cloned()),
        (false, None) => {}
    }
    events.extend(text_events(text));
    events.push(Event::End(BytesEnd::new("w:r")));
    events
}

/// `<w:t>` elements for `text`; newlines become line breaks
fn text_events(text: &str) -> Vec<XmlEvent> {
    let mut events = Vec::new();
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            events.push(Event::Empty(BytesStart::new("w:br")));
        }
        events.push(Event::Start(
            BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
        ));
        if !line.is_empty() {
            events.push(Event::Text(BytesText::new(line).into_owned()));
        }
        events.push(Event::End(BytesEnd::new("w:t")));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::parser::docx_paragraphs;
    use crate::test_support::build_docx;

    fn events(xml: &str) -> Vec<XmlEvent> {
        let mut reader = Reader::from_str(xml);
        let mut out = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Eof => break,
                event => out.push(event.into_owned()),
            }
        }
        out
    }

    fn serialize(events: Vec<XmlEvent>) -> String {
        let mut writer = Writer::new(Vec::new());
        write_events(&mut writer, events).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    fn rewrite_document(docx: &[u8], edit: impl Fn(&str) -> String) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            if name == MAIN_PART {
                data = edit(&String::from_utf8(data).unwrap()).into_bytes();
            }
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(&data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn document_xml(docx: &[u8]) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut xml = String::new();
        archive.by_name(MAIN_PART).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    fn sample_context() -> ReportContext {
        ReportContext {
            client: Some("ACME & Figli".to_string()),
            polizza: Some("POL-42".to_string()),
            dinamica_eventi: Some("Primo **grassetto** paragrafo.\n\n\n\nSecondo paragrafo.".to_string()),
            allegati: Some(vec!["Nolo".to_string(), "Fattura".to_string()]),
            ..ReportContext::default()
        }
    }

    #[test]
    fn test_field_tags_replaced() {
        let template = build_docx(&["Cliente: {{CLIENT}}", "Polizza {{ POLIZZA }} / {{VSRIF}}", "Fisso"]);
        let out = inject_bytes(&template, &sample_context()).unwrap();

        let paragraphs = docx_paragraphs(&out).unwrap();
        assert_eq!(paragraphs[0], "Cliente: ACME & Figli");
        assert_eq!(paragraphs[1], "Polizza POL-42 / ");
        assert_eq!(paragraphs[2], "Fisso");
    }

    #[test]
    fn test_section_expands_into_paragraphs() {
        let template = build_docx(&["Titolo", "{{DINAMICA_EVENTI}}", "{{COMMENTO}}", "Fine"]);
        let out = inject_bytes(&template, &sample_context()).unwrap();

        let paragraphs = docx_paragraphs(&out).unwrap();
        assert_eq!(
            paragraphs,
            vec!["Titolo", "Primo grassetto paragrafo.", "Secondo paragrafo.", "", "Fine"]
        );

        let xml = document_xml(&out);
        assert!(xml.contains("<w:b/>"));
        assert!(!xml.contains("**"));
        assert!(!xml.contains("{{"));
    }

    #[test]
    fn test_tag_split_across_runs() {
        use docx_rs::{Docx, Paragraph, Run};

        let docx = Docx::new().add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text("Polizza: {{POL"))
                .add_run(Run::new().add_text("IZZA}}")),
        );
        let mut buf = Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();

        let out = inject_bytes(&buf.into_inner(), &sample_context()).unwrap();
        assert_eq!(docx_paragraphs(&out).unwrap()[0], "Polizza: POL-42");
    }

    #[test]
    fn test_allegati_multiline() {
        let template = build_docx(&["{{ALLEGATI}}"]);
        let out = inject_bytes(&template, &sample_context()).unwrap();
        let xml = document_xml(&out);
        assert!(xml.contains("Nolo</w:t><w:br/>"));
        assert!(xml.contains("Fattura"));
    }

    #[test]
    fn test_with_bold_respects_element_order() {
        assert_eq!(
            serialize(with_bold(&events("<w:rPr><w:i/></w:rPr>"))),
            "<w:rPr><w:b/><w:i/></w:rPr>"
        );
        assert_eq!(
            serialize(with_bold(&events(r#"<w:rPr><w:rFonts w:ascii="Arial"/><w:sz w:val="20"/></w:rPr>"#))),
            r#"<w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:sz w:val="20"/></w:rPr>"#
        );
        assert_eq!(serialize(with_bold(&events("<w:rPr/>"))), "<w:rPr><w:b/></w:rPr>");
    }

    #[test]
    fn test_character_references_survive_substitution() {
        let template = rewrite_document(&build_docx(&["Città di {{CLIENT}}", "Perché no"]), |xml| {
            xml.replace("Città", "Citt&#224;").replace("Perché", "Perch&#233;")
        });
        let ctx = ReportContext {
            client: Some("Genova".to_string()),
            ..ReportContext::default()
        };

        let out = inject_bytes(&template, &ctx).unwrap();
        assert_eq!(docx_paragraphs(&out).unwrap()[0], "Città di Genova");

        let xml = document_xml(&out);
        assert!(!xml.contains("&amp;#"));
        assert!(xml.contains("Perch&#233; no"));
    }

    #[test]
    fn test_text_box_paragraphs_rendered_in_place() {
        let xml = concat!(
            "<w:document><w:body>",
            "<w:p><w:r><w:t>Cliente {{CLIENT}}</w:t></w:r>",
            "<w:r><w:pict><w:txbxContent><w:p><w:r><w:t>Polizza {{POLIZZA}}</w:t></w:r></w:p></w:txbxContent></w:pict></w:r>",
            "</w:p>",
            "<w:p><w:r><w:t>Fine</w:t></w:r></w:p>",
            "</w:body></w:document>"
        );

        let out = String::from_utf8(render_part(xml, &sample_context(), true).unwrap()).unwrap();
        assert!(out.contains("Cliente ACME &amp; Figli</w:t>"));
        assert!(out.contains("Polizza POL-42</w:t>"));
        assert!(out.contains("<w:t>Fine</w:t>"));
        assert_eq!(out.matches("<w:p>").count(), 3);
        assert_eq!(out.matches("</w:p>").count(), 3);
        assert!(out.find("Cliente").unwrap() < out.find("Polizza").unwrap());
    }

    #[test]
    fn test_unclosed_paragraph_rejected() {
        let err = render_part("<w:body><w:p><w:r>", &ReportContext::default(), true).unwrap_err();
        assert!(matches!(err, Error::DocBuilder(_)));
    }

    #[test]
    fn test_markdown_runs() {
        assert_eq!(
            markdown_runs("a **b** c"),
            vec![("a ".to_string(), false), ("b".to_string(), true), (" c".to_string(), false)]
        );
        assert_eq!(markdown_runs("plain"), vec![("plain".to_string(), false)]);
    }

    #[test]
    fn test_invalid_template() {
        let err = inject_bytes(b"not a zip", &ReportContext::default()).unwrap_err();
        assert!(matches!(err, Error::DocBuilder(_)));
    }
}
