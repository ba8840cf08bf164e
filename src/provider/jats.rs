//! Section extraction from JATS article XML.
//!
//! Only the first `<body>` is read. Every `<sec>` inside it, nested ones
//! included, becomes a section labelled by its direct `<title>` child and
//! holding all descendant text. When no section carries text, each `<p>` in
//! the body becomes a `Paragraph` section instead.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{ExtractedSection, ProviderError, ProviderResult, SectionExtractor};

/// Label used for sections without a title.
pub const UNTITLED_SECTION: &str = "Section";

/// Label used for paragraph-level fallback sections.
pub const PARAGRAPH_SECTION: &str = "Paragraph";

/// Extractor for PMC JATS XML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JatsExtractor;

impl SectionExtractor for JatsExtractor {
    fn extract(&self, raw_document: &str) -> ProviderResult<Vec<ExtractedSection>> {
        extract_sections(raw_document)
    }
}

/// An element whose text is being collected.
struct OpenElement {
    depth: usize,
    slot: usize,
    fragments: Vec<String>,
    title: Option<String>,
}

impl OpenElement {
    fn new(depth: usize, slot: usize) -> Self {
        Self {
            depth,
            slot,
            fragments: Vec::new(),
            title: None,
        }
    }

    fn text(&self) -> String {
        collapse_whitespace(&self.fragments.join(" "))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse `xml` and return `(label, text)` pairs in document order.
///
/// # Errors
/// Returns `ProviderError::ParseError` for malformed XML.
pub fn extract_sections(xml: &str) -> ProviderResult<Vec<ExtractedSection>> {
    let mut reader = Reader::from_str(xml);

    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    let mut secs: Vec<OpenElement> = Vec::new();
    let mut paragraphs: Vec<OpenElement> = Vec::new();
    let mut title: Option<(usize, String)> = None;
    let mut sec_slots: Vec<Option<ExtractedSection>> = Vec::new();
    let mut paragraph_slots: Vec<Option<String>> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            ProviderError::ParseError(format!(
                "invalid XML near byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(e) => {
                depth += 1;
                let name = e.local_name();
                match (body_depth, name.as_ref()) {
                    (None, b"body") => body_depth = Some(depth),
                    (Some(_), b"sec") => {
                        secs.push(OpenElement::new(depth, sec_slots.len()));
                        sec_slots.push(None);
                    }
                    (Some(_), b"p") => {
                        paragraphs.push(OpenElement::new(depth, paragraph_slots.len()));
                        paragraph_slots.push(None);
                    }
                    (Some(_), b"title") => {
                        let is_sec_title = secs
                            .last()
                            .is_some_and(|sec| sec.depth + 1 == depth && sec.title.is_none());
                        if title.is_none() && is_sec_title {
                            title = Some((depth, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if body_depth.is_some() {
                    match e.local_name().as_ref() {
                        b"sec" if secs.last().map(|s| s.depth) == Some(depth) => {
                            if let Some(sec) = secs.pop() {
                                let text = sec.text();
                                if !text.is_empty() {
                                    let label = sec
                                        .title
                                        .as_deref()
                                        .map(collapse_whitespace)
                                        .filter(|t| !t.is_empty())
                                        .unwrap_or_else(|| UNTITLED_SECTION.to_string());
                                    sec_slots[sec.slot] = Some((label, text));
                                }
                            }
                        }
                        b"p" if paragraphs.last().map(|p| p.depth) == Some(depth) => {
                            if let Some(paragraph) = paragraphs.pop() {
                                let text = paragraph.text();
                                if !text.is_empty() {
                                    paragraph_slots[paragraph.slot] = Some(text);
                                }
                            }
                        }
                        b"title" if title.as_ref().map(|(d, _)| *d) == Some(depth) => {
                            if let (Some((_, text)), Some(sec)) = (title.take(), secs.last_mut()) {
                                sec.title = Some(text);
                            }
                        }
                        b"body" if body_depth == Some(depth) => break,
                        _ => {}
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) if body_depth.is_some() => {
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                collect_text(&text, &mut secs, &mut paragraphs, &mut title);
            }
            Event::CData(c) if body_depth.is_some() => {
                let text = String::from_utf8_lossy(&c).into_owned();
                collect_text(&text, &mut secs, &mut paragraphs, &mut title);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let sections: Vec<ExtractedSection> = sec_slots.into_iter().flatten().collect();
    if !sections.is_empty() {
        return Ok(sections);
    }

    Ok(paragraph_slots
        .into_iter()
        .flatten()
        .map(|text| (PARAGRAPH_SECTION.to_string(), text))
        .collect())
}

fn collect_text(
    text: &str,
    secs: &mut [OpenElement],
    paragraphs: &mut [OpenElement],
    title: &mut Option<(usize, String)>,
) {
    if text.trim().is_empty() {
        return;
    }
    for open in secs.iter_mut().chain(paragraphs.iter_mut()) {
        open.fragments.push(text.to_string());
    }
    if let Some((_, buffer)) = title.as_mut() {
        buffer.push_str(text);
        buffer.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<?xml version="1.0"?>
<!DOCTYPE pmc-articleset PUBLIC "-//NLM//DTD ARTICLE SET 2.0//EN" "https://dtd.nlm.nih.gov/ncbi/pmc/articleset/nlm-articleset-2.0.dtd">
<pmc-articleset><article>
  <front><article-meta><title-group><article-title>Ignored</article-title></title-group></article-meta></front>
  <body>
    <sec id="s1">
      <title>Introduction</title>
      <p>Cancer cells reprogram <italic>metabolism</italic> &amp; growth.</p>
    </sec>
    <sec id="s2">
      <title>Results</title>
      <p>Glycolysis increased.</p>
      <sec id="s2.1">
        <title>Lactate</title>
        <p>Lactate accumulated.</p>
      </sec>
    </sec>
    <sec id="s3"><p>No heading here.</p></sec>
  </body>
  <back><ref-list><title>References</title></ref-list></back>
</article></pmc-articleset>"#;

    #[test]
    fn test_sections_in_document_order_with_titles() {
        let sections = extract_sections(ARTICLE).unwrap();
        let labels: Vec<&str> = sections.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Introduction", "Results", "Lactate", UNTITLED_SECTION]);

        assert_eq!(
            sections[0].1,
            "Introduction Cancer cells reprogram metabolism & growth."
        );
    }

    #[test]
    fn test_nested_section_text_is_included_in_parent() {
        let sections = extract_sections(ARTICLE).unwrap();
        let results = &sections[1].1;
        assert!(results.contains("Glycolysis increased."));
        assert!(results.contains("Lactate accumulated."));
        assert_eq!(sections[2].1, "Lactate Lactate accumulated.");
    }

    #[test]
    fn test_paragraph_fallback_without_sections() {
        let xml = "<article><body><p>First paragraph.</p><p> </p><p>Second one.</p></body></article>";
        let sections = extract_sections(xml).unwrap();
        assert_eq!(
            sections,
            vec![
                (PARAGRAPH_SECTION.to_string(), "First paragraph.".to_string()),
                (PARAGRAPH_SECTION.to_string(), "Second one.".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_body_yields_nothing() {
        let xml = "<article><front><p>Abstract only.</p></front></article>";
        assert!(extract_sections(xml).unwrap().is_empty());
    }

    #[test]
    fn test_only_first_body_is_read() {
        let xml = "<a><body><sec><title>One</title><p>x</p></sec></body>\
                   <sub-article><body><sec><title>Two</title><p>y</p></sec></body></sub-article></a>";
        let sections = extract_sections(xml).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, "One");
    }

    #[test]
    fn test_malformed_xml_is_a_parse_error() {
        let xml = "<article><body><sec><p>unclosed</sec></body></article>";
        assert!(matches!(
            JatsExtractor.extract(xml),
            Err(ProviderError::ParseError(_))
        ));
    }
}
