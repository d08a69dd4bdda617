//! Owned markup tree with source positions.
//!
//! The loaders in this crate work on already-parsed trees. [`parse_xml`]
//! builds one from text and [`XmlDocument::to_xml_string`] writes one back.
//! Literal text and CDATA sections stay distinct because the instance
//! language gives them different meanings (event scripts, member scripts).

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{InstanceError, InstanceResult};

/// 1-based line and column.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TextPos {
    pub line: usize,
    pub column: usize,
}

impl TextPos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Same line, `columns` further right.
    pub fn shifted(self, columns: usize) -> Self {
        Self {
            line: self.line,
            column: self.column + columns,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRange {
    pub start: TextPos,
    pub end: TextPos,
}

impl CodeRange {
    pub fn is_multiline(&self) -> bool {
        self.start.line != self.end.line
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub name_range: CodeRange,
    pub range: CodeRange,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlAttribute {
    pub name: String,
    pub name_range: CodeRange,
    pub value: String,
    pub value_range: CodeRange,
    pub range: CodeRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(XmlText),
    CData(XmlCData),
}

/// Literal text, unescaped and trimmed. `range` covers the trimmed content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlText {
    pub content: String,
    pub range: CodeRange,
}

/// Raw text. `range` starts at the `<![CDATA[` opener.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlCData {
    pub content: String,
    pub range: CodeRange,
}

/// Length of `<![CDATA[`, used to move positions onto the section content.
pub const CDATA_OPENER_LEN: usize = 9;

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&XmlAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Element children in document order (skips text and CDATA).
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn push_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push(XmlAttribute {
            name: name.into(),
            value: value.into(),
            ..XmlAttribute::default()
        });
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn push_text(&mut self, content: impl Into<String>) {
        self.children.push(XmlNode::Text(XmlText {
            content: content.into(),
            range: CodeRange::default(),
        }));
    }

    pub fn push_cdata(&mut self, content: impl Into<String>) {
        self.children.push(XmlNode::CData(XmlCData {
            content: content.into(),
            range: CodeRange::default(),
        }));
    }

    /// Literal text, or CDATA when reading would trim or drop the content.
    pub fn push_content(&mut self, content: &str) {
        if content.is_empty() || content.trim() != content {
            self.push_cdata(content);
        } else {
            self.push_text(content);
        }
    }
}

// ─── Reading ─────────────────────────────────────────────────────────────────

/// Maps byte offsets to line/column pairs.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            line_starts,
        }
    }

    fn pos(&self, offset: usize) -> TextPos {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - line_start);
        TextPos::new(line + 1, column + 1)
    }

    fn range(&self, start: usize, end: usize) -> CodeRange {
        CodeRange {
            start: self.pos(start),
            end: self.pos(end),
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> InstanceError {
        let pos = self.pos(offset);
        InstanceError::ParseError {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }
}

/// Parse markup text into an owned tree.
pub fn parse_xml(source: &str) -> InstanceResult<XmlDocument> {
    let lines = LineIndex::new(source);
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    // End offset of the last CDATA section; a section starting right there
    // continues it (`]]>` is written split across two sections).
    let mut cdata_end = None;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|err| lines.error(reader.error_position() as usize, err.to_string()))?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                stack.push(open_element(&e, start, end, &lines)?);
            }
            Event::Empty(e) => {
                let element = open_element(&e, start, end, &lines)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| lines.error(start, "unexpected closing tag"))?;
                element.range.end = lines.pos(end);
                close_element(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                let raw = &source[start..end];
                let content = e.unescape()?;
                let content = content.trim();
                if content.is_empty() {
                    continue;
                }
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| lines.error(start, "text outside of the root element"))?;
                let lead = raw.len() - raw.trim_start().len();
                let trail = raw.len() - raw.trim_end().len();
                parent.children.push(XmlNode::Text(XmlText {
                    content: content.to_string(),
                    range: lines.range(start + lead, end - trail),
                }));
            }
            Event::CData(e) => {
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| lines.error(start, "CDATA outside of the root element"))?;
                let content = std::str::from_utf8(&e)?;
                match parent.children.last_mut() {
                    Some(XmlNode::CData(previous)) if cdata_end == Some(start) => {
                        previous.content.push_str(content);
                        previous.range.end = lines.pos(end);
                    }
                    _ => parent.children.push(XmlNode::CData(XmlCData {
                        content: content.to_string(),
                        range: lines.range(start, end),
                    })),
                }
                cdata_end = Some(end);
            }
            Event::Eof => break,
            // Comments, declarations, processing instructions and doctypes
            // carry nothing the loaders consume.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(InstanceError::ParseError {
            line: open.range.start.line,
            column: open.range.start.column,
            message: format!("element <{}> is never closed", open.name),
        });
    }

    root.map(|root| XmlDocument { root })
        .ok_or(InstanceError::EmptyDocument)
}

fn open_element(
    e: &BytesStart,
    start: usize,
    end: usize,
    lines: &LineIndex,
) -> InstanceResult<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    // Raw tag content begins right after '<'.
    let base = start + 1;
    let raw: &[u8] = e;
    let mut cursor = name.len();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        let key_at = find_bytes(&raw[cursor..], key).map_or(cursor, |i| cursor + i);
        let quote_at = raw[key_at + key.len()..]
            .iter()
            .position(|b| *b == b'"' || *b == b'\'')
            .map_or(key_at + key.len(), |i| key_at + key.len() + i);
        let value_start = quote_at + 1;
        let value_end = value_start + attr.value.len();
        cursor = (value_end + 1).min(raw.len());

        attributes.push(XmlAttribute {
            name: std::str::from_utf8(key)?.to_string(),
            name_range: lines.range(base + key_at, base + key_at + key.len()),
            value: attr.unescape_value()?.into_owned(),
            value_range: lines.range(base + value_start, base + value_end),
            range: lines.range(base + key_at, base + value_end + 1),
        });
    }

    Ok(XmlElement {
        name_range: lines.range(base, base + name.len()),
        range: lines.range(start, end),
        name,
        attributes,
        children: Vec::new(),
    })
}

fn close_element(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> InstanceResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(InstanceError::MultipleRootElements),
    }
    Ok(())
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ─── Writing ─────────────────────────────────────────────────────────────────

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    /// Write the tree as indented markup. Positions are not consulted.
    pub fn to_xml_string(&self) -> InstanceResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        write_element(&mut writer, &self.root)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> InstanceResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for att in &element.attributes {
        start.push_attribute((att.name.as_str(), att.value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(&t.content)))?,
            XmlNode::CData(c) => {
                for section in BytesCData::escaped(&c.content) {
                    writer.write_event(Event::CData(section))?;
                }
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_elements_and_attributes() {
        let doc =
            parse_xml(r#"<Instance ref.Class="Demo"><Button Text="OK"/></Instance>"#).unwrap();
        assert_eq!(doc.root.name, "Instance");
        assert_eq!(doc.root.attribute("ref.Class").unwrap().value, "Demo");
        let button = doc.root.elements().next().unwrap();
        assert_eq!(button.name, "Button");
        assert_eq!(button.attribute("Text").unwrap().value, "OK");
    }

    #[test]
    fn test_attribute_positions() {
        let doc = parse_xml("<A\n  x=\"1\" yy='22'/>").unwrap();
        let x = doc.root.attribute("x").unwrap();
        assert_eq!(x.name_range.start, TextPos::new(2, 3));
        assert_eq!(x.value_range.start, TextPos::new(2, 6));
        let yy = doc.root.attribute("yy").unwrap();
        assert_eq!(yy.name_range.start, TextPos::new(2, 9));
        assert_eq!(yy.value, "22");
    }

    #[test]
    fn test_text_and_cdata_are_distinct() {
        let doc = parse_xml("<A><B> hello &amp; bye </B><C><![CDATA[x < y]]></C></A>").unwrap();
        let mut elements = doc.root.elements();
        let b = elements.next().unwrap();
        match &b.children[..] {
            [XmlNode::Text(t)] => {
                assert_eq!(t.content, "hello & bye");
                assert_eq!(t.range.start, TextPos::new(1, 8));
            }
            other => panic!("Expected one text node, got {:?}", other),
        }
        let c = elements.next().unwrap();
        match &c.children[..] {
            [XmlNode::CData(d)] => assert_eq!(d.content, "x < y"),
            other => panic!("Expected one CDATA node, got {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_only_text_is_dropped() {
        let doc = parse_xml("<A>\n    <B/>\n</A>").unwrap();
        assert_eq!(doc.root.children.len(), 1);
    }

    #[test]
    fn test_cdata_terminator_survives_write() {
        let mut root = XmlElement::new("Script");
        root.push_cdata("if (a[b[0]]>1) f();");
        let text = XmlDocument::new(root).to_xml_string().unwrap();
        assert_eq!(text, "<Script><![CDATA[if (a[b[0]]]]><![CDATA[>1) f();]]></Script>");

        let doc = parse_xml(&text).unwrap();
        match &doc.root.children[..] {
            [XmlNode::CData(c)] => {
                assert_eq!(c.content, "if (a[b[0]]>1) f();");
                assert_eq!(c.range.start, TextPos::new(1, 9));
            }
            other => panic!("Expected one CDATA node, got {:?}", other),
        }
    }

    #[test]
    fn test_separated_cdata_sections_stay_apart() {
        let doc = parse_xml("<A><![CDATA[a]]> <![CDATA[b]]></A>").unwrap();
        assert_eq!(doc.root.children.len(), 2);
    }

    #[test]
    fn test_push_content_keeps_surrounding_whitespace() {
        let mut root = XmlElement::new("Root");
        for value in ["plain", "  4  ", " ", ""] {
            let mut child = XmlElement::new("Value");
            child.push_content(value);
            root.push_element(child);
        }
        let text = XmlDocument::new(root).to_xml_string().unwrap();
        let doc = parse_xml(&text).unwrap();

        let values: Vec<(bool, &str)> = doc
            .root
            .elements()
            .map(|e| match &e.children[..] {
                [XmlNode::Text(t)] => (false, t.content.as_str()),
                [XmlNode::CData(c)] => (true, c.content.as_str()),
                other => panic!("Expected one content node, got {:?}", other),
            })
            .collect();
        assert_eq!(
            values,
            vec![(false, "plain"), (true, "  4  "), (true, " "), (true, "")]
        );
    }

    #[test]
    fn test_multiline_text_range() {
        let doc = parse_xml("<A>line one\nline two</A>").unwrap();
        match &doc.root.children[0] {
            XmlNode::Text(t) => assert!(t.range.is_multiline()),
            other => panic!("Expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_element_is_error() {
        assert!(parse_xml("<A><B></A>").is_err());
        assert!(parse_xml("<A>").is_err());
    }

    #[test]
    fn test_empty_document_is_error() {
        assert!(matches!(parse_xml("  "), Err(InstanceError::EmptyDocument)));
    }

    #[test]
    fn test_multiple_roots_is_error() {
        assert!(matches!(
            parse_xml("<A/><B/>"),
            Err(InstanceError::MultipleRootElements)
        ));
    }

    #[test]
    fn test_write_then_read() {
        let mut root = XmlElement::new("Root");
        root.push_attribute("name", "a \"quoted\" <value>");
        let mut child = XmlElement::new("Child");
        child.push_text("1 < 2");
        root.push_element(child);
        let mut script = XmlElement::new("Script");
        script.push_cdata("if (a < b) {\n}");
        root.push_element(script);

        let text = XmlDocument::new(root).to_xml_string().unwrap();
        let doc = parse_xml(&text).unwrap();
        assert_eq!(doc.root.attribute("name").unwrap().value, "a \"quoted\" <value>");
        let mut elements = doc.root.elements();
        match &elements.next().unwrap().children[..] {
            [XmlNode::Text(t)] => assert_eq!(t.content, "1 < 2"),
            other => panic!("Expected text, got {:?}", other),
        }
        match &elements.next().unwrap().children[..] {
            [XmlNode::CData(c)] => assert_eq!(c.content, "if (a < b) {\n}"),
            other => panic!("Expected CDATA, got {:?}", other),
        }
    }
}
