//! Manifest document model.
//!
//! A manifest is an XML document with a repeated `FILE` element:
//!
//! ```xml
//! <FILE path="show/ep01.ts">
//!   <SIZE>1048576</SIZE>
//!   <MD5>d41d8cd98f00b204e9800998ecf8427e</MD5>
//!   <DURATION_READABLE>0:40:12.35</DURATION_READABLE>
//! </FILE>
//! ```
//!
//! Each `FILE` element is parsed into a [`ManifestEntry`]. Everything else in
//! the document (declaration, root element, comments, unknown attributes and
//! children) is kept as-is and written back in its original order.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILE_TAG: &[u8] = b"FILE";
const PATH_ATTR: &[u8] = b"path";

/// Error type for manifest parsing and serialization.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not well-formed XML.
    #[error("Malformed manifest XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed attribute in manifest: {0}")]
    Attribute(#[from] AttrError),

    #[error("Malformed escape sequence in manifest: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    /// A `FILE` element has no `path` attribute.
    #[error("FILE element #{index} has no path attribute")]
    MissingPath { index: usize },

    /// The document ended inside a `FILE` element.
    #[error("Manifest ended inside FILE element for {path}")]
    UnexpectedEof { path: String },

    #[error("Manifest is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Child elements of `FILE` that the model reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Size,
    Md5,
    DurationReadable,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"SIZE" => Some(Field::Size),
            b"MD5" => Some(Field::Md5),
            b"DURATION_READABLE" => Some(Field::DurationReadable),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Field::Size => "SIZE",
            Field::Md5 => "MD5",
            Field::DurationReadable => "DURATION_READABLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FieldSlot {
    field: Field,
    start: BytesStart<'static>,
}

#[derive(Debug, Clone, PartialEq)]
enum Child {
    Field(FieldSlot),
    Raw(Event<'static>),
}

impl Child {
    fn is_whitespace(&self) -> bool {
        match self {
            Child::Raw(Event::Text(text)) => text.iter().all(u8::is_ascii_whitespace),
            _ => false,
        }
    }
}

/// One `FILE` record of a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    path: String,
    size: Option<String>,
    checksum: Option<String>,
    duration_readable: Option<String>,

    original_path: String,
    start: BytesStart<'static>,
    self_closing: bool,
    children: Vec<Child>,
}

impl ManifestEntry {
    /// Relative file path as stored in the manifest.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Byte size recorded in `SIZE`, if present and numeric.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.trim().parse().ok())
    }

    /// Sets `SIZE`, creating the element if the entry has none.
    pub fn set_size_bytes(&mut self, size: u64) {
        self.size = Some(size.to_string());
        self.ensure_slot(Field::Size);
    }

    /// Digest recorded in `MD5`, if present.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Sets `MD5`, creating the element if the entry has none.
    pub fn set_checksum(&mut self, digest: impl Into<String>) {
        self.checksum = Some(digest.into());
        self.ensure_slot(Field::Md5);
    }

    /// Raw `DURATION_READABLE` text, if present.
    pub fn duration_readable(&self) -> Option<&str> {
        self.duration_readable.as_deref()
    }

    fn has_slot(&self, field: Field) -> bool {
        self.children
            .iter()
            .any(|c| matches!(c, Child::Field(slot) if slot.field == field))
    }

    // New elements go after the last non-whitespace child, reusing its indentation.
    fn ensure_slot(&mut self, field: Field) {
        if self.has_slot(field) {
            return;
        }

        let pos = self
            .children
            .iter()
            .rposition(|c| !c.is_whitespace())
            .map(|i| i + 1)
            .unwrap_or(0);

        let slot = Child::Field(FieldSlot {
            field,
            start: BytesStart::new(field.tag()),
        });

        let indent = pos
            .checked_sub(2)
            .and_then(|i| self.children.get(i))
            .filter(|c| c.is_whitespace())
            .cloned();

        match indent {
            Some(indent) => {
                self.children.insert(pos, slot);
                self.children.insert(pos, indent);
            }
            None => self.children.insert(pos, slot),
        }
    }

    fn field_value(&self, field: Field) -> &str {
        let value = match field {
            Field::Size => &self.size,
            Field::Md5 => &self.checksum,
            Field::DurationReadable => &self.duration_readable,
        };
        value.as_deref().unwrap_or("")
    }

    fn start_tag(&self) -> BytesStart<'static> {
        if self.path == self.original_path {
            return self.start.clone();
        }

        let name = String::from_utf8_lossy(self.start.name().as_ref()).into_owned();
        let mut start = BytesStart::new(name);
        // Attributes were validated when the entry was parsed.
        for attr in self.start.attributes().flatten() {
            if attr.key.as_ref() == PATH_ATTR {
                start.push_attribute(("path", self.path.as_str()));
            } else {
                start.push_attribute(attr);
            }
        }
        start
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), ManifestError> {
        let start = self.start_tag();
        if self.self_closing && self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start.clone()))?;
        for child in &self.children {
            match child {
                Child::Raw(event) => writer.write_event(event.clone())?,
                Child::Field(slot) => {
                    writer.write_event(Event::Start(slot.start.clone()))?;
                    let value = self.field_value(slot.field);
                    if !value.is_empty() {
                        writer.write_event(Event::Text(BytesText::new(value)))?;
                    }
                    writer.write_event(Event::End(slot.start.to_end()))?;
                }
            }
        }
        writer.write_event(Event::End(start.to_end()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Event(Event<'static>),
    Entry(usize),
}

/// A parsed manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    nodes: Vec<Node>,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parses manifest XML.
    pub fn parse(xml: &str) -> Result<Self, ManifestError> {
        let mut reader = Reader::from_str(xml);
        let mut nodes = Vec::new();
        let mut entries = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Eof => break,
                Event::Start(start) if start.name().as_ref() == FILE_TAG => {
                    let entry = parse_entry(&mut reader, start.into_owned(), false, entries.len())?;
                    nodes.push(Node::Entry(entries.len()));
                    entries.push(entry);
                }
                Event::Empty(start) if start.name().as_ref() == FILE_TAG => {
                    let entry = parse_entry(&mut reader, start.into_owned(), true, entries.len())?;
                    nodes.push(Node::Entry(entries.len()));
                    entries.push(entry);
                }
                event => nodes.push(Node::Event(event.into_owned())),
            }
        }

        Ok(Self { nodes, entries })
    }

    /// Reads and parses a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let xml = fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Entries in document order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ManifestEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the document, entries included, back to XML text.
    pub fn to_xml(&self) -> Result<String, ManifestError> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.nodes {
            match node {
                Node::Event(event) => writer.write_event(event.clone())?,
                Node::Entry(idx) => self.entries[*idx].write(&mut writer)?,
            }
        }
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Writes the serialized document to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), ManifestError> {
        let xml = self.to_xml()?;
        fs::write(path, xml)?;
        Ok(())
    }
}

/// Path of the reconciled manifest written next to `manifest_path`.
///
/// `METADATA.xml` with suffix `-NEW` becomes `METADATA-NEW.xml`.
pub fn derived_output_path(manifest_path: &Path, suffix: &str) -> PathBuf {
    let mut name = manifest_path
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    name.push(".");
    name.push(manifest_path.extension().unwrap_or(OsStr::new("xml")));
    manifest_path.with_file_name(name)
}

fn path_attribute(start: &BytesStart<'_>) -> Result<Option<String>, ManifestError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == PATH_ATTR {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_entry(
    reader: &mut Reader<&[u8]>,
    start: BytesStart<'static>,
    self_closing: bool,
    index: usize,
) -> Result<ManifestEntry, ManifestError> {
    let path = path_attribute(&start)?.ok_or(ManifestError::MissingPath { index })?;

    let mut entry = ManifestEntry {
        path: path.clone(),
        size: None,
        checksum: None,
        duration_readable: None,
        original_path: path,
        start,
        self_closing,
        children: Vec::new(),
    };
    if self_closing {
        return Ok(entry);
    }

    // Depth of nested elements we pass through untouched.
    let mut depth = 0usize;
    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => {
                return Err(ManifestError::UnexpectedEof {
                    path: entry.path.clone(),
                })
            }
            Event::End(_) if depth == 0 => break,
            Event::Start(ref field_start) | Event::Empty(ref field_start) if depth == 0 => {
                let field = Field::from_tag(field_start.name().as_ref())
                    .filter(|f| !entry.has_slot(*f));
                match field {
                    Some(field) => {
                        let value = if matches!(event, Event::Start(_)) {
                            let end = field_start.name().as_ref().to_vec();
                            let raw = reader.read_text(QName(&end))?;
                            quick_xml::escape::unescape(&raw)?.into_owned()
                        } else {
                            String::new()
                        };
                        match field {
                            Field::Size => entry.size = Some(value),
                            Field::Md5 => entry.checksum = Some(value),
                            Field::DurationReadable => entry.duration_readable = Some(value),
                        }
                        entry.children.push(Child::Field(FieldSlot {
                            field,
                            start: field_start.clone().into_owned(),
                        }));
                    }
                    None => {
                        if matches!(event, Event::Start(_)) {
                            depth += 1;
                        }
                        entry.children.push(Child::Raw(event.into_owned()));
                    }
                }
            }
            Event::Start(_) => {
                depth += 1;
                entry.children.push(Child::Raw(event.into_owned()));
            }
            Event::End(_) => {
                depth -= 1;
                entry.children.push(Child::Raw(event.into_owned()));
            }
            other => entry.children.push(Child::Raw(other.into_owned())),
        }
    }

    Ok(entry)
}
