//! The `Third_Party_Libs.xml` manifest.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::ModuleRecord;

const ROOT: &str = "ThirdPartyLibs";
const ASSEMBLY: &str = "Assembly";

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| Error::Serialize {
        message: e.to_string(),
    })
}

fn is_xml_char(c: char) -> bool {
    !matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}'
    )
}

/// Drops characters XML 1.0 cannot represent, even as references.
fn xml_safe(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_xml_char) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(&xml_safe(value))))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

/// The manifest for one export: a `ThirdPartyLibs` root holding one
/// `Assembly` element per record, in record order.
#[derive(Debug, Clone, Copy)]
pub struct ExportDocument<'a> {
    records: &'a [ModuleRecord],
}

impl<'a> ExportDocument<'a> {
    pub fn new(records: &'a [ModuleRecord]) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the document, declaration included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        )?;

        if self.is_empty() {
            emit(&mut writer, Event::Empty(BytesStart::new(ROOT)))?;
        } else {
            emit(&mut writer, Event::Start(BytesStart::new(ROOT)))?;
            for record in self.records {
                let mut assembly = BytesStart::new(ASSEMBLY);
                assembly.push_attribute(("Title", &*xml_safe(&record.title)));
                assembly.push_attribute(("Version", &*xml_safe(&record.version)));
                emit(&mut writer, Event::Start(assembly))?;

                text_element(&mut writer, "Description", &record.description)?;
                text_element(&mut writer, "AssemblyFile", &record.file_name)?;
                text_element(&mut writer, "Company", &record.company)?;
                text_element(&mut writer, "Copyright", &record.copyright)?;
                text_element(&mut writer, "Product", &record.product)?;

                emit(&mut writer, Event::End(BytesEnd::new(ASSEMBLY)))?;
            }
            emit(&mut writer, Event::End(BytesEnd::new(ROOT)))?;
        }

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Writes the document to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputWrite`] if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|source| Error::OutputWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), assemblies = self.len(), "manifest written");
        Ok(())
    }
}

pub fn manifest_bytes(records: &[ModuleRecord]) -> Result<Vec<u8>> {
    ExportDocument::new(records).to_bytes()
}

pub fn write_manifest(records: &[ModuleRecord], path: &Path) -> Result<()> {
    ExportDocument::new(records).write_to(path)
}
