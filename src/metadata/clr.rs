//! Assembly-level custom attributes from CLI metadata (ECMA-335 partition II).
//!
//! Only the tables needed to resolve `CustomAttribute` rows owned by the
//! `Assembly` row are read, but row sizes depend on every table present,
//! so the full schema up to `GenericParamConstraint` is described here.

use scroll::{Pread, LE};

use super::pe::PeImage;
use super::MetadataError;

const METADATA_SIGNATURE: u32 = 0x424A_5342;
const REFLECTION_NAMESPACE: &str = "System.Reflection";
const MAX_TABLES: usize = 64;

const TYPE_REF: u8 = 0x01;
const TYPE_DEF: u8 = 0x02;
const METHOD_DEF: u8 = 0x06;
const MEMBER_REF: u8 = 0x0A;
const CUSTOM_ATTRIBUTE: u8 = 0x0C;
const ASSEMBLY: u8 = 0x20;
const UNUSED: u8 = 0xFF;

/// `HasCustomAttribute` tag of the `Assembly` table.
const ASSEMBLY_PARENT_TAG: u32 = 14;

/// The assembly attributes that describe a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorField {
    Title,
    Company,
    Version,
    Copyright,
    Description,
    Product,
}

impl DescriptorField {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "AssemblyTitleAttribute" => Some(Self::Title),
            "AssemblyCompanyAttribute" => Some(Self::Company),
            "AssemblyVersionAttribute" => Some(Self::Version),
            "AssemblyCopyrightAttribute" => Some(Self::Copyright),
            "AssemblyDescriptionAttribute" => Some(Self::Description),
            "AssemblyProductAttribute" => Some(Self::Product),
            _ => None,
        }
    }

    pub fn attribute_name(&self) -> &'static str {
        match self {
            Self::Title => "AssemblyTitleAttribute",
            Self::Company => "AssemblyCompanyAttribute",
            Self::Version => "AssemblyVersionAttribute",
            Self::Copyright => "AssemblyCopyrightAttribute",
            Self::Description => "AssemblyDescriptionAttribute",
            Self::Product => "AssemblyProductAttribute",
        }
    }
}

/// Assembly attribute values. `None` means the attribute is absent; a null
/// string argument reads as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyDescriptor {
    pub title: Option<String>,
    pub company: Option<String>,
    pub version: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub product: Option<String>,
}

impl AssemblyDescriptor {
    pub fn get(&self, field: DescriptorField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    fn slot(&self, field: DescriptorField) -> &Option<String> {
        match field {
            DescriptorField::Title => &self.title,
            DescriptorField::Company => &self.company,
            DescriptorField::Version => &self.version,
            DescriptorField::Copyright => &self.copyright,
            DescriptorField::Description => &self.description,
            DescriptorField::Product => &self.product,
        }
    }

    fn slot_mut(&mut self, field: DescriptorField) -> &mut Option<String> {
        match field {
            DescriptorField::Title => &mut self.title,
            DescriptorField::Company => &mut self.company,
            DescriptorField::Version => &mut self.version,
            DescriptorField::Copyright => &mut self.copyright,
            DescriptorField::Description => &mut self.description,
            DescriptorField::Product => &mut self.product,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl Coded {
    fn tables(self) -> &'static [u8] {
        match self {
            Coded::TypeDefOrRef => &[0x02, 0x01, 0x1B],
            Coded::HasConstant => &[0x04, 0x08, 0x17],
            Coded::HasCustomAttribute => &[
                0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A,
                0x1B, 0x20, 0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B,
            ],
            Coded::HasFieldMarshal => &[0x04, 0x08],
            Coded::HasDeclSecurity => &[0x02, 0x06, 0x20],
            Coded::MemberRefParent => &[0x02, 0x01, 0x1A, 0x06, 0x1B],
            Coded::HasSemantics => &[0x14, 0x17],
            Coded::MethodDefOrRef => &[0x06, 0x0A],
            Coded::MemberForwarded => &[0x04, 0x06],
            Coded::Implementation => &[0x26, 0x23, 0x27],
            Coded::CustomAttributeType => &[UNUSED, UNUSED, 0x06, 0x0A, UNUSED],
            Coded::ResolutionScope => &[0x00, 0x1A, 0x23, 0x01],
            Coded::TypeOrMethodDef => &[0x02, 0x06],
        }
    }

    fn tag_bits(self) -> u32 {
        match self {
            Coded::HasCustomAttribute => 5,
            Coded::MemberRefParent | Coded::CustomAttributeType => 3,
            Coded::TypeDefOrRef
            | Coded::HasConstant
            | Coded::HasDeclSecurity
            | Coded::Implementation
            | Coded::ResolutionScope => 2,
            Coded::HasFieldMarshal
            | Coded::HasSemantics
            | Coded::MethodDefOrRef
            | Coded::MemberForwarded
            | Coded::TypeOrMethodDef => 1,
        }
    }

    fn decode(self, value: u32) -> (u32, u32) {
        let bits = self.tag_bits();
        (value & ((1 << bits) - 1), value >> bits)
    }
}

#[derive(Debug, Clone, Copy)]
enum Col {
    U8Pair,
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Table(u8),
    Coded(Coded),
}

use self::Coded as C;

fn schema(table: u8) -> Option<&'static [Col]> {
    let cols: &'static [Col] = match table {
        // Module
        0x00 => &[Col::U16, Col::Str, Col::Guid, Col::Guid, Col::Guid],
        // TypeRef
        0x01 => &[Col::Coded(C::ResolutionScope), Col::Str, Col::Str],
        // TypeDef
        0x02 => &[
            Col::U32,
            Col::Str,
            Col::Str,
            Col::Coded(C::TypeDefOrRef),
            Col::Table(0x04),
            Col::Table(0x06),
        ],
        // FieldPtr
        0x03 => &[Col::Table(0x04)],
        // Field
        0x04 => &[Col::U16, Col::Str, Col::Blob],
        // MethodPtr
        0x05 => &[Col::Table(0x06)],
        // MethodDef
        0x06 => &[Col::U32, Col::U16, Col::U16, Col::Str, Col::Blob, Col::Table(0x08)],
        // ParamPtr
        0x07 => &[Col::Table(0x08)],
        // Param
        0x08 => &[Col::U16, Col::U16, Col::Str],
        // InterfaceImpl
        0x09 => &[Col::Table(0x02), Col::Coded(C::TypeDefOrRef)],
        // MemberRef
        0x0A => &[Col::Coded(C::MemberRefParent), Col::Str, Col::Blob],
        // Constant
        0x0B => &[Col::U8Pair, Col::Coded(C::HasConstant), Col::Blob],
        // CustomAttribute
        0x0C => &[
            Col::Coded(C::HasCustomAttribute),
            Col::Coded(C::CustomAttributeType),
            Col::Blob,
        ],
        // FieldMarshal
        0x0D => &[Col::Coded(C::HasFieldMarshal), Col::Blob],
        // DeclSecurity
        0x0E => &[Col::U16, Col::Coded(C::HasDeclSecurity), Col::Blob],
        // ClassLayout
        0x0F => &[Col::U16, Col::U32, Col::Table(0x02)],
        // FieldLayout
        0x10 => &[Col::U32, Col::Table(0x04)],
        // StandAloneSig
        0x11 => &[Col::Blob],
        // EventMap
        0x12 => &[Col::Table(0x02), Col::Table(0x14)],
        // EventPtr
        0x13 => &[Col::Table(0x14)],
        // Event
        0x14 => &[Col::U16, Col::Str, Col::Coded(C::TypeDefOrRef)],
        // PropertyMap
        0x15 => &[Col::Table(0x02), Col::Table(0x17)],
        // PropertyPtr
        0x16 => &[Col::Table(0x17)],
        // Property
        0x17 => &[Col::U16, Col::Str, Col::Blob],
        // MethodSemantics
        0x18 => &[Col::U16, Col::Table(0x06), Col::Coded(C::HasSemantics)],
        // MethodImpl
        0x19 => &[
            Col::Table(0x02),
            Col::Coded(C::MethodDefOrRef),
            Col::Coded(C::MethodDefOrRef),
        ],
        // ModuleRef
        0x1A => &[Col::Str],
        // TypeSpec
        0x1B => &[Col::Blob],
        // ImplMap
        0x1C => &[
            Col::U16,
            Col::Coded(C::MemberForwarded),
            Col::Str,
            Col::Table(0x1A),
        ],
        // FieldRVA
        0x1D => &[Col::U32, Col::Table(0x04)],
        // EncLog
        0x1E => &[Col::U32, Col::U32],
        // EncMap
        0x1F => &[Col::U32],
        // Assembly
        0x20 => &[
            Col::U32,
            Col::U16,
            Col::U16,
            Col::U16,
            Col::U16,
            Col::U32,
            Col::Blob,
            Col::Str,
            Col::Str,
        ],
        // AssemblyProcessor
        0x21 => &[Col::U32],
        // AssemblyOS
        0x22 => &[Col::U32, Col::U32, Col::U32],
        // AssemblyRef
        0x23 => &[
            Col::U16,
            Col::U16,
            Col::U16,
            Col::U16,
            Col::U32,
            Col::Blob,
            Col::Str,
            Col::Str,
            Col::Blob,
        ],
        // AssemblyRefProcessor
        0x24 => &[Col::U32, Col::Table(0x23)],
        // AssemblyRefOS
        0x25 => &[Col::U32, Col::U32, Col::U32, Col::Table(0x23)],
        // File
        0x26 => &[Col::U32, Col::Str, Col::Blob],
        // ExportedType
        0x27 => &[
            Col::U32,
            Col::U32,
            Col::Str,
            Col::Str,
            Col::Coded(C::Implementation),
        ],
        // ManifestResource
        0x28 => &[Col::U32, Col::U32, Col::Str, Col::Coded(C::Implementation)],
        // NestedClass
        0x29 => &[Col::Table(0x02), Col::Table(0x02)],
        // GenericParam
        0x2A => &[Col::U16, Col::U16, Col::Coded(C::TypeOrMethodDef), Col::Str],
        // MethodSpec
        0x2B => &[Col::Coded(C::MethodDefOrRef), Col::Blob],
        // GenericParamConstraint
        0x2C => &[Col::Table(0x2A), Col::Coded(C::TypeDefOrRef)],
        _ => return None,
    };
    Some(cols)
}

/// Layout of the `#~` stream: row counts, column widths, and table offsets.
struct Tables<'a> {
    data: &'a [u8],
    rows: [u32; MAX_TABLES],
    offsets: [usize; MAX_TABLES],
    row_sizes: [usize; MAX_TABLES],
    wide_strings: bool,
    wide_guids: bool,
    wide_blobs: bool,
}

impl<'a> Tables<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, MetadataError> {
        let heap_sizes: u8 = data.pread_with(6, LE)?;
        let valid: u64 = data.pread_with(8, LE)?;

        let mut rows = [0u32; MAX_TABLES];
        let mut cursor = 24;
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = data.pread_with(cursor, LE)?;
                cursor += 4;
            }
        }

        let mut tables = Self {
            data,
            rows,
            offsets: [0; MAX_TABLES],
            row_sizes: [0; MAX_TABLES],
            wide_strings: heap_sizes & 0x01 != 0,
            wide_guids: heap_sizes & 0x02 != 0,
            wide_blobs: heap_sizes & 0x04 != 0,
        };

        for table in 0..MAX_TABLES {
            if tables.rows[table] == 0 {
                continue;
            }
            let cols = schema(table as u8).ok_or(MetadataError::UnsupportedTable(table as u8))?;
            let size: usize = cols.iter().map(|&col| tables.col_size(col)).sum();
            tables.row_sizes[table] = size;
            tables.offsets[table] = cursor;
            cursor += size * tables.rows[table] as usize;
        }

        if cursor > data.len() {
            return Err(MetadataError::malformed("table stream shorter than its row counts"));
        }
        Ok(tables)
    }

    fn row_count(&self, table: u8) -> u32 {
        self.rows[table as usize]
    }

    fn col_size(&self, col: Col) -> usize {
        let wide = |flag: bool| if flag { 4 } else { 2 };
        match col {
            Col::U8Pair | Col::U16 => 2,
            Col::U32 => 4,
            Col::Str => wide(self.wide_strings),
            Col::Guid => wide(self.wide_guids),
            Col::Blob => wide(self.wide_blobs),
            Col::Table(table) => wide(self.rows[table as usize] >= 1 << 16),
            Col::Coded(coded) => {
                let max = coded
                    .tables()
                    .iter()
                    .filter(|&&t| t != UNUSED)
                    .map(|&t| self.rows[t as usize])
                    .max()
                    .unwrap_or(0);
                wide(max >= 1 << (16 - coded.tag_bits()))
            }
        }
    }

    /// Reads column `col` of the 1-based `row` of `table`.
    fn cell(&self, table: u8, row: u32, col: usize) -> Result<u32, MetadataError> {
        if row == 0 || row > self.row_count(table) {
            return Err(MetadataError::malformed("row index out of range"));
        }
        let cols = schema(table).ok_or(MetadataError::UnsupportedTable(table))?;
        let mut offset =
            self.offsets[table as usize] + (row as usize - 1) * self.row_sizes[table as usize];
        for &c in &cols[..col] {
            offset += self.col_size(c);
        }

        match self.col_size(cols[col]) {
            4 => Ok(self.data.pread_with::<u32>(offset, LE)?),
            _ => Ok(self.data.pread_with::<u16>(offset, LE)? as u32),
        }
    }
}

struct Heaps<'a> {
    strings: &'a [u8],
    blobs: &'a [u8],
}

impl Heaps<'_> {
    fn string(&self, index: u32) -> Result<String, MetadataError> {
        let tail = self
            .strings
            .get(index as usize..)
            .ok_or_else(|| MetadataError::malformed("string index out of range"))?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]).to_string())
    }

    fn blob(&self, index: u32) -> Result<&[u8], MetadataError> {
        let tail = self
            .blobs
            .get(index as usize..)
            .ok_or_else(|| MetadataError::malformed("blob index out of range"))?;
        let (len, header) = compressed_u32(tail)?;
        tail.get(header..header + len as usize)
            .ok_or_else(|| MetadataError::malformed("blob runs past the heap"))
    }
}

/// Decodes an ECMA-335 compressed unsigned integer, returning the value and
/// the number of bytes it occupied.
fn compressed_u32(data: &[u8]) -> Result<(u32, usize), MetadataError> {
    let first = *data
        .first()
        .ok_or_else(|| MetadataError::malformed("empty compressed integer"))?;
    if first & 0x80 == 0 {
        return Ok(((first & 0x7F) as u32, 1));
    }
    if first & 0xC0 == 0x80 {
        let second: u8 = data.pread(1)?;
        return Ok(((((first & 0x3F) as u32) << 8) | second as u32, 2));
    }
    if first & 0xE0 == 0xC0 {
        let rest: [u8; 3] = [data.pread(1)?, data.pread(2)?, data.pread(3)?];
        let value = (((first & 0x1F) as u32) << 24)
            | ((rest[0] as u32) << 16)
            | ((rest[1] as u32) << 8)
            | rest[2] as u32;
        return Ok((value, 4));
    }
    Err(MetadataError::malformed("invalid compressed integer"))
}

/// Decodes the single string fixed argument of an attribute value blob.
fn attribute_string(blob: &[u8]) -> Result<String, MetadataError> {
    let prolog: u16 = blob.pread_with(0, LE)?;
    if prolog != 0x0001 {
        return Err(MetadataError::malformed("custom attribute blob without prolog"));
    }
    let arg = &blob[2..];
    // 0xFF marks a null string
    if arg.first() == Some(&0xFF) {
        return Ok(String::new());
    }
    let (len, header) = compressed_u32(arg)?;
    let bytes = arg
        .get(header..header + len as usize)
        .ok_or_else(|| MetadataError::malformed("attribute string runs past its blob"))?;
    Ok(String::from_utf8_lossy(bytes).to_string())
}

struct Metadata<'a> {
    tables: Tables<'a>,
    heaps: Heaps<'a>,
}

impl<'a> Metadata<'a> {
    fn parse(root: &'a [u8]) -> Result<Self, MetadataError> {
        let signature: u32 = root.pread_with(0, LE)?;
        if signature != METADATA_SIGNATURE {
            return Err(MetadataError::malformed("bad metadata signature"));
        }
        let version_len: u32 = root.pread_with(12, LE)?;
        let mut cursor = 16 + version_len as usize;
        // flags
        cursor += 2;
        let stream_count: u16 = root.pread_with(cursor, LE)?;
        cursor += 2;

        let mut table_stream = None;
        let mut strings: &[u8] = &[];
        let mut blobs: &[u8] = &[];

        for _ in 0..stream_count {
            let offset: u32 = root.pread_with(cursor, LE)?;
            let size: u32 = root.pread_with(cursor + 4, LE)?;
            let name_start = cursor + 8;
            let name_len = root
                .get(name_start..)
                .and_then(|tail| tail.iter().position(|&b| b == 0))
                .ok_or_else(|| MetadataError::malformed("unterminated stream name"))?;
            let name = &root[name_start..name_start + name_len];
            cursor = (name_start + name_len + 1 + 3) & !3;

            let start = offset as usize;
            let body = root
                .get(start..start + size as usize)
                .ok_or_else(|| MetadataError::malformed("stream runs past metadata"))?;
            match name {
                b"#~" | b"#-" => table_stream = Some(body),
                b"#Strings" => strings = body,
                b"#Blob" => blobs = body,
                _ => {}
            }
        }

        let table_stream =
            table_stream.ok_or_else(|| MetadataError::malformed("missing #~ stream"))?;
        Ok(Self {
            tables: Tables::parse(table_stream)?,
            heaps: Heaps { strings, blobs },
        })
    }

    /// Resolves the `(namespace, name)` of the type that declares the
    /// attribute constructor referenced by a `CustomAttributeType` value.
    fn attribute_type(&self, ctor: u32) -> Result<Option<(String, String)>, MetadataError> {
        let (tag, row) = Coded::CustomAttributeType.decode(ctor);
        match Coded::CustomAttributeType.tables().get(tag as usize) {
            Some(&MEMBER_REF) => {
                let class = self.tables.cell(MEMBER_REF, row, 0)?;
                let (parent_tag, parent_row) = Coded::MemberRefParent.decode(class);
                match Coded::MemberRefParent.tables().get(parent_tag as usize) {
                    Some(&TYPE_REF) => self.type_name(TYPE_REF, parent_row).map(Some),
                    Some(&TYPE_DEF) => self.type_name(TYPE_DEF, parent_row).map(Some),
                    _ => Ok(None),
                }
            }
            Some(&METHOD_DEF) => match self.method_owner(row)? {
                Some(type_row) => self.type_name(TYPE_DEF, type_row).map(Some),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn type_name(&self, table: u8, row: u32) -> Result<(String, String), MetadataError> {
        // TypeRef and TypeDef store name then namespace in columns 1 and 2
        let name = self.heaps.string(self.tables.cell(table, row, 1)?)?;
        let namespace = self.heaps.string(self.tables.cell(table, row, 2)?)?;
        Ok((namespace, name))
    }

    /// Finds the `TypeDef` whose method list contains `method`.
    fn method_owner(&self, method: u32) -> Result<Option<u32>, MetadataError> {
        let mut owner = None;
        for row in 1..=self.tables.row_count(TYPE_DEF) {
            if self.tables.cell(TYPE_DEF, row, 5)? <= method {
                owner = Some(row);
            } else {
                break;
            }
        }
        Ok(owner)
    }

    fn assembly_descriptor(&self) -> Result<AssemblyDescriptor, MetadataError> {
        if self.tables.row_count(ASSEMBLY) == 0 {
            return Err(MetadataError::NotAnAssembly);
        }

        let mut descriptor = AssemblyDescriptor::default();
        for row in 1..=self.tables.row_count(CUSTOM_ATTRIBUTE) {
            let parent = self.tables.cell(CUSTOM_ATTRIBUTE, row, 0)?;
            let (tag, _) = Coded::HasCustomAttribute.decode(parent);
            if tag != ASSEMBLY_PARENT_TAG {
                continue;
            }

            let ctor = self.tables.cell(CUSTOM_ATTRIBUTE, row, 1)?;
            let Some((namespace, name)) = self.attribute_type(ctor)? else {
                continue;
            };
            if namespace != REFLECTION_NAMESPACE {
                continue;
            }
            let Some(field) = DescriptorField::from_type_name(&name) else {
                continue;
            };

            let slot = descriptor.slot_mut(field);
            if slot.is_none() {
                let blob = self
                    .heaps
                    .blob(self.tables.cell(CUSTOM_ATTRIBUTE, row, 2)?)?;
                *slot = Some(attribute_string(blob)?);
            }
        }
        Ok(descriptor)
    }
}

/// Reads the assembly-level descriptor attributes of a managed image.
///
/// Fails with [`MetadataError::NotManaged`] when the image has no CLI
/// header, and with [`MetadataError::NotAnAssembly`] for a managed module
/// without an assembly manifest.
pub fn read_assembly_descriptor(image: &PeImage<'_>) -> Result<AssemblyDescriptor, MetadataError> {
    let clr = image.clr_directory().ok_or(MetadataError::NotManaged)?;
    let header = image.slice(clr.rva, clr.size)?;
    let metadata_rva: u32 = header.pread_with(8, LE)?;
    let metadata_size: u32 = header.pread_with(12, LE)?;
    let root = image.slice(metadata_rva, metadata_size)?;

    Metadata::parse(root)?.assembly_descriptor()
}
