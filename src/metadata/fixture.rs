//! Builds small PE32 images for tests: an optional version resource and
//! optional CLI metadata carrying assembly attributes, in a single section.

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: u32 = 0x1000;

const OPTIONAL_HEADER: usize = 0x58;
const DATA_DIRECTORIES: usize = 0xB8;
const SECTION_TABLE: usize = 0x138;

const RESOURCE_DIRECTORY_INDEX: usize = 2;
const CLR_DIRECTORY_INDEX: usize = 14;

const CLI_HEADER_SIZE: usize = 72;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn pad_to(buf: &mut Vec<u8>, alignment: usize) {
    while buf.len() % alignment != 0 {
        buf.push(0);
    }
}

fn push_utf16z(buf: &mut Vec<u8>, text: &str) {
    for unit in text.encode_utf16().chain(std::iter::once(0)) {
        push_u16(buf, unit);
    }
}

fn compressed(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        vec![0x80 | (len >> 8) as u8, len as u8]
    }
}

fn version_block(key: &str, value_type: u16, value: &[u8], value_length: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let mut block = vec![0u8; 6];
    push_utf16z(&mut block, key);
    pad_to(&mut block, 4);
    block.extend_from_slice(value);
    for child in children {
        pad_to(&mut block, 4);
        block.extend_from_slice(child);
    }
    let length = block.len() as u16;
    put_u16(&mut block, 0, length);
    put_u16(&mut block, 2, value_length);
    put_u16(&mut block, 4, value_type);
    block
}

/// Raw `VS_VERSIONINFO` data with one `StringTable` per `(key, entries)`.
pub(crate) fn version_info_bytes(tables: &[(&str, Vec<(&str, &str)>)]) -> Vec<u8> {
    let string_tables: Vec<Vec<u8>> = tables
        .iter()
        .map(|(key, entries)| {
            let strings: Vec<Vec<u8>> = entries
                .iter()
                .map(|(name, value)| {
                    let mut text = Vec::new();
                    push_utf16z(&mut text, value);
                    let units = value.encode_utf16().count() as u16 + 1;
                    version_block(name, 1, &text, units, &[])
                })
                .collect();
            version_block(key, 1, &[], 0, &strings)
        })
        .collect();
    let string_file_info = version_block("StringFileInfo", 1, &[], 0, &string_tables);

    let translation = version_block("Translation", 0, &[0x09, 0x04, 0xB0, 0x04], 4, &[]);
    let var_file_info = version_block("VarFileInfo", 1, &[], 0, &[translation]);

    let mut fixed = vec![0u8; 52];
    put_u32(&mut fixed, 0, 0xFEEF_04BD);
    put_u32(&mut fixed, 4, 0x0001_0000);

    version_block("VS_VERSION_INFO", 0, &fixed, 52, &[string_file_info, var_file_info])
}

/// A three-level resource tree (type, name, language) holding one
/// `RT_VERSION` entry whose data follows the tree.
fn resource_tree(base_rva: u32, data: &[u8]) -> Vec<u8> {
    let mut tree = Vec::new();
    let levels: [(u32, u32); 3] = [(16, 0x8000_0000 | 24), (1, 0x8000_0000 | 48), (0x409, 72)];
    for (id, target) in levels {
        push_u32(&mut tree, 0);
        push_u32(&mut tree, 0);
        push_u16(&mut tree, 4);
        push_u16(&mut tree, 0);
        push_u16(&mut tree, 0);
        push_u16(&mut tree, 1);
        push_u32(&mut tree, id);
        push_u32(&mut tree, target);
    }
    push_u32(&mut tree, base_rva + 88);
    push_u32(&mut tree, data.len() as u32);
    push_u32(&mut tree, 0);
    push_u32(&mut tree, 0);
    tree.extend_from_slice(data);
    tree
}

struct Heap {
    bytes: Vec<u8>,
}

impl Heap {
    fn new() -> Self {
        Self { bytes: vec![0] }
    }

    fn string(&mut self, text: &str) -> u16 {
        let index = self.bytes.len() as u16;
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
        index
    }

    fn blob(&mut self, data: &[u8]) -> u16 {
        let index = self.bytes.len() as u16;
        self.bytes.extend(compressed(data.len()));
        self.bytes.extend_from_slice(data);
        index
    }
}

fn attribute_value(text: &str) -> Vec<u8> {
    let mut blob = vec![0x01, 0x00];
    blob.extend(compressed(text.len()));
    blob.extend_from_slice(text.as_bytes());
    blob.extend_from_slice(&[0x00, 0x00]);
    blob
}

/// `#~` stream plus heaps for an assembly whose `CustomAttribute` rows
/// each reference a `System.Reflection` attribute through a `MemberRef`.
fn metadata_root(module_name: &str, attributes: &[(String, String)]) -> Vec<u8> {
    let mut strings = Heap::new();
    let mut blobs = Heap::new();

    let namespace = strings.string("System.Reflection");
    let ctor = strings.string(".ctor");
    let name = strings.string(module_name);
    let signature = blobs.blob(&[0x20, 0x01, 0x01, 0x0E]);

    let count = attributes.len() as u32;
    let mut tables = Vec::new();
    push_u32(&mut tables, 0);
    tables.extend_from_slice(&[2, 0, 0, 1]);

    let mut valid: u64 = (1 << 0x00) | (1 << 0x20);
    if count > 0 {
        valid |= (1 << 0x01) | (1 << 0x0A) | (1 << 0x0C);
    }
    tables.extend_from_slice(&valid.to_le_bytes());
    tables.extend_from_slice(&0u64.to_le_bytes());

    // row counts in table order
    push_u32(&mut tables, 1);
    if count > 0 {
        push_u32(&mut tables, count);
        push_u32(&mut tables, count);
        push_u32(&mut tables, count);
    }
    push_u32(&mut tables, 1);

    // Module
    push_u16(&mut tables, 0);
    push_u16(&mut tables, name);
    push_u16(&mut tables, 0);
    push_u16(&mut tables, 0);
    push_u16(&mut tables, 0);

    // TypeRef
    for (type_name, _) in attributes {
        let type_name = strings.string(type_name);
        push_u16(&mut tables, 0);
        push_u16(&mut tables, type_name);
        push_u16(&mut tables, namespace);
    }

    // MemberRef, parent is TypeRef (tag 1)
    for row in 1..=count {
        push_u16(&mut tables, ((row << 3) | 1) as u16);
        push_u16(&mut tables, ctor);
        push_u16(&mut tables, signature);
    }

    // CustomAttribute, parent is Assembly row 1 (tag 14), type is MemberRef (tag 3)
    for (row, (_, value)) in (1..=count).zip(attributes) {
        let value = blobs.blob(&attribute_value(value));
        push_u16(&mut tables, (1 << 5) | 14);
        push_u16(&mut tables, ((row << 3) | 3) as u16);
        push_u16(&mut tables, value);
    }

    // Assembly
    push_u32(&mut tables, 0x8004);
    for part in [1u16, 0, 0, 0] {
        push_u16(&mut tables, part);
    }
    push_u32(&mut tables, 0);
    push_u16(&mut tables, 0);
    push_u16(&mut tables, name);
    push_u16(&mut tables, 0);

    pad_to(&mut tables, 4);
    pad_to(&mut strings.bytes, 4);
    pad_to(&mut blobs.bytes, 4);

    let streams: [(&str, &[u8]); 3] = [
        ("#~", &tables),
        ("#Strings", &strings.bytes),
        ("#Blob", &blobs.bytes),
    ];

    let header_len: usize = 32
        + streams
            .iter()
            .map(|(name, _)| 8 + (name.len() + 1).div_ceil(4) * 4)
            .sum::<usize>();

    let mut root = Vec::new();
    push_u32(&mut root, 0x424A_5342);
    push_u16(&mut root, 1);
    push_u16(&mut root, 1);
    push_u32(&mut root, 0);
    push_u32(&mut root, 12);
    root.extend_from_slice(b"v4.0.30319\0\0");
    push_u16(&mut root, 0);
    push_u16(&mut root, streams.len() as u16);

    let mut offset = header_len;
    for (name, body) in &streams {
        push_u32(&mut root, offset as u32);
        push_u32(&mut root, body.len() as u32);
        root.extend_from_slice(name.as_bytes());
        root.push(0);
        pad_to(&mut root, 4);
        offset += body.len();
    }
    for (_, body) in &streams {
        root.extend_from_slice(body);
    }
    root
}

/// A CLI header immediately followed by its metadata root.
fn clr_data(base_rva: u32, module_name: &str, attributes: &[(String, String)]) -> Vec<u8> {
    let metadata = metadata_root(module_name, attributes);

    let mut data = Vec::new();
    push_u32(&mut data, CLI_HEADER_SIZE as u32);
    push_u16(&mut data, 2);
    push_u16(&mut data, 5);
    push_u32(&mut data, base_rva + CLI_HEADER_SIZE as u32);
    push_u32(&mut data, metadata.len() as u32);
    push_u32(&mut data, 1);
    push_u32(&mut data, 0);
    data.resize(CLI_HEADER_SIZE, 0);
    data.extend_from_slice(&metadata);
    data
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ImageBuilder {
    version_strings: Vec<(String, String)>,
    attributes: Option<Vec<(String, String)>>,
}

impl ImageBuilder {
    pub const SECTION_RVA: u32 = 0x1000;
    pub const SECTION_OFFSET: u32 = 0x200;

    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a version resource with a single U.S. English string table.
    pub fn with_version_strings(mut self, strings: &[(&str, &str)]) -> Self {
        self.version_strings = strings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    /// Makes the image a managed assembly carrying these
    /// `System.Reflection` attributes, by type name.
    pub fn with_assembly_attributes(mut self, attributes: &[(&str, &str)]) -> Self {
        self.attributes = Some(
            attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let mut resources = (0u32, 0u32);
        let mut clr = (0u32, 0u32);

        if !self.version_strings.is_empty() {
            let entries: Vec<(&str, &str)> = self
                .version_strings
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let info = version_info_bytes(&[("040904b0", entries)]);
            let rva = Self::SECTION_RVA + section.len() as u32;
            let tree = resource_tree(rva, &info);
            resources = (rva, tree.len() as u32);
            section.extend(tree);
            pad_to(&mut section, 4);
        }

        if let Some(ref attributes) = self.attributes {
            let rva = Self::SECTION_RVA + section.len() as u32;
            section.extend(clr_data(rva, "Fixture", attributes));
            clr = (rva, CLI_HEADER_SIZE as u32);
            pad_to(&mut section, 4);
        }

        if section.is_empty() {
            section.resize(16, 0);
        }
        let virtual_size = section.len() as u32;
        pad_to(&mut section, FILE_ALIGNMENT);
        let raw_size = section.len() as u32;

        let mut image = vec![0u8; Self::SECTION_OFFSET as usize];
        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3C, 0x40);
        image[0x40..0x44].copy_from_slice(b"PE\0\0");

        // COFF header
        put_u16(&mut image, 0x44, 0x014C);
        put_u16(&mut image, 0x46, 1);
        put_u16(&mut image, 0x54, 224);
        put_u16(&mut image, 0x56, 0x2102);

        // optional header, PE32
        let o = OPTIONAL_HEADER;
        put_u16(&mut image, o, 0x010B);
        image[o + 2] = 14;
        put_u32(&mut image, o + 8, raw_size);
        put_u32(&mut image, o + 20, Self::SECTION_RVA);
        put_u32(&mut image, o + 24, Self::SECTION_RVA);
        put_u32(&mut image, o + 28, 0x1000_0000);
        put_u32(&mut image, o + 32, SECTION_ALIGNMENT);
        put_u32(&mut image, o + 36, FILE_ALIGNMENT as u32);
        put_u16(&mut image, o + 40, 4);
        put_u16(&mut image, o + 48, 4);
        let image_size = Self::SECTION_RVA + virtual_size.div_ceil(SECTION_ALIGNMENT) * SECTION_ALIGNMENT;
        put_u32(&mut image, o + 56, image_size);
        put_u32(&mut image, o + 60, Self::SECTION_OFFSET);
        put_u16(&mut image, o + 68, 3);
        put_u16(&mut image, o + 70, 0x0540);
        put_u32(&mut image, o + 72, 0x0010_0000);
        put_u32(&mut image, o + 76, 0x1000);
        put_u32(&mut image, o + 80, 0x0010_0000);
        put_u32(&mut image, o + 84, 0x1000);
        put_u32(&mut image, o + 92, 16);

        let resource_entry = DATA_DIRECTORIES + RESOURCE_DIRECTORY_INDEX * 8;
        put_u32(&mut image, resource_entry, resources.0);
        put_u32(&mut image, resource_entry + 4, resources.1);
        let clr_entry = DATA_DIRECTORIES + CLR_DIRECTORY_INDEX * 8;
        put_u32(&mut image, clr_entry, clr.0);
        put_u32(&mut image, clr_entry + 4, clr.1);

        // section table
        let s = SECTION_TABLE;
        image[s..s + 5].copy_from_slice(b".text");
        put_u32(&mut image, s + 8, virtual_size);
        put_u32(&mut image, s + 12, Self::SECTION_RVA);
        put_u32(&mut image, s + 16, raw_size);
        put_u32(&mut image, s + 20, Self::SECTION_OFFSET);
        put_u32(&mut image, s + 36, 0x4000_0040);

        image.extend_from_slice(&section);
        image
    }
}
