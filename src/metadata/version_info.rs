//! `RT_VERSION` resource lookup and `VS_VERSIONINFO` string decoding.

use scroll::{Pread, LE};

use super::pe::PeImage;
use super::MetadataError;

const RT_VERSION: u32 = 16;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;
const NAMED_ENTRY_FLAG: u32 = 0x8000_0000;

/// The language-specific string table preferred when several exist.
const PREFERRED_LANGUAGE: &str = "0409";

/// One `StringTable` of a `StringFileInfo` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    /// Language and code page key, e.g. `040904b0`.
    pub key: String,
    pub entries: Vec<(String, String)>,
}

/// The string tables of a version resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionStrings {
    pub tables: Vec<StringTable>,
}

impl VersionStrings {
    /// Looks up `name` in the U.S. English table, or in the first table if
    /// there is no U.S. English one.
    pub fn get(&self, name: &str) -> Option<&str> {
        let table = self
            .tables
            .iter()
            .find(|t| t.key.to_ascii_lowercase().starts_with(PREFERRED_LANGUAGE))
            .or_else(|| self.tables.first())?;

        table
            .entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Reads the version strings of `image`. Returns `Ok(None)` when the image
/// carries no version resource.
pub fn read_version_strings(image: &PeImage<'_>) -> Result<Option<VersionStrings>, MetadataError> {
    let Some(dir) = image.resource_directory() else {
        return Ok(None);
    };
    let tree = image.slice(dir.rva, dir.size)?;

    let Some(type_dir) = find_entry(tree, 0, |id| id == RT_VERSION)? else {
        return Ok(None);
    };
    let name_dir = match type_dir {
        Entry::Directory(offset) => first_subdirectory_entry(tree, offset)?,
        Entry::Data(_) => return Err(MetadataError::malformed("RT_VERSION is not a directory")),
    };
    let data_entry = match name_dir {
        Some(Entry::Directory(offset)) => first_subdirectory_entry(tree, offset)?,
        other => other,
    };
    let Some(Entry::Data(offset)) = data_entry else {
        return Ok(None);
    };

    let data_rva: u32 = tree.pread_with(offset, LE)?;
    let data_size: u32 = tree.pread_with(offset + 4, LE)?;
    let data = image.slice(data_rva, data_size)?;

    parse_version_info(data).map(Some)
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Directory(usize),
    Data(usize),
}

fn entry_at(tree: &[u8], entry_offset: usize) -> Result<(u32, Entry), MetadataError> {
    let name: u32 = tree.pread_with(entry_offset, LE)?;
    let target: u32 = tree.pread_with(entry_offset + 4, LE)?;
    let entry = if target & SUBDIRECTORY_FLAG != 0 {
        Entry::Directory((target & !SUBDIRECTORY_FLAG) as usize)
    } else {
        Entry::Data(target as usize)
    };
    Ok((name, entry))
}

fn directory_entries(tree: &[u8], dir_offset: usize) -> Result<usize, MetadataError> {
    let named: u16 = tree.pread_with(dir_offset + 12, LE)?;
    let ids: u16 = tree.pread_with(dir_offset + 14, LE)?;
    Ok(named as usize + ids as usize)
}

fn find_entry(
    tree: &[u8],
    dir_offset: usize,
    matches: impl Fn(u32) -> bool,
) -> Result<Option<Entry>, MetadataError> {
    let count = directory_entries(tree, dir_offset)?;
    for i in 0..count {
        let (name, entry) = entry_at(tree, dir_offset + 16 + i * 8)?;
        if name & NAMED_ENTRY_FLAG == 0 && matches(name) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

fn first_subdirectory_entry(tree: &[u8], dir_offset: usize) -> Result<Option<Entry>, MetadataError> {
    if directory_entries(tree, dir_offset)? == 0 {
        return Ok(None);
    }
    entry_at(tree, dir_offset + 16).map(|(_, entry)| Some(entry))
}

/// A `VS_VERSIONINFO`-style block: header, key, value, and children.
struct Block<'a> {
    key: String,
    value_type: u16,
    value: &'a [u8],
    children: &'a [u8],
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Reads a NUL-terminated UTF-16LE string starting at `offset` and returns
/// it together with the offset just past the terminator.
fn read_utf16z(data: &[u8], mut offset: usize) -> Result<(String, usize), MetadataError> {
    let mut units = Vec::new();
    loop {
        let unit: u16 = data.pread_with(offset, LE)?;
        offset += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok((String::from_utf16_lossy(&units), offset))
}

fn read_block(data: &[u8]) -> Result<Block<'_>, MetadataError> {
    let length: u16 = data.pread_with(0, LE)?;
    let value_length: u16 = data.pread_with(2, LE)?;
    let value_type: u16 = data.pread_with(4, LE)?;

    let end = (length as usize).min(data.len());
    if end < 6 {
        return Err(MetadataError::malformed("version block shorter than its header"));
    }
    let data = &data[..end];

    let (key, after_key) = read_utf16z(data, 6)?;
    let value_start = align4(after_key).min(end);
    // text values count UTF-16 units, binary values count bytes
    let value_bytes = if value_type == 1 {
        value_length as usize * 2
    } else {
        value_length as usize
    };
    let value_end = (value_start + value_bytes).min(end);
    let children_start = align4(value_end).min(end);

    Ok(Block {
        key,
        value_type,
        value: &data[value_start..value_end],
        children: &data[children_start..],
    })
}

fn child_blocks(mut data: &[u8]) -> Result<Vec<Block<'_>>, MetadataError> {
    let mut blocks = Vec::new();
    while data.len() >= 6 {
        let length: u16 = data.pread_with(0, LE)?;
        if length == 0 {
            break;
        }
        blocks.push(read_block(data)?);
        let next = align4(length as usize);
        if next >= data.len() {
            break;
        }
        data = &data[next..];
    }
    Ok(blocks)
}

fn text_value(block: &Block<'_>) -> String {
    if block.value_type != 1 {
        return String::from_utf8_lossy(block.value)
            .trim_end_matches('\0')
            .to_string();
    }
    let units: Vec<u16> = block
        .value
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decodes the `StringFileInfo` tables of a raw `VS_VERSIONINFO` resource.
pub fn parse_version_info(data: &[u8]) -> Result<VersionStrings, MetadataError> {
    let root = read_block(data)?;
    if root.key != "VS_VERSION_INFO" {
        return Err(MetadataError::malformed("missing VS_VERSION_INFO key"));
    }

    let mut strings = VersionStrings::default();
    for info in child_blocks(root.children)? {
        if info.key != "StringFileInfo" {
            continue;
        }
        for table in child_blocks(info.children)? {
            let entries = child_blocks(table.children)?
                .iter()
                .map(|entry| (entry.key.clone(), text_value(entry)))
                .collect();
            strings.tables.push(StringTable {
                key: table.key,
                entries,
            });
        }
    }
    Ok(strings)
}
