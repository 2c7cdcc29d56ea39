//! Read-only view of a PE image.
//!
//! `goblin` parses the headers and section table. This module only adds
//! RVA resolution and the two data directories the extractor needs.

use goblin::pe::PE;

use super::MetadataError;

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

impl Section {
    fn contains(&self, rva: u32) -> bool {
        let span = self.virtual_size.max(self.raw_size);
        rva >= self.virtual_address && rva - self.virtual_address < span
    }
}

/// A data directory entry: an RVA and a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    pub rva: u32,
    pub size: u32,
}

pub struct PeImage<'a> {
    bytes: &'a [u8],
    sections: Vec<Section>,
    resources: Option<Directory>,
    clr: Option<Directory>,
}

impl<'a> PeImage<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, MetadataError> {
        let pe = PE::parse(bytes)?;

        let sections = pe
            .sections
            .iter()
            .map(|s| Section {
                virtual_address: s.virtual_address,
                virtual_size: s.virtual_size,
                raw_size: s.size_of_raw_data,
                raw_offset: s.pointer_to_raw_data,
            })
            .collect();

        let (resources, clr) = match pe.header.optional_header {
            Some(ref optional) => {
                let dirs = &optional.data_directories;
                let resources = dirs.get_resource_table().as_ref().map(|d| Directory {
                    rva: d.virtual_address,
                    size: d.size,
                });
                let clr = dirs.get_clr_runtime_header().as_ref().map(|d| Directory {
                    rva: d.virtual_address,
                    size: d.size,
                });
                (resources, clr)
            }
            None => (None, None),
        };

        Ok(Self {
            bytes,
            sections,
            resources: resources.filter(|d| d.rva != 0 && d.size != 0),
            clr: clr.filter(|d| d.rva != 0 && d.size != 0),
        })
    }

    pub fn resource_directory(&self) -> Option<Directory> {
        self.resources
    }

    pub fn clr_directory(&self) -> Option<Directory> {
        self.clr
    }

    /// Resolves `rva` to a file offset and the number of raw bytes the
    /// owning section holds from there on.
    fn raw_span(&self, rva: u32) -> Option<(usize, usize)> {
        let section = self.sections.iter().find(|s| s.contains(rva))?;
        let offset = rva - section.virtual_address;
        if offset >= section.raw_size {
            return None;
        }
        Some((
            section.raw_offset as usize + offset as usize,
            (section.raw_size - offset) as usize,
        ))
    }

    /// Returns `size` bytes starting at `rva`, clamped to the owning
    /// section's raw data.
    pub fn slice(&self, rva: u32, size: u32) -> Result<&'a [u8], MetadataError> {
        let (start, available) = self
            .raw_span(rva)
            .ok_or(MetadataError::OutOfBounds { rva })?;
        let end = start + available.min(size as usize);
        self.bytes
            .get(start..end.min(self.bytes.len()))
            .filter(|s| !s.is_empty())
            .ok_or(MetadataError::OutOfBounds { rva })
    }
}
