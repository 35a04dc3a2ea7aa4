// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Walking of the PE resource directory tree.

use {
    byteorder::{ByteOrder, LittleEndian},
    goblin::pe::{section_table::SectionTable, PE},
};

/// Resource type identifier for version resources.
const RT_VERSION: u32 = 16;

/// High bit of a resource directory entry offset marks a subdirectory.
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset.checked_add(2)?).map(LittleEndian::read_u16)
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset.checked_add(4)?).map(LittleEndian::read_u32)
}

/// Resolve a relative virtual address to an offset in the file.
pub(crate) fn rva_to_offset(sections: &[SectionTable], rva: u32) -> Option<usize> {
    sections.iter().find_map(|section| {
        let size = section.virtual_size.max(section.size_of_raw_data);

        if rva >= section.virtual_address && rva - section.virtual_address < size {
            Some((rva - section.virtual_address) as usize + section.pointer_to_raw_data as usize)
        } else {
            None
        }
    })
}

/// An entry in an `IMAGE_RESOURCE_DIRECTORY`.
#[derive(Clone, Copy, Debug)]
struct DirectoryEntry {
    name: u32,
    offset: u32,
}

impl DirectoryEntry {
    fn is_subdirectory(&self) -> bool {
        self.offset & SUBDIRECTORY_FLAG != 0
    }

    fn target(&self) -> usize {
        (self.offset & !SUBDIRECTORY_FLAG) as usize
    }
}

fn directory_entries(rsrc: &[u8], offset: usize) -> Option<Vec<DirectoryEntry>> {
    let named = read_u16(rsrc, offset + 12)? as usize;
    let ids = read_u16(rsrc, offset + 14)? as usize;

    (0..named + ids)
        .map(|i| {
            let entry = offset + 16 + i * 8;

            Some(DirectoryEntry {
                name: read_u32(rsrc, entry)?,
                offset: read_u32(rsrc, entry + 4)?,
            })
        })
        .collect()
}

/// Locate the raw bytes of the first `RT_VERSION` resource in a PE binary.
///
/// The resource tree is type -> name -> language. The first name and the
/// first language are used.
pub(crate) fn find_version_resource(data: &[u8]) -> Result<Option<&[u8]>, goblin::error::Error> {
    let pe = PE::parse(data)?;

    let table = match pe
        .header
        .optional_header
        .as_ref()
        .and_then(|h| *h.data_directories.get_resource_table())
    {
        Some(table) if table.size > 0 => table,
        _ => return Ok(None),
    };

    let rsrc = match rva_to_offset(&pe.sections, table.virtual_address).and_then(|o| data.get(o..)) {
        Some(rsrc) => rsrc,
        None => return Ok(None),
    };

    Ok(walk_version_tree(rsrc).and_then(|(rva, size)| {
        let start = rva_to_offset(&pe.sections, rva)?;
        data.get(start..start.checked_add(size as usize)?)
    }))
}

/// Descend the resource tree and return the RVA and size of the version data.
fn walk_version_tree(rsrc: &[u8]) -> Option<(u32, u32)> {
    let version_type = directory_entries(rsrc, 0)?
        .into_iter()
        .find(|e| e.name == RT_VERSION && e.is_subdirectory())?;

    let name = directory_entries(rsrc, version_type.target())?
        .into_iter()
        .find(|e| e.is_subdirectory())?;

    let language = directory_entries(rsrc, name.target())?
        .into_iter()
        .find(|e| !e.is_subdirectory())?;

    let data_entry = language.target();

    Some((read_u32(rsrc, data_entry)?, read_u32(rsrc, data_entry + 4)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut data = vec![0u8; 12];
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (name, offset) in entries {
            data.extend_from_slice(&name.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
        }

        data
    }

    #[test]
    fn rva_mapping() {
        let sections = vec![SectionTable {
            virtual_address: 0x2000,
            virtual_size: 0x100,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0x600,
            ..Default::default()
        }];

        assert_eq!(rva_to_offset(&sections, 0x2000), Some(0x600));
        assert_eq!(rva_to_offset(&sections, 0x2010), Some(0x610));
        assert_eq!(rva_to_offset(&sections, 0x21ff), Some(0x7ff));
        assert_eq!(rva_to_offset(&sections, 0x2200), None);
        assert_eq!(rva_to_offset(&sections, 0x1000), None);
    }

    #[test]
    fn walk_finds_version_leaf() {
        // Root (2 entries) is 32 bytes, the name and language directories
        // (1 entry each) are 24 bytes.
        let mut rsrc = directory(&[
            (3, SUBDIRECTORY_FLAG | 0x1000),
            (RT_VERSION, SUBDIRECTORY_FLAG | 32),
        ]);
        rsrc.extend(directory(&[(1, SUBDIRECTORY_FLAG | 56)]));
        rsrc.extend(directory(&[(1033, 80)]));
        assert_eq!(rsrc.len(), 80);
        rsrc.extend_from_slice(&0x3000u32.to_le_bytes());
        rsrc.extend_from_slice(&0x2a0u32.to_le_bytes());
        rsrc.extend_from_slice(&[0u8; 8]);

        assert_eq!(walk_version_tree(&rsrc), Some((0x3000, 0x2a0)));
    }

    #[test]
    fn walk_without_version_type() {
        let rsrc = directory(&[(3, SUBDIRECTORY_FLAG | 24)]);

        assert_eq!(walk_version_tree(&rsrc), None);
    }

    #[test]
    fn walk_truncated_directory() {
        let mut rsrc = directory(&[(RT_VERSION, SUBDIRECTORY_FLAG | 24)]);
        rsrc.truncate(20);

        assert_eq!(walk_version_tree(&rsrc), None);
    }
}
