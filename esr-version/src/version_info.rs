// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoding of `VS_VERSIONINFO` resource data.

use {
    byteorder::{ByteOrder, LittleEndian},
    std::fmt::{Display, Formatter},
};

const FIXED_FILE_INFO_SIGNATURE: u32 = 0xfeef_04bd;
const FIXED_FILE_INFO_SIZE: usize = 52;

/// Nesting deeper than this is not produced by resource compilers.
const MAX_BLOCK_DEPTH: usize = 8;

/// The four component file version of a binary.
///
/// Components are read verbatim from `VS_FIXEDFILEINFO`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub private: u16,
}

impl FileVersion {
    fn from_ms_ls(ms: u32, ls: u32) -> Self {
        Self {
            major: (ms >> 16) as u16,
            minor: (ms & 0xffff) as u16,
            build: (ls >> 16) as u16,
            private: (ls & 0xffff) as u16,
        }
    }

    /// The components as an ordered tuple.
    pub fn as_tuple(&self) -> (u16, u16, u16, u16) {
        (self.major, self.minor, self.build, self.private)
    }
}

impl Display for FileVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.private
        )
    }
}

/// Version metadata of a binary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionInfo {
    /// Binary file version from the fixed file info structure.
    pub file_version: FileVersion,

    /// The vendor supplied `ProductVersion` display string.
    pub product_version: String,
}

/// A node in the `VS_VERSIONINFO` tree.
///
/// `VS_VERSIONINFO`, `StringFileInfo`, `StringTable` and `String` all share
/// this layout.
struct Block<'a> {
    key: String,
    value: &'a [u8],
    text: bool,
    children: Vec<Block<'a>>,
}

impl<'a> Block<'a> {
    fn child(&self, key: &str) -> Option<&Block<'a>> {
        self.children.iter().find(|c| c.key == key)
    }

    fn text_value(&self) -> Option<String> {
        if !self.text {
            return None;
        }

        let units = self
            .value
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .take_while(|u| *u != 0)
            .collect::<Vec<_>>();

        Some(String::from_utf16_lossy(&units))
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Parse the block starting at `offset`, returning it and its end offset.
fn parse_block(data: &[u8], offset: usize, depth: usize) -> Option<(Block<'_>, usize)> {
    if depth > MAX_BLOCK_DEPTH {
        return None;
    }

    let header = data.get(offset..offset.checked_add(6)?)?;
    let length = LittleEndian::read_u16(&header[0..2]) as usize;
    let value_length = LittleEndian::read_u16(&header[2..4]) as usize;
    let text = LittleEndian::read_u16(&header[4..6]) == 1;

    if length < 6 {
        return None;
    }

    let end = offset + length;
    if end > data.len() {
        return None;
    }

    let mut pos = offset + 6;
    let mut key_units = vec![];
    loop {
        let unit = LittleEndian::read_u16(data.get(pos..pos + 2).filter(|_| pos + 2 <= end)?);
        pos += 2;
        if unit == 0 {
            break;
        }
        key_units.push(unit);
    }
    let key = String::from_utf16_lossy(&key_units);

    // Text values are measured in UTF-16 code units.
    let value_size = if text { value_length * 2 } else { value_length };
    let value_start = align4(pos).min(end);
    let value = &data[value_start..(value_start + value_size).min(end)];

    let mut children = vec![];
    let mut pos = align4(value_start + value_size);
    while pos + 6 <= end {
        let (child, child_end) = parse_block(data, pos, depth + 1)?;
        children.push(child);
        pos = align4(child_end);
    }

    Some((
        Block {
            key,
            value,
            text,
            children,
        },
        end,
    ))
}

/// Decode the raw bytes of a `VS_VERSIONINFO` resource.
///
/// Both the fixed file info and a `ProductVersion` string are required.
/// The first string table carrying `ProductVersion` wins.
pub fn decode_version_info(data: &[u8]) -> Option<VersionInfo> {
    let (root, _) = parse_block(data, 0, 0)?;

    if root.key != "VS_VERSION_INFO" || root.value.len() < FIXED_FILE_INFO_SIZE {
        return None;
    }

    let fixed = root.value;
    if LittleEndian::read_u32(&fixed[0..4]) != FIXED_FILE_INFO_SIGNATURE {
        return None;
    }

    let file_version = FileVersion::from_ms_ls(
        LittleEndian::read_u32(&fixed[8..12]),
        LittleEndian::read_u32(&fixed[12..16]),
    );

    let product_version = root
        .child("StringFileInfo")?
        .children
        .iter()
        .find_map(|table| table.child("ProductVersion").and_then(|s| s.text_value()))?;

    Some(VersionInfo {
        file_version,
        product_version,
    })
}
