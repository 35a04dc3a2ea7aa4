// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Read version metadata embedded in Windows PE binaries.

Windows executables carry a `VS_VERSIONINFO` resource holding a binary
`VS_FIXEDFILEINFO` structure plus a table of display strings. This crate
locates that resource inside a PE file and decodes the four component file
version along with the vendor supplied `ProductVersion` string.
*/

mod resource;
mod version_info;

pub use version_info::{decode_version_info, FileVersion, VersionInfo};

use {
    log::debug,
    std::path::{Path, PathBuf},
    thiserror::Error,
};

/// Errors that can occur when probing a binary for version metadata.
#[derive(Debug, Error)]
pub enum VersionProbeError {
    #[error("binary not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("binary has no version resource: {}", .0.display())]
    NoVersionMetadata(PathBuf),

    #[error("I/O error reading {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),
}

pub type Result<T> = std::result::Result<T, VersionProbeError>;

/// Extract [VersionInfo] from the raw bytes of a PE binary.
///
/// Returns `None` if the data isn't a PE binary or the binary doesn't carry a
/// decodable version resource.
pub fn version_info_from_pe_data(data: &[u8]) -> Option<VersionInfo> {
    let resource = match resource::find_version_resource(data) {
        Ok(Some(resource)) => resource,
        Ok(None) => {
            debug!("PE binary has no RT_VERSION resource");
            return None;
        }
        Err(err) => {
            debug!("unable to parse data as PE binary: {}", err);
            return None;
        }
    };

    decode_version_info(resource)
}

/// Probe the binary at `path` for its version metadata.
pub fn probe(path: impl AsRef<Path>) -> Result<VersionInfo> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(VersionProbeError::NotFound(path.to_path_buf()));
    }

    let data = std::fs::read(path).map_err(|e| VersionProbeError::Io(path.to_path_buf(), e))?;

    let info = version_info_from_pe_data(&data)
        .ok_or_else(|| VersionProbeError::NoVersionMetadata(path.to_path_buf()))?;

    debug!(
        "{}: file version {}, product version {}",
        path.display(),
        info.file_version,
        info.product_version
    );

    Ok(info)
}
