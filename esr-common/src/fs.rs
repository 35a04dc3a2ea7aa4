// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Filesystem helpers.

use std::{
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};

/// Canonicalize a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized and the missing components
/// are appended to it.
fn canonicalize_partial(path: &Path) -> std::io::Result<PathBuf> {
    let mut base = path;
    let mut missing = vec![];

    loop {
        match base.canonicalize() {
            Ok(resolved) => {
                return Ok(missing
                    .into_iter()
                    .rev()
                    .fold(resolved, |acc: PathBuf, name| acc.join(name)));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match (base.parent(), base.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name);
                        base = if parent.as_os_str().is_empty() {
                            Path::new(".")
                        } else {
                            parent
                        };
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Copy a file or directory tree onto `dest`.
///
/// Existing files at the destination are overwritten. Files present in the
/// destination but not in the source are left alone. Intermediate directories
/// are created as needed.
///
/// Copying a path onto itself or into its own subtree is rejected with
/// [ErrorKind::InvalidInput] before anything is written.
///
/// Returns the number of files copied.
pub fn copy_tree(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> std::io::Result<u64> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    let metadata = std::fs::metadata(source)?;

    let resolved_source = source.canonicalize()?;
    if canonicalize_partial(dest)?.starts_with(&resolved_source) {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!(
                "cannot copy {} into itself at {}",
                source.display(),
                dest.display()
            ),
        ));
    }

    if !metadata.is_dir() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, dest)?;

        return Ok(1);
    }

    let mut copied = 0;

    for entry in walkdir::WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::new(ErrorKind::Other, e))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}
