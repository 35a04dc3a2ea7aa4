// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collision free naming of output directories.
//!
//! Names are checked against an existence predicate and nothing is reserved.
//! Two concurrent runs against the same output root can pick the same name;
//! callers are expected to create the final directory with a non-recursive
//! create so the loser observes the collision.

use {
    chrono::NaiveDate,
    std::path::{Path, PathBuf},
    thiserror::Error,
};

/// Maximum number of candidate names tried before giving up.
pub const MAX_CANDIDATES: usize = 10_000;

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("no available name for {base} under {} after {attempts} attempts", .root.display())]
    NamingExhausted {
        root: PathBuf,
        base: String,
        attempts: usize,
    },
}

pub type Result<T> = std::result::Result<T, NamingError>;

/// Compute the base name of an output directory.
///
/// The form is `<family>_<product_version>esr_<YYMMDD>`.
pub fn output_base_name(family: &str, product_version: &str, date: NaiveDate) -> String {
    format!("{}_{}esr_{}", family, product_version, date.format("%y%m%d"))
}

/// Find the first path under `root` not reported as existing.
///
/// `root/base` is tried first, followed by `root/base_2`, `root/base_3`, ...
pub fn next_available(
    root: &Path,
    base: &str,
    exists: impl FnMut(&Path) -> bool,
) -> Result<PathBuf> {
    next_available_bounded(root, base, exists, MAX_CANDIDATES)
}

/// [next_available] with an explicit bound on the number of candidates.
pub fn next_available_bounded(
    root: &Path,
    base: &str,
    mut exists: impl FnMut(&Path) -> bool,
    max_candidates: usize,
) -> Result<PathBuf> {
    std::iter::once(root.join(base))
        .chain((2..).map(|n| root.join(format!("{}_{}", base, n))))
        .take(max_candidates)
        .find(|candidate| !exists(candidate.as_path()))
        .ok_or_else(|| NamingError::NamingExhausted {
            root: root.to_path_buf(),
            base: base.to_string(),
            attempts: max_candidates,
        })
}
