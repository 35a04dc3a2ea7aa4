// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Copying finished packages to a content store. */

use {
    esr_common::fs::copy_tree,
    log::{info, warn},
    std::path::{Path, PathBuf},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("package path has no final component: {}", .0.display())]
    InvalidPackage(PathBuf),

    #[error("failed publishing {} to {}: {cause}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}

/// What happened to a package handed to a publisher.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PublishOutcome {
    /// The package was copied to the given location.
    Published(PathBuf),
    /// The given location already existed and was left untouched.
    Skipped(PathBuf),
}

impl PublishOutcome {
    /// Location of the package in the content store.
    pub fn location(&self) -> &Path {
        match self {
            Self::Published(p) | Self::Skipped(p) => p,
        }
    }
}

/// Copies a completed package directory to a durable location.
pub trait TreePublisher {
    fn publish(&self, package: &Path) -> Result<PublishOutcome, PublishError>;
}

/// Publishes packages as subdirectories of a root directory.
#[derive(Clone, Debug)]
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl TreePublisher for DirectoryPublisher {
    fn publish(&self, package: &Path) -> Result<PublishOutcome, PublishError> {
        let name = package
            .file_name()
            .ok_or_else(|| PublishError::InvalidPackage(package.to_path_buf()))?;
        let dest = self.root.join(name);

        if dest.exists() {
            warn!("{} already exists; not publishing", dest.display());
            return Ok(PublishOutcome::Skipped(dest));
        }

        warn!("publishing {} to {}", package.display(), dest.display());
        let count = copy_tree(package, &dest).map_err(|cause| PublishError::Copy {
            from: package.to_path_buf(),
            to: dest.clone(),
            cause,
        })?;
        info!("published {} file(s)", count);

        Ok(PublishOutcome::Published(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_new_package() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;
        let package = td.path().join("out/FirefoxESR_115.3.1esr_230926");
        std::fs::create_dir_all(package.join("core"))?;
        std::fs::write(package.join("setup.exe"), "MZ")?;
        std::fs::write(package.join("core/mozilla.cfg"), "cfg")?;

        let publisher = DirectoryPublisher::new(td.path().join("store"));
        let outcome = publisher.publish(&package)?;

        let dest = td.path().join("store/FirefoxESR_115.3.1esr_230926");
        assert_eq!(outcome, PublishOutcome::Published(dest.clone()));
        assert_eq!(std::fs::read_to_string(dest.join("core/mozilla.cfg"))?, "cfg");

        Ok(())
    }

    #[test]
    fn existing_destination_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;
        let package = td.path().join("out/pkg");
        std::fs::create_dir_all(&package)?;
        std::fs::write(package.join("setup.exe"), "new")?;

        let existing = td.path().join("store/pkg");
        std::fs::create_dir_all(&existing)?;
        std::fs::write(existing.join("setup.exe"), "old")?;

        let outcome = DirectoryPublisher::new(td.path().join("store")).publish(&package)?;

        assert_eq!(outcome, PublishOutcome::Skipped(existing.clone()));
        assert_eq!(outcome.location(), existing.as_path());
        assert_eq!(std::fs::read_to_string(existing.join("setup.exe"))?, "old");

        Ok(())
    }

    #[test]
    fn missing_package_is_copy_error() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;

        let res = DirectoryPublisher::new(td.path().join("store")).publish(&td.path().join("gone"));
        assert!(matches!(res, Err(PublishError::Copy { .. })));

        Ok(())
    }
}
