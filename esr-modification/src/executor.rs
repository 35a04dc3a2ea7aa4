// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Execution of individual operations.

use {
    crate::manifest::{Operation, Replacement},
    esr_common::fs::copy_tree,
    log::{info, warn},
    std::path::{Path, PathBuf},
    thiserror::Error,
};

/// Why an operation failed.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("failed copying {} to {}: {cause}", .from.display(), .to.display())]
    CopyError {
        from: PathBuf,
        to: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {cause}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("file is not UTF-8 text: {}", .0.display())]
    NotText(PathBuf),
}

/// The result of executing an operation.
#[derive(Debug)]
pub enum OperationStatus {
    Success,
    Failed(OperationError),
}

impl OperationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Success => None,
            Self::Failed(err) => Some(err),
        }
    }
}

/// An operation paired with the result of executing it.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub operation: Operation,
    pub status: OperationStatus,
}

/// Inputs needed to resolve and execute operations.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// Root of the extracted installer tree. Targets resolve against it.
    pub source_tree_root: PathBuf,
    /// Directory holding the manifest. Replacement sources resolve against it.
    pub manifest_dir: PathBuf,
    /// Substituted for [Replacement::ProductVersion].
    pub product_version: String,
}

impl ExecutionContext {
    pub fn new(
        source_tree_root: impl AsRef<Path>,
        manifest_dir: impl AsRef<Path>,
        product_version: impl ToString,
    ) -> Self {
        Self {
            source_tree_root: source_tree_root.as_ref().to_path_buf(),
            manifest_dir: manifest_dir.as_ref().to_path_buf(),
            product_version: product_version.to_string(),
        }
    }
}

fn replace_file(
    context: &ExecutionContext,
    source: &Path,
    target: &Path,
) -> Result<(), OperationError> {
    let from = context.manifest_dir.join(source);
    let to = context.source_tree_root.join(target);

    match copy_tree(&from, &to) {
        Ok(count) => {
            info!(
                "copied {} file(s) from {} to {}",
                count,
                from.display(),
                to.display()
            );
            Ok(())
        }
        Err(cause) => Err(OperationError::CopyError { from, to, cause }),
    }
}

fn replace_string(
    context: &ExecutionContext,
    file: &Path,
    match_text: &str,
    replacement: &Replacement,
) -> Result<(), OperationError> {
    let path = context.source_tree_root.join(file);

    if !path.is_file() {
        return Err(OperationError::FileNotFound(path));
    }

    let data = std::fs::read(&path).map_err(|cause| OperationError::IoError {
        path: path.clone(),
        cause,
    })?;

    // NUL bytes mean binary or UTF-16 content, which a textual replace would
    // corrupt.
    if data.contains(&0) {
        return Err(OperationError::NotText(path));
    }
    let text = match String::from_utf8(data) {
        Ok(text) => text,
        Err(_) => return Err(OperationError::NotText(path)),
    };

    let count = text.matches(match_text).count();
    if count == 0 {
        warn!("{}: no occurrences of {:?}", path.display(), match_text);
        return Ok(());
    }

    let updated = text.replace(match_text, replacement.resolve(&context.product_version));

    std::fs::write(&path, updated).map_err(|cause| OperationError::IoError {
        path: path.clone(),
        cause,
    })?;

    info!("replaced {} occurrence(s) in {}", count, path.display());

    Ok(())
}

/// Execute a single operation.
///
/// Failures are captured in the returned status rather than propagated.
pub fn execute(operation: &Operation, context: &ExecutionContext) -> OperationStatus {
    let res = match operation {
        Operation::ReplaceFile { source, target } => replace_file(context, source, target),
        Operation::ReplaceString {
            file,
            match_text,
            replacement,
        } => replace_string(context, file, match_text, replacement),
    };

    match res {
        Ok(()) => OperationStatus::Success,
        Err(err) => OperationStatus::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    struct Fixture {
        _td: TempDir,
        context: ExecutionContext,
    }

    impl Fixture {
        fn new() -> std::io::Result<Self> {
            let td = tempfile::tempdir()?;
            let tree = td.path().join("tree");
            let manifest_dir = td.path().join("manifest");
            std::fs::create_dir_all(tree.join("core"))?;
            std::fs::create_dir_all(&manifest_dir)?;

            Ok(Self {
                context: ExecutionContext::new(tree, manifest_dir, "115.3.1"),
                _td: td,
            })
        }

        fn tree(&self, rel: &str) -> PathBuf {
            self.context.source_tree_root.join(rel)
        }

        fn manifest(&self, rel: &str) -> PathBuf {
            self.context.manifest_dir.join(rel)
        }
    }

    fn replace_string_op(file: &str, match_text: &str, replacement: Replacement) -> Operation {
        Operation::ReplaceString {
            file: PathBuf::from(file),
            match_text: match_text.to_string(),
            replacement,
        }
    }

    #[test]
    fn replace_file_from_manifest_dir() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::write(f.manifest("mozilla.cfg"), "// locked")?;
        std::fs::write(f.tree("core/mozilla.cfg"), "// stock")?;

        let status = execute(
            &Operation::ReplaceFile {
                source: PathBuf::from("mozilla.cfg"),
                target: PathBuf::from("core/mozilla.cfg"),
            },
            &f.context,
        );

        assert!(status.is_success());
        assert_eq!(std::fs::read_to_string(f.tree("core/mozilla.cfg"))?, "// locked");

        Ok(())
    }

    #[test]
    fn replace_file_directory_subtree() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::create_dir_all(f.manifest("distribution/extensions"))?;
        std::fs::write(f.manifest("distribution/policies.json"), "{}")?;
        std::fs::write(f.manifest("distribution/extensions/ublock.xpi"), "xpi")?;

        let status = execute(
            &Operation::ReplaceFile {
                source: PathBuf::from("distribution"),
                target: PathBuf::from("core/distribution"),
            },
            &f.context,
        );

        assert!(status.is_success());
        assert_eq!(
            std::fs::read_to_string(f.tree("core/distribution/policies.json"))?,
            "{}"
        );
        assert_eq!(
            std::fs::read_to_string(f.tree("core/distribution/extensions/ublock.xpi"))?,
            "xpi"
        );

        Ok(())
    }

    #[test]
    fn replace_file_missing_source() -> std::io::Result<()> {
        let f = Fixture::new()?;

        let status = execute(
            &Operation::ReplaceFile {
                source: PathBuf::from("missing.cfg"),
                target: PathBuf::from("core/mozilla.cfg"),
            },
            &f.context,
        );

        match status {
            OperationStatus::Failed(OperationError::CopyError { from, .. }) => {
                assert_eq!(from, f.manifest("missing.cfg"))
            }
            status => panic!("unexpected status: {:?}", status),
        }

        Ok(())
    }

    #[test]
    fn replace_file_into_own_subtree() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::create_dir_all(f.tree("distribution"))?;
        std::fs::write(f.tree("distribution/policies.json"), "{}")?;

        // The manifest sits at the tree root, so the source is inside the tree.
        let context = ExecutionContext::new(
            &f.context.source_tree_root,
            &f.context.source_tree_root,
            "115.3.1",
        );
        let status = execute(
            &Operation::ReplaceFile {
                source: PathBuf::from("distribution"),
                target: PathBuf::from("distribution/backup"),
            },
            &context,
        );

        assert!(matches!(
            status.error(),
            Some(OperationError::CopyError { .. })
        ));
        assert!(!f.tree("distribution/backup").exists());

        Ok(())
    }

    #[test]
    fn replace_string_literal_all_occurrences() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::write(f.tree("core/prefs.js"), "a=1;b=1;a=1;")?;

        let status = execute(
            &replace_string_op("core/prefs.js", "a=1", Replacement::Literal("a=2".into())),
            &f.context,
        );

        assert!(status.is_success());
        assert_eq!(std::fs::read_to_string(f.tree("core/prefs.js"))?, "a=2;b=1;a=2;");

        Ok(())
    }

    #[test]
    fn replace_string_product_version() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::write(
            f.tree("core/mozilla.cfg"),
            "lockPref(\"v\", \"@V@\");\n// built for @V@\n",
        )?;

        let status = execute(
            &replace_string_op("core/mozilla.cfg", "@V@", Replacement::ProductVersion),
            &f.context,
        );

        assert!(status.is_success());
        assert_eq!(
            std::fs::read_to_string(f.tree("core/mozilla.cfg"))?,
            "lockPref(\"v\", \"115.3.1\");\n// built for 115.3.1\n"
        );

        Ok(())
    }

    #[test]
    fn replace_string_non_overlapping() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::write(f.tree("core/a.txt"), "aaaa")?;

        execute(
            &replace_string_op("core/a.txt", "aa", Replacement::Literal("b".into())),
            &f.context,
        );

        assert_eq!(std::fs::read_to_string(f.tree("core/a.txt"))?, "bb");

        Ok(())
    }

    #[test]
    fn replace_string_missing_file() -> std::io::Result<()> {
        let f = Fixture::new()?;

        match execute(
            &replace_string_op("core/absent.js", "x", Replacement::Literal("y".into())),
            &f.context,
        ) {
            OperationStatus::Failed(OperationError::FileNotFound(p)) => {
                assert_eq!(p, f.tree("core/absent.js"))
            }
            status => panic!("unexpected status: {:?}", status),
        }

        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn replace_string_read_failure() {
        // A regular file whose reads fail with EIO.
        let context = ExecutionContext::new("/proc/self", "/nonexistent", "115.3.1");

        match execute(
            &replace_string_op("mem", "x", Replacement::Literal("y".into())),
            &context,
        ) {
            OperationStatus::Failed(OperationError::IoError { path, .. }) => {
                assert_eq!(path, PathBuf::from("/proc/self/mem"))
            }
            status => panic!("unexpected status: {:?}", status),
        }
    }

    #[test]
    fn replace_string_binary_untouched() -> std::io::Result<()> {
        let f = Fixture::new()?;
        let data = b"MZ\x90\x00\x03\x00firefox";
        std::fs::write(f.tree("core/firefox.exe"), data)?;

        let status = execute(
            &replace_string_op("core/firefox.exe", "firefox", Replacement::Literal("x".into())),
            &f.context,
        );

        assert!(matches!(
            status,
            OperationStatus::Failed(OperationError::NotText(_))
        ));
        assert_eq!(std::fs::read(f.tree("core/firefox.exe"))?, data);

        Ok(())
    }

    #[test]
    fn replace_string_invalid_utf8() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::write(f.tree("core/latin1.txt"), b"caf\xe9")?;

        let status = execute(
            &replace_string_op("core/latin1.txt", "caf", Replacement::Literal("x".into())),
            &f.context,
        );

        assert!(matches!(
            status.error(),
            Some(OperationError::NotText(_))
        ));

        Ok(())
    }

    #[test]
    fn replace_string_without_match() -> std::io::Result<()> {
        let f = Fixture::new()?;
        std::fs::write(f.tree("core/prefs.js"), "unchanged")?;

        let status = execute(
            &replace_string_op("core/prefs.js", "absent", Replacement::Literal("x".into())),
            &f.context,
        );

        assert!(status.is_success());
        assert_eq!(std::fs::read_to_string(f.tree("core/prefs.js"))?, "unchanged");

        Ok(())
    }
}
