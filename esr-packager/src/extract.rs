// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Unpacking of the vendor installer into a file tree. */

use {
    log::{info, warn},
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
        process::Output,
        sync::{mpsc, Arc},
        time::Duration,
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unable to run {}: {cause}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("{} exited with {status}: {output}", .program.display())]
    Failed {
        program: PathBuf,
        status: String,
        output: String,
    },

    #[error("extraction of {} did not finish within {timeout:?}", .setup.display())]
    ExtractionTimedOut { setup: PathBuf, timeout: Duration },

    #[error("installer binary missing after extraction: {}", .0.display())]
    EntryBinaryMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Populates a directory with the file tree of an installer.
pub trait SetupExtractor {
    fn extract(&self, setup: &Path, dest: &Path) -> Result<(), ExtractError>;
}

/// Extracts self-extracting installers with 7-Zip.
#[derive(Clone, Debug)]
pub struct SevenZipExtractor {
    program: PathBuf,
    timeout: Duration,
}

impl SevenZipExtractor {
    pub fn new(program: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            timeout,
        }
    }
}

impl SetupExtractor for SevenZipExtractor {
    fn extract(&self, setup: &Path, dest: &Path) -> Result<(), ExtractError> {
        std::fs::create_dir_all(dest)?;

        let mut out_arg = OsString::from("-o");
        out_arg.push(dest.as_os_str());

        let args: Vec<OsString> = vec![
            "x".into(),
            "-y".into(),
            out_arg,
            setup.as_os_str().to_os_string(),
        ];

        warn!(
            "extracting {} to {} with {}",
            setup.display(),
            dest.display(),
            self.program.display()
        );

        let expression = duct::cmd(&self.program, args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked();

        let output = run_with_timeout(&self.program, expression, self.timeout)?.ok_or_else(
            || ExtractError::ExtractionTimedOut {
                setup: setup.to_path_buf(),
                timeout: self.timeout,
            },
        )?;

        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            info!("{}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ExtractError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                output: text.trim().to_string(),
            })
        }
    }
}

/// Run an expression, killing it if it outlives `timeout`.
///
/// Returns `None` when the process was killed.
pub(crate) fn run_with_timeout(
    program: &Path,
    expression: duct::Expression,
    timeout: Duration,
) -> Result<Option<Output>, ExtractError> {
    let handle = Arc::new(expression.start().map_err(|cause| ExtractError::Spawn {
        program: program.to_path_buf(),
        cause,
    })?);

    let (sender, receiver) = mpsc::channel();
    let waiter = handle.clone();
    std::thread::spawn(move || {
        let res = waiter.wait().map(|output| output.clone());
        // The receiver is gone once the timeout fired.
        let _ = sender.send(res);
    });

    match receiver.recv_timeout(timeout) {
        Ok(res) => Ok(Some(res?)),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            if let Err(e) = handle.kill() {
                warn!("unable to kill {}: {}", program.display(), e);
            }
            Ok(None)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExtractError::Io(
            std::io::Error::new(std::io::ErrorKind::Other, "process waiter exited"),
        )),
    }
}

/// Ensure extraction produced the expected installer binary.
///
/// Returns the absolute path of the binary.
pub fn verify_entry_binary(tree: &Path, entry: &Path) -> Result<PathBuf, ExtractError> {
    let path = tree.join(entry);

    if path.is_file() {
        Ok(path)
    } else {
        Err(ExtractError::EntryBinaryMissing(path))
    }
}
