// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{config::ConfigError, extract::ExtractError, publish::PublishError},
    esr_common::{http::HttpError, naming::NamingError},
    esr_modification::ManifestError,
    esr_version::VersionProbeError,
    std::path::PathBuf,
    thiserror::Error,
};

/// Exit code of a run that fully succeeded.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code of a run that stopped before touching the installer tree.
pub const EXIT_ABORTED: i32 = 1;
/// Exit code of a run where some modifications failed.
pub const EXIT_OPERATION_FAILURES: i32 = 2;
/// Exit code of a run that failed after modifications began.
pub const EXIT_FATAL: i32 = 3;
/// Exit code of a run whose package was built but not registered.
pub const EXIT_REGISTRATION_FAILED: i32 = 4;

/// Errors that abort a packaging run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("setup acquisition failed: {0}")]
    Download(#[from] HttpError),

    #[error("setup acquisition failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("setup acquisition failed: installer not found: {}", .0.display())]
    SetupMissing(PathBuf),

    #[error("setup acquisition failed: I/O error on {}: {cause}", .path.display())]
    WorkDirectory {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("version probe failed: {0}")]
    VersionProbe(#[from] VersionProbeError),

    #[error("manifest error in {}: {cause}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        cause: ManifestError,
    },

    #[error("output naming failed: {0}")]
    OutputNaming(#[from] NamingError),

    #[error("output directory appeared concurrently: {}", .0.display())]
    OutputCollision(PathBuf),

    #[error("copying package to {} failed: {cause}", .path.display())]
    OutputCopy {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("publishing failed: {0}")]
    Publish(#[from] PublishError),
}

/// Pipeline stage an error occurred in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Config,
    SetupAcquisition,
    VersionProbe,
    Manifest,
    OutputNaming,
    OutputCopy,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Config => "configuration",
            Self::SetupAcquisition => "setup acquisition",
            Self::VersionProbe => "version probe",
            Self::Manifest => "manifest load",
            Self::OutputNaming => "output naming",
            Self::OutputCopy => "output copy",
            Self::Publish => "publish",
        })
    }
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) => Stage::Config,
            Self::Download(_)
            | Self::Extraction(_)
            | Self::SetupMissing(_)
            | Self::WorkDirectory { .. } => Stage::SetupAcquisition,
            Self::VersionProbe(_) => Stage::VersionProbe,
            Self::Manifest { .. } => Stage::Manifest,
            Self::OutputNaming(_) | Self::OutputCollision(_) => Stage::OutputNaming,
            Self::OutputCopy { .. } => Stage::OutputCopy,
            Self::Publish(_) => Stage::Publish,
        }
    }

    /// Whether the run stopped before any modification was attempted.
    pub fn aborted_before_modifications(&self) -> bool {
        matches!(
            self.stage(),
            Stage::Config | Stage::SetupAcquisition | Stage::VersionProbe | Stage::Manifest
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.aborted_before_modifications() {
            EXIT_ABORTED
        } else {
            EXIT_FATAL
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
