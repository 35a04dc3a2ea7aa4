// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! End to end packaging runs.

A run acquires the installer, extracts it into a private working directory,
probes it for its version, applies the modifications manifest and copies the
result into a freshly named output directory. The finished package is then
optionally published and registered.

Nothing is rolled back. A failure after modifications began leaves whatever
was already produced in place.
*/

use {
    crate::{
        config::PackagerConfig,
        error::{
            PipelineError, Result, EXIT_OPERATION_FAILURES, EXIT_REGISTRATION_FAILED,
            EXIT_SUCCESS,
        },
        extract::{verify_entry_binary, SetupExtractor, SevenZipExtractor},
        publish::{DirectoryPublisher, PublishOutcome, TreePublisher},
        registrar::{
            detection_script, ConfigMgrRegistrar, DeploymentRegistrar, DeploymentRequest,
            RegistrarError,
        },
    },
    chrono::NaiveDate,
    esr_common::{
        fs::copy_tree,
        http::{download_to_path, RemoteContent},
        naming::{next_available, output_base_name},
    },
    esr_modification::{apply, ExecutionContext, Manifest, ModificationReport},
    esr_version::{VersionInfo, VersionProbeError},
    log::{error, info, warn},
    std::path::{Path, PathBuf},
};

/// Directory of the package receiving the installer tree in toolkit layout.
pub const TOOLKIT_FILES_DIR: &str = "Files";

/// Source of version metadata for a binary.
pub trait VersionSource {
    fn probe(&self, binary: &Path) -> std::result::Result<VersionInfo, VersionProbeError>;
}

/// Reads the version resource of PE binaries.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeVersionSource;

impl VersionSource for PeVersionSource {
    fn probe(&self, binary: &Path) -> std::result::Result<VersionInfo, VersionProbeError> {
        esr_version::probe(binary)
    }
}

/// Result of the optional registration stage.
#[derive(Debug)]
pub enum RegistrationStatus {
    NotRequested,
    Registered,
    Failed(RegistrarError),
}

/// Summary of a run that produced a package.
#[derive(Debug)]
pub struct RunReport {
    pub version: VersionInfo,
    pub output_dir: PathBuf,
    pub modifications: ModificationReport,
    pub publish: Option<PublishOutcome>,
    pub registration: RegistrationStatus,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if matches!(self.registration, RegistrationStatus::Failed(_)) {
            EXIT_REGISTRATION_FAILED
        } else if !self.modifications.is_success() {
            EXIT_OPERATION_FAILURES
        } else {
            EXIT_SUCCESS
        }
    }

    /// Log the per operation outcomes and the final state of the run.
    pub fn log_summary(&self) {
        self.modifications.log_summary();

        warn!(
            "package for {} written to {}",
            self.version.product_version,
            self.output_dir.display()
        );

        match &self.publish {
            Some(PublishOutcome::Published(p)) => warn!("published to {}", p.display()),
            Some(PublishOutcome::Skipped(p)) => {
                warn!("publish skipped; {} already existed", p.display())
            }
            None => {}
        }

        match &self.registration {
            RegistrationStatus::NotRequested => {}
            RegistrationStatus::Registered => warn!("deployment registered"),
            RegistrationStatus::Failed(e) => error!("deployment registration failed: {}", e),
        }
    }
}

/// Drives packaging runs for a configuration.
pub struct Pipeline {
    config: PackagerConfig,
    extractor: Box<dyn SetupExtractor>,
    versions: Box<dyn VersionSource>,
    publisher: Option<Box<dyn TreePublisher>>,
    registrar: Option<Box<dyn DeploymentRegistrar>>,
    date: NaiveDate,
}

impl Pipeline {
    /// Construct a pipeline using the collaborators named by `config`.
    pub fn new(config: PackagerConfig) -> Result<Self> {
        config.validate()?;

        let extractor = Box::new(SevenZipExtractor::new(
            &config.extraction.program,
            config.extraction.timeout(),
        ));

        let publisher = config
            .publish_root
            .as_ref()
            .map(|root| Box::new(DirectoryPublisher::new(root)) as Box<dyn TreePublisher>);

        let registrar = config.deployment.as_ref().map(|deployment| {
            Box::new(ConfigMgrRegistrar::new(
                &deployment.site_code,
                deployment.site_server.clone(),
            )) as Box<dyn DeploymentRegistrar>
        });

        Ok(Self {
            config,
            extractor,
            versions: Box::new(PeVersionSource),
            publisher,
            registrar,
            date: chrono::Local::now().date_naive(),
        })
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: impl SetupExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    #[must_use]
    pub fn with_version_source(mut self, versions: impl VersionSource + 'static) -> Self {
        self.versions = Box::new(versions);
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: impl TreePublisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    #[must_use]
    pub fn with_registrar(mut self, registrar: impl DeploymentRegistrar + 'static) -> Self {
        self.registrar = Some(Box::new(registrar));
        self
    }

    /// Date stamped into output directory names.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Perform a packaging run.
    ///
    /// `setup` is a local installer to use instead of downloading one.
    pub fn run(&self, setup: Option<&Path>) -> Result<RunReport> {
        let output_root = self.config.output_root()?;

        let temp_root = &self.config.temp_root;
        std::fs::create_dir_all(temp_root).map_err(|cause| PipelineError::WorkDirectory {
            path: temp_root.clone(),
            cause,
        })?;
        let work = tempfile::Builder::new()
            .prefix("esr-packager-")
            .tempdir_in(temp_root)
            .map_err(|cause| PipelineError::WorkDirectory {
                path: temp_root.clone(),
                cause,
            })?;
        info!("working directory {}", work.path().display());

        let setup = self.acquire(setup, work.path())?;

        let tree = work.path().join("setup");
        self.extractor.extract(&setup, &tree)?;
        verify_entry_binary(&tree, &self.config.entry_binary)?;

        let version = self
            .versions
            .probe(&tree.join(&self.config.version_binary))?;
        warn!(
            "product version {} (file version {})",
            version.product_version, version.file_version
        );

        let (manifest, manifest_dir) = self.load_manifest()?;

        let context = ExecutionContext::new(&tree, manifest_dir, &version.product_version);
        warn!("applying {} modification(s)", manifest.len());
        let modifications = apply(&manifest, &context);

        let output_dir = self.create_output_dir(output_root, &version.product_version)?;
        self.copy_out(&tree, &output_dir)?;

        let publish = match &self.publisher {
            Some(publisher) => Some(publisher.publish(&output_dir)?),
            None => None,
        };

        let content_location = publish
            .as_ref()
            .map(|outcome| outcome.location().to_path_buf())
            .unwrap_or_else(|| output_dir.clone());
        let registration = self.register(&version, &content_location);

        Ok(RunReport {
            version,
            output_dir,
            modifications,
            publish,
            registration,
        })
    }

    fn acquire(&self, setup: Option<&Path>, work: &Path) -> Result<PathBuf> {
        if let Some(path) = setup {
            return if path.is_file() {
                warn!("using local installer {}", path.display());
                Ok(path.to_path_buf())
            } else {
                Err(PipelineError::SetupMissing(path.to_path_buf()))
            };
        }

        let content = RemoteContent {
            name: "Firefox ESR installer".to_string(),
            url: self.config.download_url.clone(),
            sha256: self.config.download_sha256.clone(),
        };
        let dest = work.join("firefox-esr-setup.exe");

        download_to_path(&content, &dest)?;

        Ok(dest)
    }

    fn load_manifest(&self) -> Result<(Manifest, PathBuf)> {
        match &self.config.manifest {
            Some(path) => {
                warn!("loading manifest {}", path.display());
                let manifest =
                    Manifest::from_path(path).map_err(|cause| PipelineError::Manifest {
                        path: path.clone(),
                        cause,
                    })?;
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

                Ok((manifest, dir))
            }
            None => {
                warn!("no manifest configured; packaging the installer unmodified");
                Ok((Manifest::default(), PathBuf::new()))
            }
        }
    }

    fn create_output_dir(&self, root: &Path, product_version: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(root).map_err(|cause| PipelineError::OutputCopy {
            path: root.to_path_buf(),
            cause,
        })?;

        let base = output_base_name(&self.config.product_family, product_version, self.date);
        let path = next_available(root, &base, |p| p.exists())?;

        // Non-recursive so a directory created since the probe is detected.
        match std::fs::create_dir(&path) {
            Ok(()) => {
                warn!("writing package to {}", path.display());
                Ok(path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PipelineError::OutputCollision(path))
            }
            Err(cause) => Err(PipelineError::OutputCopy { path, cause }),
        }
    }

    fn copy_out(&self, tree: &Path, output_dir: &Path) -> Result<()> {
        let dest = match (&self.config.toolkit_template, self.config.toolkit_layout) {
            (Some(template), true) => {
                info!("copying toolkit template {}", template.display());
                copy_tree(template, output_dir).map_err(|cause| PipelineError::OutputCopy {
                    path: output_dir.to_path_buf(),
                    cause,
                })?;

                output_dir.join(TOOLKIT_FILES_DIR)
            }
            _ => output_dir.to_path_buf(),
        };

        let count = copy_tree(tree, &dest).map_err(|cause| PipelineError::OutputCopy {
            path: dest.clone(),
            cause,
        })?;
        info!("copied {} file(s) to {}", count, dest.display());

        Ok(())
    }

    fn register(&self, version: &VersionInfo, content_location: &Path) -> RegistrationStatus {
        let (registrar, deployment) = match (&self.registrar, &self.config.deployment) {
            (Some(registrar), Some(deployment)) => (registrar, deployment),
            (Some(_), None) => {
                warn!("no deployment section configured; not registering");
                return RegistrationStatus::NotRequested;
            }
            (None, _) => return RegistrationStatus::NotRequested,
        };

        let layout = self.config.toolkit_layout;
        let request = DeploymentRequest {
            title: deployment.application_name(&version.product_version),
            version: version.product_version.clone(),
            publisher: deployment.publisher.clone(),
            install_command: deployment.install_command(layout),
            uninstall_command: deployment.uninstall_command(layout),
            content_location: content_location.to_path_buf(),
            detection_script: detection_script(&deployment.install_path, &version.product_version),
            user_interaction: deployment.user_interaction,
            estimated_runtime_mins: deployment.estimated_runtime_mins,
            maximum_runtime_mins: deployment.maximum_runtime_mins,
        };

        match registrar.register(&request) {
            Ok(()) => RegistrationStatus::Registered,
            Err(e) => {
                error!("registering {} failed: {}", request.title, e);
                RegistrationStatus::Failed(e)
            }
        }
    }
}
