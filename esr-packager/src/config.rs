// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Packager configuration. */

use {
    serde::{Deserialize, Serialize},
    std::{
        path::{Path, PathBuf},
        time::Duration,
    },
    thiserror::Error,
};

/// Mozilla's redirect to the newest ESR build.
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://download.mozilla.org/?product=firefox-esr-latest-ssl&os=win64&lang=en-US";

/// Substituted with the product version in application names.
pub const VERSION_TOKEN: &str = "{version}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How the archive tool is invoked.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Program name or path of the 7-Zip compatible tool.
    pub program: PathBuf,

    /// Seconds to wait for extraction before killing the tool.
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("7z"),
            timeout_secs: 600,
        }
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Window state of the installer during deployment.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum UserInteraction {
    #[default]
    Hidden,
    Normal,
    Minimized,
    Maximized,
}

impl std::fmt::Display for UserInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Hidden => "Hidden",
            Self::Normal => "Normal",
            Self::Minimized => "Minimized",
            Self::Maximized => "Maximized",
        })
    }
}

fn default_application_name() -> String {
    format!("Mozilla Firefox {} ESR", VERSION_TOKEN)
}

fn default_publisher() -> String {
    "Mozilla".to_string()
}

fn default_estimated_runtime() -> u32 {
    5
}

fn default_maximum_runtime() -> u32 {
    15
}

fn default_install_path() -> String {
    r"C:\Program Files\Mozilla Firefox".to_string()
}

/// Registration of the finished package with Configuration Manager.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Site code, also the name of the provider drive.
    pub site_code: String,

    /// SMS provider server. The site drive is assumed to exist when unset.
    #[serde(default)]
    pub site_server: Option<String>,

    /// Application title. `{version}` expands to the product version.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    #[serde(default = "default_publisher")]
    pub publisher: String,

    /// Defaults depend on the package layout.
    #[serde(default)]
    pub install_command: Option<String>,

    /// Defaults depend on the package layout.
    #[serde(default)]
    pub uninstall_command: Option<String>,

    #[serde(default)]
    pub user_interaction: UserInteraction,

    #[serde(default = "default_estimated_runtime")]
    pub estimated_runtime_mins: u32,

    #[serde(default = "default_maximum_runtime")]
    pub maximum_runtime_mins: u32,

    /// Install directory probed by the detection script.
    #[serde(default = "default_install_path")]
    pub install_path: String,
}

impl DeploymentConfig {
    /// Resolve the application title for a product version.
    pub fn application_name(&self, product_version: &str) -> String {
        self.application_name.replace(VERSION_TOKEN, product_version)
    }

    pub fn install_command(&self, toolkit_layout: bool) -> String {
        match (&self.install_command, toolkit_layout) {
            (Some(command), _) => command.clone(),
            (None, true) => {
                "Deploy-Application.exe -DeploymentType Install -DeployMode Silent".to_string()
            }
            (None, false) => "setup.exe /S".to_string(),
        }
    }

    pub fn uninstall_command(&self, toolkit_layout: bool) -> String {
        match (&self.uninstall_command, toolkit_layout) {
            (Some(command), _) => command.clone(),
            (None, true) => {
                "Deploy-Application.exe -DeploymentType Uninstall -DeployMode Silent".to_string()
            }
            (None, false) => format!(r#""{}\uninstall\helper.exe" /S"#, self.install_path),
        }
    }
}

/// Everything a packaging run needs to know.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagerConfig {
    /// Where the installer is fetched from.
    pub download_url: String,

    /// Expected hex SHA-256 of the downloaded installer.
    pub download_sha256: Option<String>,

    /// Parent of the per-run working directory.
    pub temp_root: PathBuf,

    /// Directory receiving finished packages.
    pub output_root: Option<PathBuf>,

    /// Content store finished packages are published to.
    pub publish_root: Option<PathBuf>,

    /// Modifications manifest. No modifications are made when unset.
    pub manifest: Option<PathBuf>,

    /// First component of output directory names.
    pub product_family: String,

    /// File that must exist in the extracted tree.
    pub entry_binary: PathBuf,

    /// Binary whose version resource names the package.
    pub version_binary: PathBuf,

    pub extraction: ExtractionConfig,

    /// Wrap the installer in a deployment toolkit template.
    pub toolkit_layout: bool,

    /// Template copied to the package root when `toolkit_layout` is set.
    pub toolkit_template: Option<PathBuf>,

    pub deployment: Option<DeploymentConfig>,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            download_sha256: None,
            temp_root: std::env::temp_dir().join("esr-packager"),
            output_root: None,
            publish_root: None,
            manifest: None,
            product_family: "FirefoxESR".to_string(),
            entry_binary: PathBuf::from("setup.exe"),
            version_binary: PathBuf::from("core").join("firefox.exe"),
            extraction: ExtractionConfig::default(),
            toolkit_layout: false,
            toolkit_template: None,
            deployment: None,
        }
    }
}

impl PackagerConfig {
    /// Parse a YAML document.
    ///
    /// Relative paths are left as is.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML document from a file.
    ///
    /// Relative paths in the document are interpreted relative to the
    /// directory containing the file. An extraction program given as a bare
    /// name is left alone so it is still looked up on `PATH`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let data =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config = Self::from_yaml_str(&data)?;

        if let Some(parent) = path.parent() {
            config.resolve_relative_to(parent);
        }

        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            self.output_root.as_mut(),
            self.publish_root.as_mut(),
            self.manifest.as_mut(),
            self.toolkit_template.as_mut(),
        ]
        .into_iter()
        .flatten()
        .chain(std::iter::once(&mut self.temp_root))
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }

        let program = &mut self.extraction.program;
        if program.is_relative() && program.components().count() > 1 {
            *program = base.join(&*program);
        }
    }

    /// The output root, which must be configured before running.
    pub fn output_root(&self) -> Result<&Path> {
        self.output_root
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("output_root is not set".to_string()))
    }

    /// Check for combinations of options that cannot work.
    pub fn validate(&self) -> Result<()> {
        self.output_root()?;

        if self.toolkit_layout && self.toolkit_template.is_none() {
            return Err(ConfigError::Invalid(
                "toolkit_layout requires toolkit_template".to_string(),
            ));
        }

        if self.product_family.is_empty() {
            return Err(ConfigError::Invalid("product_family is empty".to_string()));
        }

        if let Some(deployment) = &self.deployment {
            if deployment.site_code.is_empty() {
                return Err(ConfigError::Invalid(
                    "deployment.site_code is empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> Result<()> {
        let config = PackagerConfig::from_yaml_str("{}")?;

        assert_eq!(config, PackagerConfig::default());
        assert_eq!(config.download_url, DEFAULT_DOWNLOAD_URL);
        assert_eq!(config.extraction.timeout(), Duration::from_secs(600));
        assert!(config.deployment.is_none());

        Ok(())
    }

    #[test]
    fn parse_full_document() -> Result<()> {
        let config = PackagerConfig::from_yaml_str(
            r#"
output_root: /srv/packages
publish_root: /srv/content/Mozilla
manifest: /srv/modifications/modifications.xml
toolkit_layout: true
toolkit_template: /srv/toolkit
extraction:
  program: C:\Program Files\7-Zip\7z.exe
  timeout_secs: 30
deployment:
  site_code: P01
  site_server: sccm.example.com
  application_name: "Firefox {version} (managed)"
  user_interaction: Normal
  estimated_runtime_mins: 10
"#,
        )?;

        assert_eq!(config.output_root()?, Path::new("/srv/packages"));
        assert_eq!(config.extraction.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.extraction.program,
            PathBuf::from(r"C:\Program Files\7-Zip\7z.exe")
        );

        let deployment = config.deployment.as_ref().unwrap();
        assert_eq!(deployment.site_server.as_deref(), Some("sccm.example.com"));
        assert_eq!(
            deployment.application_name("115.3.1"),
            "Firefox 115.3.1 (managed)"
        );
        assert_eq!(deployment.user_interaction, UserInteraction::Normal);
        assert_eq!(deployment.estimated_runtime_mins, 10);
        assert_eq!(deployment.maximum_runtime_mins, 15);
        assert_eq!(
            deployment.install_command(config.toolkit_layout),
            "Deploy-Application.exe -DeploymentType Install -DeployMode Silent"
        );

        config.validate()?;

        Ok(())
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(matches!(
            PackagerConfig::from_yaml_str("output_rot: /srv"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn default_commands_follow_layout() -> Result<()> {
        let config = PackagerConfig::from_yaml_str("deployment: { site_code: P01 }")?;
        let deployment = config.deployment.unwrap();

        assert_eq!(deployment.application_name("102.0"), "Mozilla Firefox 102.0 ESR");
        assert_eq!(deployment.install_command(false), "setup.exe /S");
        assert_eq!(
            deployment.uninstall_command(false),
            r#""C:\Program Files\Mozilla Firefox\uninstall\helper.exe" /S"#
        );
        assert!(deployment.uninstall_command(true).contains("Uninstall"));

        Ok(())
    }

    #[test]
    fn validate_requires_output_root() {
        assert!(matches!(
            PackagerConfig::default().validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn validate_toolkit_needs_template() {
        let config = PackagerConfig {
            output_root: Some(PathBuf::from("/out")),
            toolkit_layout: true,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn from_path_resolves_relative() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("packager.yaml");
        std::fs::write(
            &path,
            "output_root: out\nmanifest: mods/modifications.xml\npublish_root: /abs/store\n",
        )?;

        let config = PackagerConfig::from_path(&path)?;

        assert_eq!(config.output_root()?, td.path().join("out"));
        assert_eq!(
            config.manifest.as_deref(),
            Some(td.path().join("mods/modifications.xml").as_path())
        );
        assert_eq!(config.publish_root.as_deref(), Some(Path::new("/abs/store")));

        Ok(())
    }

    #[test]
    fn from_path_resolves_work_and_tool_paths(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("packager.yaml");
        std::fs::write(
            &path,
            "output_root: out\ntemp_root: work\nextraction:\n  program: tools/7z.exe\n",
        )?;

        let config = PackagerConfig::from_path(&path)?;
        assert_eq!(config.temp_root, td.path().join("work"));
        assert_eq!(config.extraction.program, td.path().join("tools/7z.exe"));

        std::fs::write(&path, "output_root: out\nextraction:\n  program: 7z\n")?;
        let config = PackagerConfig::from_path(&path)?;
        assert_eq!(config.extraction.program, Path::new("7z"));
        assert!(config.temp_root.is_absolute());

        Ok(())
    }

    #[test]
    fn from_path_missing_file() {
        assert!(matches!(
            PackagerConfig::from_path("/nonexistent/packager.yaml"),
            Err(ConfigError::Io(..))
        ));
    }
}
