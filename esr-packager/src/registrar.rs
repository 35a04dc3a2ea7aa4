// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Registration of packages as deployable applications.

[ConfigMgrRegistrar] drives the Configuration Manager PowerShell module. It
creates an application record and attaches a script deployment type whose
detection script writes `Installed` when the packaged version is present.
*/

use {
    crate::config::UserInteraction,
    log::{info, warn},
    std::path::{Path, PathBuf},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("unable to run {}: {cause}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("unable to wait on {}: {cause}", .program.display())]
    Wait {
        program: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("registration script failed with {status}")]
    Failed { status: String },
}

/// Everything needed to create a deployable application record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploymentRequest {
    pub title: String,
    pub version: String,
    pub publisher: String,
    pub install_command: String,
    pub uninstall_command: String,
    /// Network location the deployment system copies content from.
    pub content_location: PathBuf,
    /// Script that writes `Installed` when the application is present.
    pub detection_script: String,
    pub user_interaction: UserInteraction,
    pub estimated_runtime_mins: u32,
    pub maximum_runtime_mins: u32,
}

/// Creates application records in a systems management console.
pub trait DeploymentRegistrar {
    fn register(&self, request: &DeploymentRequest) -> Result<(), RegistrarError>;
}

/// Quote a value as a single quoted PowerShell string.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a detection script for `firefox.exe` under `install_path`.
pub fn detection_script(install_path: &str, product_version: &str) -> String {
    format!(
        "$path = Join-Path {} 'firefox.exe'\n\
         if (Test-Path -LiteralPath $path) {{\n\
         \x20   if ((Get-Item -LiteralPath $path).VersionInfo.ProductVersion -eq {}) {{\n\
         \x20       Write-Output 'Installed'\n\
         \x20   }}\n\
         }}\n",
        ps_quote(install_path),
        ps_quote(product_version)
    )
}

/// Registers applications through the Configuration Manager cmdlets.
#[derive(Clone, Debug)]
pub struct ConfigMgrRegistrar {
    site_code: String,
    site_server: Option<String>,
    powershell: PathBuf,
}

impl ConfigMgrRegistrar {
    pub fn new(site_code: impl ToString, site_server: Option<String>) -> Self {
        Self {
            site_code: site_code.to_string(),
            site_server,
            powershell: PathBuf::from("powershell.exe"),
        }
    }

    /// Use a different PowerShell executable.
    pub fn set_powershell(&mut self, path: impl AsRef<Path>) {
        self.powershell = path.as_ref().to_path_buf();
    }

    /// Render the script registering `request`.
    pub fn render_script(&self, request: &DeploymentRequest) -> String {
        let mut lines = vec![
            "$ErrorActionPreference = 'Stop'".to_string(),
            "Import-Module (Join-Path (Split-Path $env:SMS_ADMIN_UI_PATH -Parent) 'ConfigurationManager.psd1')".to_string(),
        ];

        let site = ps_quote(&self.site_code);
        if let Some(server) = &self.site_server {
            lines.push(format!(
                "if (-not (Get-PSDrive -Name {site} -PSProvider CMSite -ErrorAction SilentlyContinue)) {{ New-PSDrive -Name {site} -PSProvider CMSite -Root {} | Out-Null }}",
                ps_quote(server),
                site = site
            ));
        }
        lines.push(format!("Set-Location {}", ps_quote(&format!("{}:", self.site_code))));

        let title = ps_quote(&request.title);
        lines.push(format!("$detection = {}", ps_quote(&request.detection_script)));
        lines.push(format!(
            "New-CMApplication -Name {} -Publisher {} -SoftwareVersion {} -AutoInstall $true | Out-Null",
            title,
            ps_quote(&request.publisher),
            ps_quote(&request.version)
        ));
        lines.push(format!(
            "Add-CMScriptDeploymentType -ApplicationName {title} -DeploymentTypeName {title} \
             -ContentLocation {} -InstallCommand {} -UninstallCommand {} \
             -ScriptLanguage PowerShell -ScriptText $detection \
             -InstallationBehaviorType InstallForSystem -LogonRequirementType WhetherOrNotUserLoggedOn \
             -UserInteractionMode {} -EstimatedRuntimeMins {} -MaximumRuntimeMins {} | Out-Null",
            ps_quote(&request.content_location.display().to_string()),
            ps_quote(&request.install_command),
            ps_quote(&request.uninstall_command),
            request.user_interaction,
            request.estimated_runtime_mins,
            request.maximum_runtime_mins,
            title = title
        ));

        let mut script = lines.join("\n");
        script.push('\n');
        script
    }
}

impl DeploymentRegistrar for ConfigMgrRegistrar {
    fn register(&self, request: &DeploymentRequest) -> Result<(), RegistrarError> {
        warn!(
            "registering {} with site {}",
            request.title, self.site_code
        );

        let script = self.render_script(request);

        let handle = duct::cmd(
            &self.powershell,
            [
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                "-",
            ],
        )
        .stdin_bytes(script.into_bytes())
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .start()
        .map_err(|cause| RegistrarError::Spawn {
            program: self.powershell.clone(),
            cause,
        })?;

        let output = handle.wait().map_err(|cause| RegistrarError::Wait {
            program: self.powershell.clone(),
            cause,
        })?;

        // Console output uses the OEM code page, which is rarely UTF-8.
        for line in output.stdout.split(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(line);
            let line = line.trim_end();
            if !line.is_empty() {
                info!("{}", line);
            }
        }

        if output.status.success() {
            warn!("registered {}", request.title);
            Ok(())
        } else {
            Err(RegistrarError::Failed {
                status: output.status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            title: "Mozilla Firefox 115.3.1 ESR".to_string(),
            version: "115.3.1".to_string(),
            publisher: "Mozilla".to_string(),
            install_command: "setup.exe /S".to_string(),
            uninstall_command: r#""C:\Program Files\Mozilla Firefox\uninstall\helper.exe" /S"#
                .to_string(),
            content_location: PathBuf::from(r"\\store\Mozilla\FirefoxESR_115.3.1esr_230926"),
            detection_script: detection_script(r"C:\Program Files\Mozilla Firefox", "115.3.1"),
            user_interaction: UserInteraction::Hidden,
            estimated_runtime_mins: 5,
            maximum_runtime_mins: 15,
        }
    }

    #[test]
    fn quoting_doubles_single_quotes() {
        assert_eq!(ps_quote("plain"), "'plain'");
        assert_eq!(ps_quote("O'Brien's"), "'O''Brien''s'");
    }

    #[test]
    fn detection_script_reports_installed() {
        let script = detection_script(r"C:\Program Files\Mozilla Firefox", "115.3.1");

        assert!(script.starts_with(
            "$path = Join-Path 'C:\\Program Files\\Mozilla Firefox' 'firefox.exe'\n"
        ));
        assert!(script.contains(".VersionInfo.ProductVersion -eq '115.3.1'"));
        assert!(script.contains("        Write-Output 'Installed'\n"));
    }

    #[test]
    fn script_without_server_uses_existing_drive() {
        let script = ConfigMgrRegistrar::new("P01", None).render_script(&request());

        assert!(!script.contains("New-PSDrive"));
        assert!(script.contains("Set-Location 'P01:'\n"));
        assert!(script.contains(
            "New-CMApplication -Name 'Mozilla Firefox 115.3.1 ESR' -Publisher 'Mozilla' -SoftwareVersion '115.3.1'"
        ));
        assert!(script.contains("-ContentLocation '\\\\store\\Mozilla\\FirefoxESR_115.3.1esr_230926'"));
        assert!(script.contains("-UserInteractionMode Hidden -EstimatedRuntimeMins 5 -MaximumRuntimeMins 15"));
    }

    #[test]
    fn script_with_server_mounts_drive() {
        let script = ConfigMgrRegistrar::new("P01", Some("sccm.example.com".to_string()))
            .render_script(&request());

        assert!(script.contains("New-PSDrive -Name 'P01' -PSProvider CMSite -Root 'sccm.example.com'"));
        assert!(script.find("New-PSDrive") < script.find("Set-Location"));
    }

    #[test]
    fn embedded_detection_script_is_quoted() {
        let mut req = request();
        req.detection_script = "Write-Output 'Installed'".to_string();

        let script = ConfigMgrRegistrar::new("P01", None).render_script(&req);
        assert!(script.contains("$detection = 'Write-Output ''Installed'''\n"));
    }

    #[cfg(unix)]
    fn fake_powershell(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("powershell.sh");
        std::fs::write(&path, format!("#!/bin/sh\ncat >/dev/null\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;

        Ok(path)
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_output_still_registers() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;
        let program = fake_powershell(
            td.path(),
            "printf 'Anwendung erstellt: Gr\\374\\337e\\n'\nsleep 1\nexit 0",
        )?;

        let mut registrar = ConfigMgrRegistrar::new("P01", None);
        registrar.set_powershell(&program);

        registrar.register(&request())?;

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_script_reports_status() -> Result<(), Box<dyn std::error::Error>> {
        let td = tempfile::tempdir()?;
        let program = fake_powershell(td.path(), "printf '\\374 failed\\n'\nexit 3")?;

        let mut registrar = ConfigMgrRegistrar::new("P01", None);
        registrar.set_powershell(&program);

        assert!(matches!(
            registrar.register(&request()),
            Err(RegistrarError::Failed { .. })
        ));

        Ok(())
    }

    #[test]
    fn missing_powershell_is_error() {
        let mut registrar = ConfigMgrRegistrar::new("P01", None);
        registrar.set_powershell("/nonexistent/esr-packager/powershell.exe");

        assert!(matches!(
            registrar.register(&request()),
            Err(RegistrarError::Spawn { .. })
        ));
    }
}
