//! Python-oriented `Provisioner`, grounded on the teacher's
//! `wrappers/python.rs` interpreter/venv/package-list shape.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use toolhost_types::ToolManifest;
use tracing::{debug, info, instrument, warn};

use crate::{env_name, EnvironmentHandle, ProvisionError, Provisioner};

/// Provisions a Python virtual environment per tool under `envs_root`.
#[derive(Debug, Clone)]
pub struct VenvProvisioner {
    /// Directory new environments are created under.
    pub envs_root: PathBuf,
    /// System Python interpreter used to create the venv.
    pub python_interpreter: PathBuf,
    /// Argv prefix used to install one system package, e.g.
    /// `["apt-get", "install", "-y"]`. The package name is appended as the
    /// final argument.
    pub system_package_install_cmd: Vec<String>,
}

impl VenvProvisioner {
    /// A provisioner rooted at `envs_root`, using `python3` from `PATH`
    /// and `apt-get` for system packages.
    pub fn new(envs_root: impl Into<PathBuf>) -> Self {
        Self {
            envs_root: envs_root.into(),
            python_interpreter: PathBuf::from("python3"),
            system_package_install_cmd: vec![
                "apt-get".to_string(),
                "install".to_string(),
                "-y".to_string(),
            ],
        }
    }

    fn env_dir(&self, manifest: &ToolManifest) -> PathBuf {
        self.envs_root.join(env_name(manifest))
    }

    fn venv_python(env_dir: &std::path::Path) -> PathBuf {
        env_dir.join("bin").join("python3")
    }

    fn venv_pip(env_dir: &std::path::Path) -> PathBuf {
        env_dir.join("bin").join("pip")
    }

    async fn create_venv(&self, tool: &str, env_dir: &std::path::Path) -> Result<(), ProvisionError> {
        if let Some(parent) = env_dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ProvisionError::Io { tool: tool.to_string(), source })?;
        }

        let output = Command::new(&self.python_interpreter)
            .arg("-m")
            .arg("venv")
            .arg(env_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProvisionError::Io { tool: tool.to_string(), source })?;

        if !output.status.success() {
            return Err(ProvisionError::CreationFailed {
                tool: tool.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    async fn install_system_packages(&self, tool: &str, packages: &[String]) -> Result<(), ProvisionError> {
        let Some((program, prefix_args)) = self.system_package_install_cmd.split_first() else {
            return Ok(());
        };
        for package in packages {
            debug!(tool, package, "installing system package");
            let output = Command::new(program)
                .args(prefix_args)
                .arg(package)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|source| ProvisionError::Io { tool: tool.to_string(), source })?;
            if !output.status.success() {
                return Err(ProvisionError::InstallFailed {
                    tool: tool.to_string(),
                    stage: "system packages",
                    reason: String::from_utf8_lossy(&output.stderr).to_string(),
                });
            }
        }
        Ok(())
    }

    async fn install_packages(
        &self,
        tool: &str,
        env_dir: &std::path::Path,
        packages: &[String],
    ) -> Result<(), ProvisionError> {
        if packages.is_empty() {
            return Ok(());
        }
        let output = Command::new(Self::venv_pip(env_dir))
            .arg("install")
            .args(packages)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProvisionError::Io { tool: tool.to_string(), source })?;
        if !output.status.success() {
            return Err(ProvisionError::InstallFailed {
                tool: tool.to_string(),
                stage: "packages",
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    async fn install_requirements(
        &self,
        tool: &str,
        env_dir: &std::path::Path,
        requirements: &str,
    ) -> Result<(), ProvisionError> {
        let output = Command::new(Self::venv_pip(env_dir))
            .arg("install")
            .arg("-r")
            .arg(requirements)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProvisionError::Io { tool: tool.to_string(), source })?;
        if !output.status.success() {
            return Err(ProvisionError::InstallFailed {
                tool: tool.to_string(),
                stage: "requirements",
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for VenvProvisioner {
    #[instrument(skip(self, manifest), fields(tool = %manifest.name))]
    async fn ensure(
        &self,
        manifest: &ToolManifest,
    ) -> Result<(EnvironmentHandle, bool), ProvisionError> {
        let env_dir = self.env_dir(manifest);
        let fresh = !env_dir.exists();

        if fresh {
            info!(tool = %manifest.name, path = %env_dir.display(), "creating environment");
            self.create_venv(&manifest.name, &env_dir).await?;

            self.install_system_packages(&manifest.name, &manifest.runtime.system_packages)
                .await?;
            self.install_packages(&manifest.name, &env_dir, &manifest.runtime.packages)
                .await?;
            if let Some(requirements) = &manifest.runtime.requirements {
                self.install_requirements(&manifest.name, &env_dir, requirements)
                    .await?;
            }
        } else {
            debug!(tool = %manifest.name, "reusing existing environment");
        }

        let handle = EnvironmentHandle {
            interpreter: Self::venv_python(&env_dir),
            env_dir,
        };
        Ok((handle, fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolhost_types::{Mode, RuntimeSpec, Transport};

    fn manifest(name: &str) -> ToolManifest {
        ToolManifest {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            description: String::new(),
            capabilities: vec![],
            runtime: RuntimeSpec {
                language: "python3".to_string(),
                packages: vec![],
                requirements: None,
                system_packages: vec![],
                mode: Mode::Oneshot,
                transport: Transport::Eval,
                entrypoint: "main.py".to_string(),
                startup_timeout_secs: 60,
            },
            resources: None,
            rpc: Default::default(),
            health: None,
        }
    }

    #[test]
    fn env_dir_is_scoped_under_envs_root() {
        let provisioner = VenvProvisioner::new("/var/lib/toolhost/envs");
        let dir = provisioner.env_dir(&manifest("image-resize"));
        assert_eq!(dir, PathBuf::from("/var/lib/toolhost/envs/image-resize"));
    }

    #[test]
    fn env_name_sanitizes_non_identifier_characters() {
        assert_eq!(env_name(&manifest("image resize/v2")), "image_resize_v2");
    }

    #[tokio::test]
    async fn ensure_reports_fresh_only_on_first_call() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner = VenvProvisioner::new(tmp.path());
        let dir = provisioner.env_dir(&manifest("no-venv-tool"));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        // Directory already exists, so `ensure` must treat it as not-fresh
        // and must not attempt to invoke `python3 -m venv` again.
        let (handle, fresh) = provisioner.ensure(&manifest("no-venv-tool")).await.unwrap();
        assert!(!fresh);
        assert_eq!(handle.env_dir, dir);
    }
}
