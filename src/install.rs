//! Locating (and installing) the kind binary
//!
//! [`find_or_install`] is called before every lifecycle operation that needs
//! the tool. When the binary is already reachable it returns immediately;
//! only a missing binary reaches the [`ToolInstaller`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::runner::{command_line, CommandRunner, ProcessRunner, RunnerError};

/// Errors installing a tool
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("go toolchain not found on PATH, cannot install {0}")]
    GoNotFound(String),

    #[error("`{command}` failed with exit code {exit_code}: {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("{tool} not found after installing {package}@{version}")]
    NotFoundAfterInstall {
        tool: String,
        package: String,
        version: String,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Installs a tool that could not be found locally
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Install `package` at `version` and return the path of `tool`
    async fn install(
        &self,
        tool: &str,
        package: &str,
        version: &str,
    ) -> Result<PathBuf, InstallError>;
}

/// Installs Go-based tools with `go install`
pub struct GoInstaller {
    runner: Arc<dyn CommandRunner>,
}

impl GoInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Default for GoInstaller {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }
}

#[async_trait]
impl ToolInstaller for GoInstaller {
    #[instrument(skip(self))]
    async fn install(
        &self,
        tool: &str,
        package: &str,
        version: &str,
    ) -> Result<PathBuf, InstallError> {
        let go = lookup("go").ok_or_else(|| InstallError::GoNotFound(tool.to_string()))?;
        let go = go.to_string_lossy().into_owned();

        info!("Installing {}@{}", package, version);
        let args = vec!["install".to_string(), format!("{package}@{version}")];
        let result = self.runner.run(&go, &args).await?;
        if !result.passed() {
            return Err(InstallError::CommandFailed {
                command: command_line(&go, &args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            });
        }

        if let Some(path) = lookup(tool) {
            return Ok(path);
        }

        // `go install` drops binaries in $GOPATH/bin, which is often not on PATH
        let env_args = vec!["env".to_string(), "GOPATH".to_string()];
        let gopath = self.runner.run(&go, &env_args).await?;
        let candidate = Path::new(gopath.stdout.trim()).join("bin").join(tool);
        if gopath.passed() && candidate.is_file() {
            debug!("Found {} at {}", tool, candidate.display());
            return Ok(candidate);
        }

        Err(InstallError::NotFoundAfterInstall {
            tool: tool.to_string(),
            package: package.to_string(),
            version: version.to_string(),
        })
    }
}

/// Resolve an executable by path or by searching `PATH`
///
/// A hint containing a path separator is taken as a file path. A bare name
/// is looked up in each `PATH` entry in order.
pub fn lookup(hint: &str) -> Option<PathBuf> {
    if hint.is_empty() {
        return None;
    }

    let path = Path::new(hint);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let dirs = std::env::var_os("PATH")?;
    std::env::split_paths(&dirs)
        .map(|dir| dir.join(hint))
        .find(|candidate| candidate.is_file())
}

/// Return a usable path for `tool`, installing it when it cannot be found
///
/// `hint` falls back to `tool` when empty. The installer is only consulted
/// when the hint does not resolve, so repeated calls are cheap once the
/// binary exists.
pub async fn find_or_install(
    hint: &str,
    tool: &str,
    package: &str,
    version: &str,
    installer: &dyn ToolInstaller,
) -> Result<PathBuf, InstallError> {
    let hint = if hint.is_empty() { tool } else { hint };

    if let Some(path) = lookup(hint) {
        debug!("Using {} at {}", tool, path.display());
        return Ok(path);
    }

    info!("{} not found at {}, installing {}@{}", tool, hint, package, version);
    installer.install(tool, package, version).await
}
