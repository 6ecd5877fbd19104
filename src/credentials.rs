//! Kubeconfig extraction
//!
//! Kind prints a cluster's kubeconfig on stdout. These helpers persist it to
//! a temp file named after the cluster and parse it into a [`kube::Config`].

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use kube::config::{KubeConfigOptions, Kubeconfig};
use tempfile::NamedTempFile;
use tracing::debug;

/// Errors persisting or parsing a kubeconfig
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("kubeconfig for cluster {0} is empty")]
    Empty(String),

    #[error("kubeconfig file for cluster {name}: bytes written: {written}: {source}")]
    Io {
        name: String,
        written: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to load kubeconfig {}: {}", .path.display(), .reason)]
    Invalid { path: PathBuf, reason: String },
}

/// Temp file prefix for a cluster's kubeconfig
pub fn file_prefix(cluster: &str) -> String {
    format!("kind-cluster-{cluster}-kubecfg")
}

/// A kubeconfig written to a temp file but not yet at its final path
///
/// Dropping it removes the temp file, so a kubeconfig that fails to parse
/// never replaces a good one.
pub struct StagedKubeconfig {
    cluster: String,
    file: NamedTempFile,
    target: Option<PathBuf>,
    len: usize,
}

impl StagedKubeconfig {
    /// Where the staged bytes can be read from
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Move the staged file into place and return its final path
    ///
    /// A refresh renames over the existing file, so the path is unchanged.
    pub fn commit(self) -> Result<PathBuf, CredentialError> {
        let Self {
            cluster,
            file,
            target,
            len,
        } = self;
        let io_err = |source: io::Error| CredentialError::Io {
            name: cluster.clone(),
            written: len,
            source,
        };

        let path = match target {
            Some(target) => {
                file.persist(&target).map_err(|e| io_err(e.error))?;
                debug!("Refreshed kubeconfig {} ({} bytes)", target.display(), len);
                target
            }
            None => {
                let (_, path) = file.keep().map_err(|e| io_err(e.error))?;
                debug!("Wrote kubeconfig {} ({} bytes)", path.display(), len);
                path
            }
        };
        Ok(path)
    }
}

/// Write kubeconfig bytes for `cluster` to a staging file
///
/// When `existing` names a file that still exists the staging file is
/// created next to it and [`StagedKubeconfig::commit`] replaces it.
/// Otherwise the file goes to the system temp dir. Empty content is
/// rejected before anything touches the filesystem.
pub fn stage_kubeconfig(
    cluster: &str,
    contents: &[u8],
    existing: Option<&Path>,
) -> Result<StagedKubeconfig, CredentialError> {
    if contents.is_empty() {
        return Err(CredentialError::Empty(cluster.to_string()));
    }

    let io_err = |written: usize, source: io::Error| CredentialError::Io {
        name: cluster.to_string(),
        written,
        source,
    };

    let target = existing.filter(|p| p.is_file()).map(Path::to_path_buf);
    let prefix = file_prefix(cluster);
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    let file = match target.as_deref().and_then(Path::parent) {
        Some(dir) if !dir.as_os_str().is_empty() => builder.tempfile_in(dir),
        Some(_) => builder.tempfile_in("."),
        None => builder.tempfile(),
    };
    let mut file = file.map_err(|e| io_err(0, e))?;

    write_counted(file.as_file_mut(), contents).map_err(|(written, e)| io_err(written, e))?;

    Ok(StagedKubeconfig {
        cluster: cluster.to_string(),
        file,
        target,
        len: contents.len(),
    })
}

/// Write all of `contents`, reporting how many bytes landed on failure
fn write_counted(file: &mut File, contents: &[u8]) -> Result<(), (usize, io::Error)> {
    let mut written = 0;
    while written < contents.len() {
        match file.write(&contents[written..]) {
            Ok(0) => return Err((written, io::ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    file.sync_all().map_err(|e| (written, e))
}

/// Parse a kubeconfig file into a client configuration
pub async fn load_client_config(path: &Path) -> Result<kube::Config, CredentialError> {
    let invalid = |reason: String| CredentialError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| invalid(e.to_string()))?;
    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| invalid(e.to_string()))
}
