//! Environment setup and teardown for test suites
//!
//! Strings the provider operations together the way a test harness uses
//! them:
//! - SETUP: create (or reuse) the cluster, wait for the control plane,
//!   load images and image archives
//! - TEARDOWN: optionally export logs, then destroy the cluster
//!
//! # Example
//!
//! ```no_run
//! use kindling::environment::{setup, teardown, EnvironmentConfig};
//! use kindling::KindCluster;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel = CancellationToken::new();
//!     let mut cluster = KindCluster::new("e2e");
//!
//!     let env = EnvironmentConfig::new().image("myapp:test");
//!     setup(&mut cluster, &cancel, &env).await?;
//!
//!     // Your tests here...
//!
//!     teardown(&mut cluster, &cancel, Some(Path::new("./kind-logs"))).await?;
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::provider::{ClusterProvider, ProviderError};

/// What to prepare after the cluster exists
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Kind config file passed as `--config`
    pub kind_config: Option<PathBuf>,
    /// Docker images to load into the cluster
    pub images: Vec<String>,
    /// Image archives to load into the cluster
    pub image_archives: Vec<PathBuf>,
    /// Block on the control-plane readiness gate before loading images
    pub wait_for_control_plane: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            kind_config: None,
            images: Vec::new(),
            image_archives: Vec::new(),
            wait_for_control_plane: true,
        }
    }
}

impl EnvironmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the cluster from a Kind config file
    pub fn kind_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.kind_config = Some(path.into());
        self
    }

    /// Add a Docker image to load
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    /// Add multiple Docker images
    pub fn images(mut self, images: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.images.extend(images.into_iter().map(Into::into));
        self
    }

    /// Add an image archive to load
    pub fn image_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_archives.push(path.into());
        self
    }

    /// Skip the control-plane readiness gate
    pub fn skip_control_plane_wait(mut self) -> Self {
        self.wait_for_control_plane = false;
        self
    }
}

/// Result of environment setup
#[derive(Debug, Default)]
pub struct SetupResult {
    /// Kubeconfig of the cluster
    pub kubeconfig: PathBuf,
    /// Whether the control-plane gate was passed
    pub control_plane_ready: bool,
    /// Images successfully loaded
    pub images_loaded: Vec<String>,
    /// Archives successfully loaded
    pub archives_loaded: Vec<PathBuf>,
}

/// Environment setup errors
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to export cluster logs: {0}")]
    LogExport(#[source] ProviderError),

    #[error("failed to export cluster logs ({logs}) and to destroy the cluster ({destroy})")]
    Teardown {
        logs: ProviderError,
        destroy: ProviderError,
    },
}

/// Create the cluster and prepare it for tests
///
/// Stops at the first failure. The cluster is left in place so the caller
/// can export logs before tearing it down.
#[instrument(skip_all, fields(provider = provider.name()))]
pub async fn setup(
    provider: &mut dyn ClusterProvider,
    cancel: &CancellationToken,
    env: &EnvironmentConfig,
) -> Result<SetupResult, EnvironmentError> {
    let mut result = SetupResult {
        kubeconfig: provider
            .create_with_config(cancel, env.kind_config.as_deref())
            .await?,
        ..SetupResult::default()
    };

    if env.wait_for_control_plane {
        let config = provider
            .client_config()
            .cloned()
            .ok_or_else(|| ProviderError::NotCreated(provider.kubectl_context()))?;
        let client = Client::try_from(config).map_err(ProviderError::from)?;
        provider.wait_for_control_plane(cancel, &client).await?;
        result.control_plane_ready = true;
    }

    for image in &env.images {
        info!("Loading image: {}", image);
        provider.load_image(cancel, image).await?;
        result.images_loaded.push(image.clone());
    }

    for archive in &env.image_archives {
        info!("Loading image archive: {}", archive.display());
        provider.load_image_archive(cancel, archive).await?;
        result.archives_loaded.push(archive.clone());
    }

    Ok(result)
}

/// Export logs (when `logs_dir` is given) and destroy the cluster
///
/// The cluster is destroyed even when the log export fails.
#[instrument(skip_all, fields(provider = provider.name()))]
pub async fn teardown(
    provider: &mut dyn ClusterProvider,
    cancel: &CancellationToken,
    logs_dir: Option<&Path>,
) -> Result<(), EnvironmentError> {
    let logs = match logs_dir {
        Some(dir) => provider.export_logs(cancel, dir).await.err(),
        None => None,
    };
    if let Some(err) = &logs {
        warn!("Log export failed, destroying cluster anyway: {}", err);
    }

    match (logs, provider.destroy(cancel).await) {
        (None, Ok(())) => Ok(()),
        (Some(logs), Ok(())) => Err(EnvironmentError::LogExport(logs)),
        (None, Err(destroy)) => Err(destroy.into()),
        (Some(logs), Err(destroy)) => Err(EnvironmentError::Teardown { logs, destroy }),
    }
}
