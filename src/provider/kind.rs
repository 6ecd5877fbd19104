//! Kind cluster provider
//!
//! Creates and manages Kind (Kubernetes in Docker) clusters by shelling out
//! to the `kind` binary. Every operation is a short sequence of `kind`
//! invocations:
//!
//! - create: `get clusters`, `create cluster`, `get clusters`, `get kubeconfig`
//! - destroy: `delete cluster`, then the kubeconfig file is removed
//! - load image: `load docker-image` / `load image-archive`
//! - export logs: `export logs`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{ClusterProvider, ProviderError};
use crate::config::{ClusterConfig, ClusterOpt, WaitSettings, KIND_PACKAGE, KUBECTL_CONTEXT_PREFIX};
use crate::credentials::{load_client_config, stage_kubeconfig};
use crate::install::{find_or_install, GoInstaller, ToolInstaller};
use crate::readiness::{self, PodLister};
use crate::runner::{command_line, CommandRunner, ProcessRunner, RunResult};

/// Where a [`KindCluster`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// No cluster name yet
    Unconfigured,
    /// Named and ready to create
    Configured,
    /// Created and credentials extracted
    Created,
    /// Deleted; may be created again
    Destroyed,
}

/// A single Kind cluster
///
/// # Example
///
/// ```no_run
/// use kindling::{ClusterProvider, KindCluster};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cancel = CancellationToken::new();
///     let mut cluster = KindCluster::new("e2e").with_image("kindest/node:v1.29.0");
///
///     let kubeconfig = cluster.create_with_config(&cancel, None).await?;
///     println!("kubeconfig at {}", kubeconfig.display());
///
///     let client = cluster.client()?;
///     cluster.wait_for_control_plane(&cancel, &client).await?;
///
///     // Your tests here...
///
///     cluster.destroy(&cancel).await?;
///     Ok(())
/// }
/// ```
pub struct KindCluster {
    config: ClusterConfig,
    tool_path: String,
    kubeconfig: Option<PathBuf>,
    rest_config: Option<kube::Config>,
    state: ClusterState,
    runner: Arc<dyn CommandRunner>,
    installer: Arc<dyn ToolInstaller>,
}

impl KindCluster {
    /// Kind cluster with the given name and default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(ClusterConfig::new(name))
    }

    pub fn from_config(config: ClusterConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
        let installer = Arc::new(GoInstaller::new(runner.clone()));
        let state = if config.name.is_empty() {
            ClusterState::Unconfigured
        } else {
            ClusterState::Configured
        };

        Self {
            tool_path: config.resolved_path().to_string(),
            config,
            kubeconfig: None,
            rest_config: None,
            state,
            runner,
            installer,
        }
    }

    /// Set the cluster name
    ///
    /// Ignored once the cluster has been created, since Kind identifies the
    /// cluster by this name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match self.state {
            ClusterState::Unconfigured | ClusterState::Configured => {
                self.state = if name.is_empty() {
                    ClusterState::Unconfigured
                } else {
                    ClusterState::Configured
                };
                self.config.name = name;
            }
            ClusterState::Created | ClusterState::Destroyed => {
                warn!(
                    "Ignoring rename of cluster {} to {}: already created",
                    self.config.name, name
                );
            }
        }
        self
    }

    /// Set the kind binary path or name
    pub fn with_path(self, path: impl Into<String>) -> Self {
        self.with_opts([ClusterOpt::Path(path.into())])
    }

    /// Pin the kind release installed when the binary is missing
    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.with_opts([ClusterOpt::Version(version.into())])
    }

    /// Set the node image passed by [`create_with_config`](ClusterProvider::create_with_config)
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.with_opts([ClusterOpt::Image(image.into())])
    }

    pub fn with_opts(mut self, opts: impl IntoIterator<Item = ClusterOpt>) -> Self {
        self.config = std::mem::take(&mut self.config).apply(opts);
        self.tool_path = self.config.resolved_path().to_string();
        self
    }

    /// Set the control-plane wait timeout and polling interval
    pub fn with_wait(mut self, wait: WaitSettings) -> Self {
        self.config.wait = wait;
        self
    }

    /// Run `kind` through a different command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Install a missing `kind` binary with a different installer
    pub fn with_installer(mut self, installer: Arc<dyn ToolInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    /// Current kind binary path; absolute once it has been resolved
    pub fn tool_path(&self) -> &str {
        &self.tool_path
    }

    /// Build a Kubernetes client from the extracted kubeconfig
    pub fn client(&self) -> Result<Client, ProviderError> {
        let config = self
            .rest_config
            .clone()
            .ok_or_else(|| ProviderError::NotCreated(self.config.name.clone()))?;
        Ok(Client::try_from(config)?)
    }

    /// Wait for the control plane using any pod source
    pub async fn wait_for_control_plane_with<P: PodLister + ?Sized>(
        &self,
        cancel: &CancellationToken,
        pods: &P,
    ) -> Result<(), ProviderError> {
        info!("Waiting for control plane of cluster {}", self.config.name);
        readiness::wait_for_control_plane(pods, &self.config.wait, cancel).await?;
        Ok(())
    }

    fn require_name(&self) -> Result<&str, ProviderError> {
        if self.config.name.is_empty() {
            return Err(ProviderError::InvalidConfig(
                "cluster name is empty".to_string(),
            ));
        }
        Ok(&self.config.name)
    }

    fn check_cancelled(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
    ) -> Result<(), ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled {
                operation,
                cluster: self.config.name.clone(),
            });
        }
        Ok(())
    }

    async fn find_or_install_kind(&mut self) -> Result<(), ProviderError> {
        let path = find_or_install(
            &self.tool_path,
            "kind",
            KIND_PACKAGE,
            self.config.resolved_version(),
            self.installer.as_ref(),
        )
        .await
        .map_err(|source| ProviderError::ToolResolution {
            tool: "kind".to_string(),
            source,
        })?;

        self.tool_path = path.to_string_lossy().into_owned();
        Ok(())
    }

    /// Run a kind subcommand, failing on a non-zero exit
    async fn kind(
        &self,
        operation: &'static str,
        args: Vec<String>,
    ) -> Result<RunResult, ProviderError> {
        let command = command_line(&self.tool_path, &args);
        debug!("Launching: {}", command);

        let result = self
            .runner
            .run(&self.tool_path, &args)
            .await
            .map_err(|source| ProviderError::Runner {
                operation,
                cluster: self.config.name.clone(),
                source,
            })?;

        if !result.passed() {
            return Err(ProviderError::CommandFailed {
                operation,
                cluster: self.config.name.clone(),
                command,
                exit_code: result.exit_code,
                output: result.combined_output(),
            });
        }

        Ok(result)
    }

    /// Raw `kind get clusters` output and whether this cluster is listed
    async fn cluster_exists(
        &self,
        operation: &'static str,
    ) -> Result<(String, bool), ProviderError> {
        let result = self
            .kind(operation, vec!["get".to_string(), "clusters".to_string()])
            .await?;
        let exists = cluster_listed(&result.stdout, &self.config.name);
        Ok((result.stdout, exists))
    }

    async fn extract_kubeconfig(&mut self) -> Result<PathBuf, ProviderError> {
        let args = vec![
            "get".to_string(),
            "kubeconfig".to_string(),
            "--name".to_string(),
            self.config.name.clone(),
        ];
        let result = self.kind("get kubeconfig", args).await?;

        let staged = stage_kubeconfig(
            &self.config.name,
            result.stdout.as_bytes(),
            self.kubeconfig.as_deref(),
        )?;
        let rest_config = load_client_config(staged.path()).await?;
        let path = staged.commit()?;

        self.kubeconfig = Some(path.clone());
        self.rest_config = Some(rest_config);
        Ok(path)
    }
}

impl Default for KindCluster {
    /// Unnamed cluster; name it with [`KindCluster::with_name`]
    fn default() -> Self {
        Self::from_config(ClusterConfig::default())
    }
}

/// Whether `name` appears as a whole line of a `kind get clusters` listing
///
/// Matching is exact: `foo` does not match a `foo-bar` line, and case and
/// surrounding whitespace count.
pub fn cluster_listed(listing: &str, name: &str) -> bool {
    listing.split('\n').any(|line| line == name)
}

/// Arguments for `kind create cluster` beyond `--name`
pub fn create_args(config_file: Option<&Path>, image: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = config_file.filter(|p| !p.as_os_str().is_empty()) {
        args.push("--config".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    if let Some(image) = image {
        args.push("--image".to_string());
        args.push(image.to_string());
    }
    args
}

#[async_trait]
impl ClusterProvider for KindCluster {
    #[instrument(skip(self, cancel), fields(cluster_name = %self.config.name, provider = "kind"))]
    async fn create(
        &mut self,
        cancel: &CancellationToken,
        args: &[String],
    ) -> Result<PathBuf, ProviderError> {
        let name = self.require_name()?.to_string();
        info!("Creating kind cluster {}", name);

        self.check_cancelled(cancel, "create")?;
        self.find_or_install_kind().await?;

        self.check_cancelled(cancel, "create")?;
        let (_, exists) = self.cluster_exists("create").await?;

        if exists {
            debug!("Skipping create: cluster {} already exists", name);
        } else {
            let mut create = vec![
                "create".to_string(),
                "cluster".to_string(),
                "--name".to_string(),
                name.clone(),
            ];
            create.extend(args.iter().cloned());

            self.check_cancelled(cancel, "create")?;
            self.kind("create", create).await?;

            let (clusters, exists) = self.cluster_exists("create").await?;
            if !exists {
                return Err(ProviderError::Inconsistent {
                    cluster: name,
                    clusters,
                });
            }
            debug!("kind clusters available: {}", clusters.trim());
        }

        self.check_cancelled(cancel, "create")?;
        let path = self.extract_kubeconfig().await?;
        self.state = ClusterState::Created;

        info!(kubeconfig = %path.display(), "Cluster {} created", name);
        Ok(path)
    }

    async fn create_with_config(
        &mut self,
        cancel: &CancellationToken,
        config_file: Option<&Path>,
    ) -> Result<PathBuf, ProviderError> {
        let args = create_args(config_file, self.config.node_image());
        self.create(cancel, &args).await
    }

    #[instrument(skip(self, cancel), fields(cluster_name = %self.config.name, provider = "kind"))]
    async fn destroy(&mut self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        let name = self.require_name()?.to_string();
        info!("Destroying kind cluster {}", name);

        self.check_cancelled(cancel, "destroy")?;
        self.find_or_install_kind().await?;

        self.check_cancelled(cancel, "destroy")?;
        let args = vec![
            "delete".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            name.clone(),
        ];
        self.kind("destroy", args).await?;
        self.state = ClusterState::Destroyed;
        self.rest_config = None;

        if let Some(path) = &self.kubeconfig {
            debug!("Removing kubeconfig file {}", path.display());
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("Kubeconfig {} was already removed", path.display());
                }
                Err(source) => {
                    return Err(ProviderError::Teardown {
                        cluster: name,
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        info!("Cluster {} deleted", name);
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(cluster_name = %self.config.name, provider = "kind"))]
    async fn load_image(
        &self,
        cancel: &CancellationToken,
        image: &str,
    ) -> Result<(), ProviderError> {
        let name = self.require_name()?;
        self.check_cancelled(cancel, "load docker-image")?;

        debug!("Loading image {} into cluster {}", image, name);
        let args = vec![
            "load".to_string(),
            "docker-image".to_string(),
            "--name".to_string(),
            name.to_string(),
            image.to_string(),
        ];
        self.kind("load docker-image", args).await?;
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(cluster_name = %self.config.name, provider = "kind"))]
    async fn load_image_archive(
        &self,
        cancel: &CancellationToken,
        archive: &Path,
    ) -> Result<(), ProviderError> {
        let name = self.require_name()?;
        self.check_cancelled(cancel, "load image-archive")?;

        debug!("Loading image archive {} into cluster {}", archive.display(), name);
        let args = vec![
            "load".to_string(),
            "image-archive".to_string(),
            "--name".to_string(),
            name.to_string(),
            archive.to_string_lossy().into_owned(),
        ];
        self.kind("load image-archive", args).await?;
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(cluster_name = %self.config.name, provider = "kind"))]
    async fn export_logs(
        &mut self,
        cancel: &CancellationToken,
        dest: &Path,
    ) -> Result<(), ProviderError> {
        let name = self.require_name()?.to_string();
        info!("Exporting logs of cluster {} to {}", name, dest.display());

        self.check_cancelled(cancel, "export logs")?;
        self.find_or_install_kind().await?;

        self.check_cancelled(cancel, "export logs")?;
        let args = vec![
            "export".to_string(),
            "logs".to_string(),
            dest.to_string_lossy().into_owned(),
            "--name".to_string(),
            name,
        ];
        self.kind("export logs", args).await?;
        Ok(())
    }

    #[instrument(
        skip(self, cancel, client),
        fields(cluster_name = %self.config.name, provider = "kind")
    )]
    async fn wait_for_control_plane(
        &self,
        cancel: &CancellationToken,
        client: &Client,
    ) -> Result<(), ProviderError> {
        self.wait_for_control_plane_with(cancel, client).await
    }

    fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    fn client_config(&self) -> Option<&kube::Config> {
        self.rest_config.as_ref()
    }

    fn kubectl_context(&self) -> String {
        format!("{KUBECTL_CONTEXT_PREFIX}{}", self.config.name)
    }

    fn name(&self) -> &'static str {
        "kind"
    }
}
