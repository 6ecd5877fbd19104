//! Cluster providers
//!
//! A provider drives one disposable cluster through its lifecycle:
//! create, wait for the control plane, load images, export logs, destroy.
//! [`KindCluster`] is the provider for Kind (Kubernetes in Docker).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialError;
use crate::install::InstallError;
use crate::readiness::ReadinessError;
use crate::runner::RunnerError;

mod kind;

pub use kind::{ClusterState, KindCluster};

/// Error type for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to find or install {tool}: {source}")]
    ToolResolution {
        tool: String,
        #[source]
        source: InstallError,
    },

    #[error("{operation} for cluster {cluster} failed: `{command}` exited with {exit_code}: {output}")]
    CommandFailed {
        operation: &'static str,
        cluster: String,
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("{operation} for cluster {cluster} could not run: {source}")]
    Runner {
        operation: &'static str,
        cluster: String,
        #[source]
        source: RunnerError,
    },

    #[error("cluster {cluster} still not in 'get clusters' after creation: {clusters:?}")]
    Inconsistent { cluster: String, clusters: String },

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("failed to remove kubeconfig {} for cluster {}: {}", .path.display(), .cluster, .source)]
    Teardown {
        cluster: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cluster {0} has no client configuration, create it first")]
    NotCreated(String),

    #[error("failed to build Kubernetes client: {0}")]
    Client(#[from] kube::Error),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error("{operation} for cluster {cluster} cancelled")]
    Cancelled {
        operation: &'static str,
        cluster: String,
    },
}

/// Lifecycle of one disposable cluster
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Create the cluster (a no-op if it already exists) and return its kubeconfig path
    async fn create(
        &mut self,
        cancel: &CancellationToken,
        args: &[String],
    ) -> Result<PathBuf, ProviderError>;

    /// Create the cluster from a provider config file
    async fn create_with_config(
        &mut self,
        cancel: &CancellationToken,
        config_file: Option<&Path>,
    ) -> Result<PathBuf, ProviderError>;

    /// Delete the cluster and its kubeconfig file
    async fn destroy(&mut self, cancel: &CancellationToken) -> Result<(), ProviderError>;

    /// Load a locally built container image into the cluster nodes
    async fn load_image(&self, cancel: &CancellationToken, image: &str)
        -> Result<(), ProviderError>;

    /// Load an image archive (tarball) into the cluster nodes
    async fn load_image_archive(
        &self,
        cancel: &CancellationToken,
        archive: &Path,
    ) -> Result<(), ProviderError>;

    /// Export cluster logs into `dest`
    async fn export_logs(
        &mut self,
        cancel: &CancellationToken,
        dest: &Path,
    ) -> Result<(), ProviderError>;

    /// Block until the control plane system pods are present
    async fn wait_for_control_plane(
        &self,
        cancel: &CancellationToken,
        client: &Client,
    ) -> Result<(), ProviderError>;

    /// Path of the most recently extracted kubeconfig
    fn kubeconfig(&self) -> Option<&Path>;

    /// Parsed client configuration, available after a successful create
    fn client_config(&self) -> Option<&kube::Config>;

    /// Kubectl context name for this cluster
    fn kubectl_context(&self) -> String;

    /// Provider name for display
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = ProviderError::CommandFailed {
            operation: "create",
            cluster: "e2e".to_string(),
            command: "kind create cluster --name e2e".to_string(),
            exit_code: 1,
            output: "ERROR: failed to create cluster".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("create for cluster e2e failed"));
        assert!(msg.contains("`kind create cluster --name e2e` exited with 1"));
        assert!(msg.contains("ERROR: failed to create cluster"));
    }

    #[test]
    fn test_inconsistent_display() {
        let err = ProviderError::Inconsistent {
            cluster: "e2e".to_string(),
            clusters: "other\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cluster e2e still not in 'get clusters' after creation: \"other\\n\""
        );
    }

    #[test]
    fn test_teardown_display() {
        let err = ProviderError::Teardown {
            cluster: "e2e".to_string(),
            path: PathBuf::from("/tmp/kind-cluster-e2e-kubecfg123"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "failed to remove kubeconfig /tmp/kind-cluster-e2e-kubecfg123 for cluster e2e: denied"
        );
    }

    #[test]
    fn test_readiness_error_converts() {
        let err: ProviderError = ReadinessError::Cancelled.into();
        assert!(matches!(err, ProviderError::Readiness(ReadinessError::Cancelled)));
    }
}
