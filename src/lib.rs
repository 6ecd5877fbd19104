//! kindling - disposable Kind clusters for Kubernetes integration tests
//!
//! Creates a local Kind cluster, waits until its control plane is serving,
//! loads images into it, hands out a kubeconfig and client configuration,
//! exports logs, and deletes it again.
//!
//! # Example
//!
//! ```no_run
//! use kindling::{ClusterProvider, KindCluster};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel = CancellationToken::new();
//!     let mut cluster = KindCluster::new("test-cluster");
//!
//!     // Reuses the cluster if one with this name already exists
//!     let kubeconfig = cluster.create(&cancel, &[]).await?;
//!     println!("KUBECONFIG={}", kubeconfig.display());
//!
//!     let client = cluster.client()?;
//!     cluster.wait_for_control_plane(&cancel, &client).await?;
//!     cluster.load_image(&cancel, "myapp:test").await?;
//!
//!     // Your tests here...
//!
//!     cluster.destroy(&cancel).await?;
//!     Ok(())
//! }
//! ```
//!
//! The `kind` binary is looked up on `PATH` (or at the configured path) and
//! installed with `go install sigs.k8s.io/kind@<version>` when missing.

pub mod config;
pub mod credentials;
pub mod environment;
pub mod eventually;
pub mod install;
pub mod provider;
pub mod readiness;
pub mod runner;
pub mod telemetry;
pub mod wait;

// Re-export commonly used types
pub use config::{ClusterConfig, ClusterOpt, WaitSettings, DEFAULT_KIND_VERSION};
pub use environment::{setup, teardown, EnvironmentConfig, EnvironmentError, SetupResult};
pub use install::{GoInstaller, InstallError, ToolInstaller};
pub use provider::{ClusterProvider, ClusterState, KindCluster, ProviderError};
pub use readiness::{PodLister, ReadinessError, SelectorGroup};
pub use runner::{CommandRunner, ProcessRunner, RunResult, RunnerError};
pub use wait::WaitError;
