//! Configuration types for kindling
//!
//! Clusters are configured programmatically - no config files needed.
//!
//! # Example
//!
//! ```
//! use kindling::config::{ClusterConfig, WaitSettings};
//! use std::time::Duration;
//!
//! let cluster = ClusterConfig::new("my-test")
//!     .version("v0.20.0")
//!     .image("kindest/node:v1.29.0")
//!     .wait(WaitSettings::default().timeout(Duration::from_secs(120)));
//!
//! assert_eq!(cluster.resolved_version(), "v0.20.0");
//! ```

use std::time::Duration;

/// Executable name used when no path hint is configured
pub const DEFAULT_KIND_PATH: &str = "kind";

/// Kind release installed when no version is configured
pub const DEFAULT_KIND_VERSION: &str = "v0.17.0";

/// Go package reference used to install Kind on demand
pub const KIND_PACKAGE: &str = "sigs.k8s.io/kind";

/// Prefix Kind puts in front of the cluster name for its kubectl context
pub const KUBECTL_CONTEXT_PREFIX: &str = "kind-";

/// Kind cluster configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterConfig {
    /// Cluster name, unique among the clusters Kind knows about
    pub name: String,

    /// Path or executable name of the kind binary
    pub path: Option<String>,

    /// Kind release to install when the binary is missing
    pub version: Option<String>,

    /// Node image override passed as `--image`
    pub image: Option<String>,

    /// Polling settings for the control-plane readiness gate
    pub wait: WaitSettings,
}

impl ClusterConfig {
    /// Create a config for the named cluster with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the kind binary path or name
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Pin the kind release
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the node image
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the readiness polling settings
    pub fn wait(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    /// Apply a set of options in order
    pub fn apply(mut self, opts: impl IntoIterator<Item = ClusterOpt>) -> Self {
        for opt in opts {
            match opt {
                ClusterOpt::Path(path) => self.path = Some(path),
                ClusterOpt::Version(version) => self.version = Some(version),
                ClusterOpt::Image(image) => self.image = Some(image),
            }
        }
        self
    }

    /// Binary path hint, falling back to [`DEFAULT_KIND_PATH`]
    pub fn resolved_path(&self) -> &str {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => DEFAULT_KIND_PATH,
        }
    }

    /// Pinned version, falling back to [`DEFAULT_KIND_VERSION`]
    pub fn resolved_version(&self) -> &str {
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => version,
            _ => DEFAULT_KIND_VERSION,
        }
    }

    /// Node image override, if one was set and is non-empty
    pub fn node_image(&self) -> Option<&str> {
        self.image.as_deref().filter(|image| !image.is_empty())
    }
}

/// Option applied to a cluster before creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOpt {
    /// Kind binary path or name
    Path(String),
    /// Kind release
    Version(String),
    /// Node image reference
    Image(String),
}

/// Polling settings for readiness waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Give up after this long
    pub timeout: Duration,

    /// Delay between polls
    pub interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(5),
        }
    }
}

impl WaitSettings {
    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_config_defaults() {
        let config = ClusterConfig::new("test");

        assert_eq!(config.name, "test");
        assert_eq!(config.resolved_path(), "kind");
        assert_eq!(config.resolved_version(), DEFAULT_KIND_VERSION);
        assert_eq!(config.node_image(), None);
        assert_eq!(config.wait, WaitSettings::default());
    }

    #[test]
    fn test_cluster_config_builder() {
        let config = ClusterConfig::new("test")
            .path("/opt/bin/kind")
            .version("v0.20.0")
            .image("kindest/node:v1.29.0");

        assert_eq!(config.resolved_path(), "/opt/bin/kind");
        assert_eq!(config.resolved_version(), "v0.20.0");
        assert_eq!(config.node_image(), Some("kindest/node:v1.29.0"));
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = ClusterConfig::new("test").path("").version("").image("");

        assert_eq!(config.resolved_path(), DEFAULT_KIND_PATH);
        assert_eq!(config.resolved_version(), DEFAULT_KIND_VERSION);
        assert_eq!(config.node_image(), None);
    }

    #[test]
    fn test_apply_opts_in_order() {
        let config = ClusterConfig::new("test").apply([
            ClusterOpt::Version("v0.18.0".to_string()),
            ClusterOpt::Image("kindest/node:v1.27.3".to_string()),
            ClusterOpt::Version("v0.19.0".to_string()),
        ]);

        assert_eq!(config.resolved_version(), "v0.19.0");
        assert_eq!(config.node_image(), Some("kindest/node:v1.27.3"));
    }

    #[test]
    fn test_version_is_per_config() {
        let pinned = ClusterConfig::new("a").version("v0.20.0");
        let other = ClusterConfig::new("b");

        assert_eq!(pinned.resolved_version(), "v0.20.0");
        assert_eq!(other.resolved_version(), DEFAULT_KIND_VERSION);
    }

    #[test]
    fn test_wait_settings() {
        let wait = WaitSettings::default()
            .timeout(Duration::from_secs(60))
            .interval(Duration::from_millis(500));

        assert_eq!(wait.timeout, Duration::from_secs(60));
        assert_eq!(wait.interval, Duration::from_millis(500));
        assert_eq!(WaitSettings::default().timeout, Duration::from_secs(300));
    }
}
