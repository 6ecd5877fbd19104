//! Rich wait errors with debugging context
//!
//! When the control plane does not come up in time, the error says which
//! selector was being waited on, how many pods matched, and what state those
//! pods were in.
//!
//! # Example
//!
//! ```ignore
//! match cluster.wait_for_control_plane(&cancel, &client).await {
//!     Err(ProviderError::Readiness(ReadinessError::Timeout(err))) => {
//!         println!("Selector: {}", err.resource);
//!         println!("Last state: {}", err.last_state);
//!         for pod in &err.pods {
//!             println!("  {pod}");
//!         }
//!     }
//!     _ => {}
//! }
//! ```

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;

/// Rich error context for wait operations
#[derive(Debug, Clone)]
pub struct WaitError {
    /// What was waited on (e.g., "pods component in (etcd,kube-apiserver)")
    pub resource: String,
    /// Description of the last observed state
    pub last_state: String,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The timeout that was configured
    pub timeout: Duration,
    /// Per-pod state at the last poll
    pub pods: Vec<String>,
}

impl WaitError {
    /// Create a new WaitError
    pub fn new(resource: impl Into<String>, timeout: Duration, elapsed: Duration) -> Self {
        Self {
            resource: resource.into(),
            last_state: "unknown".to_string(),
            elapsed,
            timeout,
            pods: Vec::new(),
        }
    }

    /// Set the last observed state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }

    /// Attach the pods seen at the last poll
    pub fn with_pods(mut self, pods: Vec<String>) -> Self {
        self.pods = pods;
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Wait timeout for {}", self.resource)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        writeln!(f, "└─ Timeout: {:?}", self.timeout)?;

        if !self.pods.is_empty() {
            writeln!(f)?;
            writeln!(f, "Matching pods:")?;
            for (i, pod) in self.pods.iter().enumerate() {
                let prefix = if i == self.pods.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                writeln!(f, "{prefix} {pod}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for WaitError {}

/// Helper trait for extracting state description from K8s resources
pub trait ResourceState {
    /// Get a human-readable description of the resource's current state
    fn state_description(&self) -> String;
}

impl ResourceState for Pod {
    fn state_description(&self) -> String {
        let name = self.metadata.name.as_deref().unwrap_or("<unnamed>");
        let phase = self
            .status
            .as_ref()
            .and_then(|s| s.phase.as_ref())
            .map(|s| s.as_str())
            .unwrap_or("Unknown");

        let containers = self
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref());

        match containers {
            Some(statuses) => {
                let total = statuses.len();
                let ready = statuses.iter().filter(|c| c.ready).count();

                let waiting_reasons: Vec<&str> = statuses
                    .iter()
                    .filter_map(|c| {
                        c.state
                            .as_ref()
                            .and_then(|s| s.waiting.as_ref())
                            .and_then(|w| w.reason.as_deref())
                    })
                    .collect();

                if !waiting_reasons.is_empty() {
                    format!(
                        "{}: phase={}, containers {}/{} ready, waiting: {}",
                        name,
                        phase,
                        ready,
                        total,
                        waiting_reasons.join(", ")
                    )
                } else {
                    format!("{name}: phase={phase}, containers {ready}/{total} ready")
                }
            }
            None => format!("{name}: phase={phase}, no container status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateWaiting, ContainerStatus, PodStatus,
    };
    use kube::api::ObjectMeta;

    #[test]
    fn test_wait_error_display() {
        let err = WaitError::new(
            "pods k8s-app in (kindnet,kube-dns,kube-proxy)",
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .with_state("2/3 pods matched");

        let output = err.to_string();
        assert!(output.contains("k8s-app in (kindnet,kube-dns,kube-proxy)"));
        assert!(output.contains("2/3 pods matched"));
        assert!(output.contains("60s"));
        assert!(!output.contains("Matching pods"));
    }

    #[test]
    fn test_wait_error_with_pods() {
        let err = WaitError::new(
            "pods component in (etcd)",
            Duration::from_secs(30),
            Duration::from_secs(30),
        )
        .with_pods(vec![
            "etcd-a: phase=Pending, no container status".to_string(),
            "etcd-b: phase=Running, containers 1/1 ready".to_string(),
        ]);

        let output = err.to_string();
        assert!(output.contains("Matching pods:"));
        assert!(output.contains("├─ etcd-a: phase=Pending"));
        assert!(output.contains("└─ etcd-b: phase=Running"));
    }

    #[test]
    fn test_wait_error_builder() {
        let err = WaitError::new(
            "pods component in (etcd)",
            Duration::from_secs(120),
            Duration::from_secs(115),
        );

        assert_eq!(err.resource, "pods component in (etcd)");
        assert_eq!(err.timeout, Duration::from_secs(120));
        assert_eq!(err.elapsed, Duration::from_secs(115));
        assert_eq!(err.last_state, "unknown");
        assert!(err.pods.is_empty());
    }

    #[test]
    fn test_pod_state_description() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("kube-dns-abc".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "coredns".to_string(),
                    ready: false,
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("ContainerCreating".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let state = pod.state_description();
        assert!(state.starts_with("kube-dns-abc:"));
        assert!(state.contains("phase=Pending"));
        assert!(state.contains("0/1 ready"));
        assert!(state.contains("ContainerCreating"));
    }

    #[test]
    fn test_pod_state_description_without_status() {
        let state = Pod::default().state_description();
        assert_eq!(state, "<unnamed>: phase=Unknown, no container status");
    }
}
