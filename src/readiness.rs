//! Control-plane readiness gate
//!
//! A fresh Kind cluster reports success long before it can schedule
//! workloads. The gate polls for the system pods of each [`SelectorGroup`]
//! in order, and only moves to the next group once the current one has at
//! least its expected number of pods:
//!
//! 1. `component in (etcd, kube-apiserver, kube-controller-manager, kube-scheduler)`
//! 2. `k8s-app in (kindnet, kube-dns, kube-proxy)`
//!
//! Any listing error, timeout, or cancellation ends the wait immediately.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
use kube::api::{Api, ListParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::WaitSettings;
use crate::eventually::{eventually, ConditionError};
use crate::wait::{ResourceState, WaitError};

/// Errors from readiness waits
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("failed to list pods matching {selector}: {source}")]
    List {
        selector: String,
        #[source]
        source: kube::Error,
    },

    #[error("{0}")]
    Timeout(#[from] WaitError),

    #[error("control plane wait cancelled")]
    Cancelled,
}

/// A set of pods expected to exist, matched by one label requirement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorGroup {
    pub requirement: LabelSelectorRequirement,
    pub expected: usize,
}

impl SelectorGroup {
    /// Group for `key <operator> (values)`, expecting one pod per value
    pub fn new(
        key: impl Into<String>,
        operator: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let expected = values.len();
        Self {
            requirement: LabelSelectorRequirement {
                key: key.into(),
                operator: operator.into(),
                values: Some(values),
            },
            expected,
        }
    }

    /// Group for `key in (values)`
    pub fn label_in(
        key: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(key, "In", values)
    }

    /// Override the expected pod count
    pub fn expect(mut self, expected: usize) -> Self {
        self.expected = expected;
        self
    }

    /// Render the requirement as a label selector string
    pub fn selector(&self) -> Result<String, ReadinessError> {
        requirement_selector(&self.requirement)
    }
}

/// The system pod groups of a Kind control plane, in wait order
pub fn control_plane_groups() -> Vec<SelectorGroup> {
    vec![
        SelectorGroup::label_in(
            "component",
            [
                "etcd",
                "kube-apiserver",
                "kube-controller-manager",
                "kube-scheduler",
            ],
        ),
        SelectorGroup::label_in("k8s-app", ["kindnet", "kube-dns", "kube-proxy"]),
    ]
}

/// Render a label requirement in Kubernetes selector syntax
///
/// Values are sorted and deduplicated, as the API machinery does.
pub fn requirement_selector(req: &LabelSelectorRequirement) -> Result<String, ReadinessError> {
    if req.key.is_empty() {
        return Err(ReadinessError::InvalidSelector(
            "requirement key is empty".to_string(),
        ));
    }

    let mut values = req.values.clone().unwrap_or_default();
    values.sort();
    values.dedup();

    match req.operator.as_str() {
        "In" | "NotIn" => {
            if values.is_empty() {
                return Err(ReadinessError::InvalidSelector(format!(
                    "{}: operator {} requires at least one value",
                    req.key, req.operator
                )));
            }
            let op = if req.operator == "In" { "in" } else { "notin" };
            Ok(format!("{} {} ({})", req.key, op, values.join(",")))
        }
        "Exists" | "DoesNotExist" => {
            if !values.is_empty() {
                return Err(ReadinessError::InvalidSelector(format!(
                    "{}: operator {} takes no values",
                    req.key, req.operator
                )));
            }
            if req.operator == "Exists" {
                Ok(req.key.clone())
            } else {
                Ok(format!("!{}", req.key))
            }
        }
        other => Err(ReadinessError::InvalidSelector(format!(
            "{}: unsupported operator {other:?}",
            req.key
        ))),
    }
}

/// Lists pods across all namespaces by label selector
#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, kube::Error>;
}

#[async_trait]
impl PodLister for Client {
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, kube::Error> {
        let pods: Api<Pod> = Api::all(self.clone());
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }
}

/// Wait for the Kind control plane and its add-ons
pub async fn wait_for_control_plane<P: PodLister + ?Sized>(
    pods: &P,
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<(), ReadinessError> {
    wait_for_groups(pods, &control_plane_groups(), settings, cancel).await
}

/// Wait for each group in order
///
/// Every selector is validated before the first listing. A group is not
/// polled until all groups before it are satisfied.
#[instrument(skip_all, fields(groups = groups.len()))]
pub async fn wait_for_groups<P: PodLister + ?Sized>(
    pods: &P,
    groups: &[SelectorGroup],
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<(), ReadinessError> {
    let selectors = groups
        .iter()
        .map(SelectorGroup::selector)
        .collect::<Result<Vec<_>, _>>()?;

    for (group, selector) in groups.iter().zip(&selectors) {
        wait_for_group(pods, selector, group.expected, settings, cancel).await?;
    }

    info!("Control plane is ready");
    Ok(())
}

async fn wait_for_group<P: PodLister + ?Sized>(
    pods: &P,
    selector: &str,
    expected: usize,
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<(), ReadinessError> {
    debug!(selector = %selector, expected, "Waiting for pods");
    let last_seen: Mutex<Vec<String>> = Mutex::new(Vec::new());

    let check = || {
        let last_seen = &last_seen;
        async move {
            let items = pods.list_pods(selector).await?;
            debug!(selector = %selector, matched = items.len(), expected, "Polled pods");
            *last_seen.lock().unwrap_or_else(PoisonError::into_inner) =
                items.iter().map(ResourceState::state_description).collect();
            Ok::<_, kube::Error>(items.len() >= expected)
        }
    };

    let outcome = eventually(check)
        .timeout(settings.timeout)
        .interval(settings.interval)
        .cancel_on(cancel.clone())
        .await_condition()
        .await;

    match outcome {
        Ok(attempts) => {
            info!(selector = %selector, attempts, "Pods present");
            Ok(())
        }
        Err(ConditionError::Check(source)) => Err(ReadinessError::List {
            selector: selector.to_string(),
            source,
        }),
        Err(ConditionError::Cancelled { .. }) => Err(ReadinessError::Cancelled),
        Err(ConditionError::Timeout { elapsed, .. }) => {
            let seen = last_seen
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner);
            Err(WaitError::new(format!("pods {selector}"), settings.timeout, elapsed)
                .with_state(format!("{}/{} pods matched", seen.len(), expected))
                .with_pods(seen)
                .into())
        }
    }
}
