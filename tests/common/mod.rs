//! Scripted stand-ins for the kind binary and its installer

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kindling::{
    CommandRunner, InstallError, KindCluster, RunResult, RunnerError, ToolInstaller, WaitSettings,
};
use tempfile::TempDir;

pub fn kubeconfig_for(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://127.0.0.1:6443
  name: kind-{name}
contexts:
- context:
    cluster: kind-{name}
    user: kind-{name}
  name: kind-{name}
current-context: kind-{name}
preferences: {{}}
users:
- name: kind-{name}
  user:
    token: fake-token
"#
    )
}

#[derive(Default)]
struct FakeState {
    clusters: Vec<String>,
    calls: Vec<(String, Vec<String>)>,
    skip_register: bool,
    empty_kubeconfig: bool,
    kubeconfig: Option<String>,
    failing: Vec<String>,
}

/// Behaves like `kind` against an in-memory list of clusters
#[derive(Default)]
pub struct FakeKind {
    state: Mutex<FakeState>,
}

impl FakeKind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing cluster
    pub fn with_cluster(self, name: &str) -> Self {
        self.state.lock().unwrap().clusters.push(name.to_string());
        self
    }

    /// `create cluster` exits 0 without registering the cluster
    pub fn not_registering(self) -> Self {
        self.state.lock().unwrap().skip_register = true;
        self
    }

    /// `get kubeconfig` prints nothing
    pub fn empty_kubeconfig(self) -> Self {
        self.state.lock().unwrap().empty_kubeconfig = true;
        self
    }

    /// Make a subcommand (e.g. "create cluster") exit 1
    pub fn failing(self, subcommand: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .push(subcommand.to_string());
        self
    }

    /// Print `contents` for every later `get kubeconfig`
    pub fn serve_kubeconfig(&self, contents: &str) {
        self.state.lock().unwrap().kubeconfig = Some(contents.to_string());
    }

    /// Every invocation's arguments, space-joined
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, args)| args.join(" "))
            .collect()
    }

    /// Programs that were invoked
    pub fn programs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(program, _)| program.clone())
            .collect()
    }

    /// Number of invocations starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clusters(&self) -> Vec<String> {
        self.state.lock().unwrap().clusters.clone()
    }
}

#[async_trait]
impl CommandRunner for FakeKind {
    async fn run(&self, program: &str, args: &[String]) -> Result<RunResult, RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((program.to_string(), args.to_vec()));

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let subcommand = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
        if state.failing.contains(&subcommand) {
            return Ok(RunResult::failure(
                1,
                format!("ERROR: failed to {subcommand}: exit status 1"),
            ));
        }

        let result = match args.as_slice() {
            ["get", "clusters"] => {
                let mut listing = state.clusters.join("\n");
                if !listing.is_empty() {
                    listing.push('\n');
                }
                RunResult::success(listing)
            }
            ["create", "cluster", "--name", name, ..] => {
                if !state.skip_register {
                    state.clusters.push(name.to_string());
                }
                RunResult::success("")
            }
            ["get", "kubeconfig", "--name", name] => {
                if !state.clusters.iter().any(|c| c == name) {
                    RunResult::failure(1, "ERROR: could not locate any control plane nodes")
                } else if state.empty_kubeconfig {
                    RunResult::success("")
                } else if let Some(contents) = &state.kubeconfig {
                    RunResult::success(contents.clone())
                } else {
                    RunResult::success(kubeconfig_for(name))
                }
            }
            ["delete", "cluster", "--name", name] => {
                state.clusters.retain(|c| c != name);
                RunResult::success("")
            }
            ["load", "docker-image" | "image-archive", "--name", _, _] => RunResult::success(""),
            ["export", "logs", dest, "--name", name] => {
                RunResult::success(format!("Exported logs for cluster {name:?} to:\n{dest}\n"))
            }
            other => RunResult::failure(2, format!("unknown command: {other:?}")),
        };
        Ok(result)
    }
}

/// Installer that hands back a fixed path
pub struct FakeInstaller {
    pub calls: AtomicU32,
    path: Option<PathBuf>,
}

impl FakeInstaller {
    pub fn returning(path: impl Into<PathBuf>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            path: Some(path.into()),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicU32::new(0),
            path: None,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolInstaller for FakeInstaller {
    async fn install(
        &self,
        tool: &str,
        package: &str,
        version: &str,
    ) -> Result<PathBuf, InstallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.path
            .clone()
            .ok_or_else(|| InstallError::NotFoundAfterInstall {
                tool: tool.to_string(),
                package: package.to_string(),
                version: version.to_string(),
            })
    }
}

/// A placeholder kind binary on disk, so tool lookup succeeds
pub fn tool_dir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("kind");
    std::fs::write(&bin, "#!/bin/sh\n").unwrap();
    (dir, bin)
}

/// Cluster wired to `kind` and an installer that must not be needed
pub fn cluster(name: &str, kind: Arc<FakeKind>, bin: &Path) -> (KindCluster, Arc<FakeInstaller>) {
    let installer = Arc::new(FakeInstaller::failing());
    let cluster = KindCluster::new(name)
        .with_path(bin.to_string_lossy())
        .with_runner(kind)
        .with_installer(installer.clone())
        .with_wait(
            WaitSettings::default()
                .timeout(std::time::Duration::from_secs(5))
                .interval(std::time::Duration::from_millis(5)),
        );
    (cluster, installer)
}
