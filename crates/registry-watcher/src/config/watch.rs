use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct WatchArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "REGISTRY_NAMESPACE",
        help = "Kubernetes namespace to watch (empty for all namespaces)"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "REGISTRY_SERVICE",
        help = "Only watch pods labelled for this service"
    )]
    pub service: Option<String>,

    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to a daily rotated file, e.g. /logs/registry-watcher.log"
    )]
    pub log_file: Option<PathBuf>,
}

impl WatchArgs {
    pub fn namespace(&self) -> Option<String> {
        self.namespace.clone().filter(|ns| !ns.is_empty())
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref().filter(|s| !s.is_empty())
    }
}
