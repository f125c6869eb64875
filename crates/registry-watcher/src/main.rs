use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use registry_watcher::config::Cli;
use registry_watcher::config::Commands;
use registry_watcher::config::WatchArgs;
use registry_watcher::k8s::kube_client;
use registry_watcher::k8s::KubePodClient;
use registry_watcher::k8s::ServiceWatcher;
use registry_watcher::k8s::WatcherError;
use registry_watcher::logging;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch(watch_args) => run_watch(watch_args).await,
    }
}

async fn run_watch(args: WatchArgs) -> Result<()> {
    let _guard = logging::init(args.log_file.as_ref())?;

    tracing::info!(
        namespace = ?args.namespace(),
        service = ?args.service(),
        "Starting registry watcher {}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube_client::init_kube_client(args.kubeconfig.clone())
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to create Kubernetes client")?;
    let client = KubePodClient::new(client, args.namespace());

    let watcher = ServiceWatcher::start(&client, args.service())
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))
        .context("failed to start service watcher")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                watcher.stop();
                break;
            }
            result = watcher.next() => match result {
                Ok(result) => {
                    let line = serde_json::to_string(&result).context("failed to encode change result")?;
                    println!("{line}");
                }
                Err(e) if matches!(e.current_context(), WatcherError::Closed) => break,
                Err(e) => return Err(anyhow::anyhow!("{e:?}")),
            }
        }
    }

    Ok(())
}
