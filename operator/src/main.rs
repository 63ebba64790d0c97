use clap::{Parser, Subcommand};
use kube::client::Client;

mod allocator;
mod config;
mod controller;
mod launcher;
mod secrets;
mod util;

#[cfg(feature = "metrics")]
mod metrics;

/// Top-level CLI configuration for the binary. Any command line
/// flags should go in here.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

/// List of subcommands for the binary. Clap will convert the
/// name of each enum variant to kebab-case for the CLI.
/// e.g. `ManageConsumers` becomes `manage-consumers`.
#[derive(Subcommand)]
enum Command {
    /// Runs the `TaskRun` reconciler.
    Run {
        /// Namespace the controller creates AuxTasks and leases in, and
        /// resolves the config map / AWS credential secrets relative to.
        #[arg(long, env = "NAMESPACE", default_value = "default")]
        namespace: String,

        /// Name of the `ConfigMap` describing the static/dynamic platform
        /// pools (§6).
        #[arg(long, env = "CONFIG_MAP_NAME", default_value = "multi-platform-config")]
        config_map_name: String,
    },
}

/// Secondary entrypoint that runs the appropriate subcommand.
async fn run(client: Client) {
    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(metrics_port) = cli.metrics_port {
        tokio::spawn(metrics::run_server(metrics_port));
    }

    match cli.command {
        Command::Run {
            namespace,
            config_map_name,
        } => {
            let registry = allocator::default_registry();
            let platform_config = config::load_platform_config(
                client.clone(),
                &namespace,
                &config_map_name,
                &namespace,
                &registry,
            )
            .await
            .expect("failed to load platform configuration");
            controller::run(client, namespace, platform_config).await
        }
    }
    .unwrap();

    panic!("exited unexpectedly");
}

/// Main entrypoint that sets up the environment before running the secondary entrypoint `run`.
#[tokio::main]
async fn main() {
    multi_platform_common::init();

    // Create a kubernetes client using the default configuration.
    // In-cluster, the kubeconfig will be set by the service account.
    let client: Client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable.");

    // Run the secondary entrypoint.
    run(client).await;

    // This is an unreachable branch. The controller and metrics
    // server should never exit without a panic.
    panic!("exited prematurely");
}
