use project_space::config::parse_cli_args;
use project_space::lifecycle::{shutdown_channel, wait_for_signal};

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("Space server starting...");

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = match project_space::start(config, shutdown_rx).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    wait_for_signal().await;
    tracing::info!("Shutdown signal received, stopping server...");
    shutdown_tx.trigger();
    handle.finish().await;

    tracing::info!("Server stopped.");
}
