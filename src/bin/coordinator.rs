use anyhow::Context;
use recocluster_lib::{CoordinatorConfig, CoordinatorNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => recocluster_lib::config::load_from_file::<CoordinatorConfig>(&path)
            .with_context(|| format!("loading coordinator config from {}", path))?,
        None => CoordinatorConfig::from_env().context("reading coordinator config from environment")?,
    };

    let server = CoordinatorNode::serve(&config)
        .await
        .with_context(|| format!("starting coordinator on {}", config.bind_addr))?;

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    log::info!("Shutdown signal received");
    server.shutdown().await;
    Ok(())
}
