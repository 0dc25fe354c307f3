use clap::Parser;
use raft_userstore::config::NodeConfig;
use raft_userstore::error::StartupError;
use raft_userstore::start_user_node;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<(), StartupError> {
    // Setup the logger
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse the parameters passed by arguments or the environment.
    let config = NodeConfig::parse();

    let span = tracing::info_span!("userserver", node = %config.node_id);
    if let Err(e) = start_user_node(config).instrument(span).await {
        tracing::error!("user server failed: {}", e);
        return Err(e);
    }
    Ok(())
}
