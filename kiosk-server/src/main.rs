use kiosk_server::{Config, Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before the config reads the environment
    dotenv::dotenv().ok();
    let config = Config::from_env();
    setup_environment(&config)?;

    print_banner();
    tracing::info!(
        port = config.http_port,
        environment = %config.environment,
        "Kiosk server starting..."
    );

    let state = ServerState::initialize(&config);
    let server = Server::with_state(config, state);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
