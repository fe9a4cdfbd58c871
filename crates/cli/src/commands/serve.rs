//! `finmentor serve`: Start the HTTP API server.

use finmentor_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("💬 FinMentor Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, finmentor_providers::resolve_model(&config));
    println!("   Store:     {}", config.store.backend);

    finmentor_gateway::start(config).await?;

    Ok(())
}
