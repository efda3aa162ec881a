//! `notegraph serve`: Start the HTTP API server.

use notegraph_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("notegraph gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Auth:      {}",
        if config.gateway.bearer_tokens.is_empty() {
            "disabled".to_string()
        } else {
            format!("{} bearer token(s)", config.gateway.bearer_tokens.len())
        }
    );
    println!("   Store:     {}", config.store.backend);

    notegraph_gateway::start(config).await?;

    Ok(())
}
