//! `notegraph status`: Show system status.

use notegraph_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("notegraph status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Max turns:    {}", config.agent.max_turns);
    println!("  Tools:        {}", if config.agent.parallel_tools { "parallel" } else { "sequential" });
    match config.store.backend.as_str() {
        "memory" => println!("  Store:        memory"),
        _ => println!("  Store:        file ({})", config.store.resolved_path().display()),
    }
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    if !config.providers.is_empty() {
        let mut names: Vec<&str> = config.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        println!("  Providers:    {}", names.join(", "));
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file, run `notegraph init` first");
    }

    Ok(())
}
