//! `tilecast serve`: Start the HTTP gateway.

use tilecast_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        return Err("No API key configured. Set GEMINI_API_KEY or run `tilecast init`.".into());
    }

    println!("Tilecast Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:   {} ({})", config.default_provider, config.default_model);
    println!("   Endpoints:  {}", config.dashboard.endpoint_base_url);

    tilecast_gateway::start(config).await?;

    Ok(())
}
