//! `tilecast status`: Show the effective configuration.

use tilecast_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let providers = tilecast_providers::router::build_from_config(&config);

    println!("Tilecast Status");
    println!("===============");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Provider:       {}", config.default_provider);
    println!("  Model:          {}", config.default_model);
    println!("  Temperature:    {}", config.default_temperature);
    println!("  Registered:     {}", providers.list().join(", "));
    println!("  API key:        {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Max iterations: {}", config.dashboard.max_iterations);
    println!("  Endpoints:      {}", config.dashboard.endpoint_base_url);
    println!("  Policy:         {:?}", config.dashboard.endpoint_policy);
    println!("  Stale after:    {}h", config.dashboard.stale_after_hours);
    println!("  Gateway:        {}:{}", config.gateway.host, config.gateway.port);
    println!("  Registry:       {}", config.registry.resolved_path().display());

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file: run `tilecast init` first");
    }

    Ok(())
}
