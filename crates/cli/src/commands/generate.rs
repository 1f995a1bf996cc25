//! `tilecast generate`: One generation run from the command line.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tilecast_agent::{DashboardAgent, RunOutcome};
use tilecast_config::AppConfig;
use tilecast_core::ApiCatalog;

pub struct GenerateArgs {
    pub preferences: Option<String>,
    pub apis: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub max_iterations: Option<u32>,
}

pub async fn run(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GEMINI_API_KEY   (default provider)");
        eprintln!("    OPENAI_API_KEY   (OpenAI-compatible providers)");
        eprintln!("    TILECAST_API_KEY (generic)");
        eprintln!();
        eprintln!("  Or add it to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let preferences = args.preferences.as_deref().map(parse_preferences);
    let apis = match &args.apis {
        Some(path) => Some(load_catalog(path)?),
        None => None,
    };

    let router = tilecast_providers::router::build_from_config(&config);
    let model = router.default().ok_or("No default provider configured")?;

    let mut agent = DashboardAgent::from_config(model, &config);
    if let Some(max) = args.max_iterations {
        agent = agent.with_max_iterations(max);
    }

    eprintln!(
        "  Generating with {} (up to {} iterations)...",
        agent.model_name(),
        agent.max_iterations()
    );
    let report = agent.run(preferences.as_ref(), apis.as_ref()).await;

    match &report.outcome {
        RunOutcome::Completed(_) => eprintln!(
            "  Done after {} iteration(s), {} endpoint call(s)",
            report.iterations, report.endpoint_calls
        ),
        RunOutcome::CeilingReached(_) => eprintln!(
            "  Iteration ceiling reached after {} endpoint call(s); using the last layout",
            report.endpoint_calls
        ),
        RunOutcome::Aborted { error, .. } => eprintln!("  [Error] {error}"),
    }

    let error = report.error().map(ToString::to_string);
    let Some(plan) = report.into_plan() else {
        return Err(error.unwrap_or_else(|| "No dashboard produced".into()).into());
    };

    for diagnostic in &plan.diagnostics {
        eprintln!("  [Warning] {diagnostic}");
    }

    let json = serde_json::to_string_pretty(&plan)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json)?;
            eprintln!("  Wrote {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Preferences given as JSON are passed through; anything else is free text.
fn parse_preferences(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn load_catalog(path: &Path) -> Result<ApiCatalog, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let catalog = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid API catalog in {}: {e}", path.display()))?;
    Ok(catalog)
}
