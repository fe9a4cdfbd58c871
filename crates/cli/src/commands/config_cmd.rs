//! `finmentor config`: Configuration management commands.

use finmentor_config::AppConfig;

pub fn default_toml() {
    print!("{}", AppConfig::default_toml());
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if config.default_provider != "ollama" && !config.has_api_key() {
                warnings.push("No API key set (set FINMENTOR_API_KEY or GEMINI_API_KEY env var)");
            }
            if !config.cache.enabled {
                warnings.push("Response cache disabled: every general question costs a call");
            }
            if config.gateway.host == "0.0.0.0" {
                warnings.push("Gateway bound to 0.0.0.0: make sure an authenticating proxy sets X-User-Id");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", finmentor_providers::resolve_model(&config));
            println!(
                "   Guard:     {} calls / {}s, {} tokens / month",
                config.guard.max_calls_per_window,
                config.guard.window_secs,
                config.guard.monthly_token_budget
            );
            println!(
                "   Context:   summarize after {}, keep {}",
                config.context.summarize_threshold, config.context.retained_tail
            );
            println!("   Store:     {}", config.store.backend);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config.api_key = None;
    for provider in config.providers.values_mut() {
        provider.api_key = None;
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}
