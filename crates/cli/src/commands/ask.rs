//! `finmentor ask`: One message through the full pipeline.

use finmentor_agent::TurnStatus;
use finmentor_config::AppConfig;
use tracing::debug;

pub async fn run(
    message: &str,
    user_id: &str,
    thread_id: Option<&str>,
    locale: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions when no key is set
    if config.default_provider != "ollama" && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    FINMENTOR_API_KEY   (generic)");
        eprintln!("    GEMINI_API_KEY      (Gemini)");
        eprintln!("    OPENAI_API_KEY      (OpenAI-compatible)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let orchestrator = finmentor_gateway::build_orchestrator(&config).await?;
    let locale = orchestrator.resolve_locale(locale);

    let thread_id = match thread_id {
        Some(id) => id.to_string(),
        None => orchestrator.create_thread(user_id, "", None).await?.id,
    };

    debug!(thread_id = %thread_id, user_id, locale = %locale, "Sending one-shot message");
    let reply = orchestrator
        .send_message(&thread_id, user_id, message, locale)
        .await
        .map_err(|e| format!("{} ({})", e, e.code()))?;

    println!("{}", reply.message.content);
    if reply.message.metadata.get("hasActionCard").is_some() {
        println!();
        println!("📎 {}", serde_json::Value::Object(reply.message.metadata.clone()));
    }
    println!();
    let status = match reply.status {
        TurnStatus::Delivered => "delivered",
        TurnStatus::Degraded => "degraded",
    };
    println!(
        "   thread {thread_id} · {status} · {} tokens{}",
        reply.tokens,
        if reply.cache_hit { " · cached" } else { "" }
    );

    Ok(())
}
