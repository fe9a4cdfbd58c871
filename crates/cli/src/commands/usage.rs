//! `finmentor usage`: Rate and budget consumption for one user.

use finmentor_config::AppConfig;
use finmentor_telemetry::{GuardLimits, RateBudgetGuard, UsageSnapshot};

pub async fn run(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let snapshot = snapshot_for(&config, user_id).await?;
    print!("{}", render(&snapshot));
    Ok(())
}

/// Read the usage ledger directly; no provider is involved.
async fn snapshot_for(
    config: &AppConfig,
    user_id: &str,
) -> Result<UsageSnapshot, Box<dyn std::error::Error>> {
    let store = finmentor_gateway::build_store(config).await?;
    let guard = RateBudgetGuard::new(store, GuardLimits::from(&config.guard));
    Ok(guard.snapshot(user_id).await?)
}

fn render(snapshot: &UsageSnapshot) -> String {
    let pct = if snapshot.monthly_token_budget > 0 {
        (snapshot.tokens_this_month as f64 / snapshot.monthly_token_budget as f64 * 100.0).min(100.0)
    } else {
        100.0
    };
    let flag = |hit: bool| if hit { "⛔ LIMIT REACHED" } else { "✅" };

    let mut out = String::new();
    out.push_str(&format!("📊 Usage for {}\n", snapshot.user_id));
    out.push_str("─────────────────────────────────────\n");
    out.push_str(&format!(
        "  Calls (last {}s): {} / {} {}\n",
        snapshot.window_secs,
        snapshot.calls_in_window,
        snapshot.max_calls_per_window,
        flag(snapshot.rate_limited)
    ));
    out.push_str(&format!(
        "  Tokens (month):   {} / {} ({:.1}%) {}\n",
        snapshot.tokens_this_month,
        snapshot.monthly_token_budget,
        pct,
        flag(snapshot.budget_exhausted)
    ));
    out.push_str(&format!("  Remaining:        {}\n", snapshot.remaining_tokens));
    out
}
