use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use metasync_engine::config::parser;
use metasync_engine::{Agent, AgentConfig, Registry, Run};

/// Execute the `run` command: read recipes, run them concurrently, and
/// summarize.
pub async fn execute(path: &Path, config: AgentConfig) -> Result<()> {
    // 1. Read recipes
    let recipes = parser::read_recipes(path)
        .with_context(|| format!("Failed to read recipes: {}", path.display()))?;
    if recipes.is_empty() {
        anyhow::bail!("No recipes found at {}", path.display());
    }

    tracing::info!(recipes = recipes.len(), path = %path.display(), "Recipes loaded");

    // 2. Run
    let registry = Arc::new(Registry::with_builtins()?);
    let agent = Agent::new(registry, config);
    let runs = agent.run_multiple(recipes).await;

    // 3. Report
    print_runs(&runs);

    let failed = runs.iter().filter(|run| !run.is_success()).count();
    println!();
    println!("  Failing:    {failed}");
    println!("  Successful: {}", runs.len() - failed);
    println!("  Total:      {}", runs.len());

    if failed > 0 {
        anyhow::bail!("{failed} of {} recipe(s) failed", runs.len());
    }
    Ok(())
}

fn print_runs(runs: &[Run]) {
    println!(
        "{:<8} {:<28} {:<16} {:>10} {:>8}",
        "STATUS", "RECIPE", "SOURCE", "DURATION", "RECORDS"
    );
    for run in runs {
        let status = if run.is_success() { "OK" } else { "FAILED" };
        println!(
            "{:<8} {:<28} {:<16} {:>8}ms {:>8}",
            status,
            run.recipe.name,
            run.recipe.source.name,
            run.duration_ms,
            run.record_count
        );
        if let Some(err) = &run.error {
            println!("  {err}");
        }
    }
}
