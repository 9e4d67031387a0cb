use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use metasync_engine::config::{parser, validator};
use metasync_engine::{Agent, AgentConfig, Registry};

/// Execute the `lint` command: structural checks plus plugin config
/// validation, without running anything.
pub fn execute(path: &Path) -> Result<()> {
    let recipes = parser::read_recipes(path)
        .with_context(|| format!("Failed to read recipes: {}", path.display()))?;
    if recipes.is_empty() {
        anyhow::bail!("No recipes found at {}", path.display());
    }

    let agent = Agent::new(Arc::new(Registry::with_builtins()?), AgentConfig::default());

    let mut problems = 0;
    for recipe in &recipes {
        let mut errors = Vec::new();
        if let Err(e) = validator::validate_recipe(recipe) {
            errors.push(e.to_string());
        }
        errors.extend(agent.validate(recipe).iter().map(|e| format!("{e:#}")));

        if errors.is_empty() {
            println!("{:<28} OK", recipe.name);
        } else {
            println!("{:<28} FAILED", recipe.name);
            for error in &errors {
                println!("  {error}");
            }
            problems += errors.len();
        }
    }

    if problems > 0 {
        anyhow::bail!("{problems} problem(s) found in {} recipe(s)", recipes.len());
    }
    println!("\nAll recipes passed.");
    Ok(())
}
