//! Structural validation for parsed recipes.

use anyhow::{bail, Result};
use metasync_types::Recipe;

/// Validate a recipe's shape without resolving any plugin.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing every structural problem found.
pub fn validate_recipe(recipe: &Recipe) -> Result<()> {
    let mut errors = Vec::new();

    if recipe.name.trim().is_empty() {
        errors.push("Recipe name must not be empty".to_string());
    }

    if recipe.source.name.trim().is_empty() {
        errors.push("Source name must not be empty".to_string());
    }

    if recipe.sinks.is_empty() {
        errors.push("Recipe must define at least one sink".to_string());
    }

    for (i, processor) in recipe.processors.iter().enumerate() {
        if processor.name.trim().is_empty() {
            errors.push(format!("processors[{i}] has an empty name"));
        }
    }

    for (i, sink) in recipe.sinks.iter().enumerate() {
        if sink.name.trim().is_empty() {
            errors.push(format!("sinks[{i}] has an empty name"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "Recipe '{}' validation failed:\n  - {}",
            recipe.name,
            errors.join("\n  - ")
        );
    }
}
