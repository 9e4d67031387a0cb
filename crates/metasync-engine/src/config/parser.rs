//! Recipe YAML parsing with environment variable substitution.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use metasync_types::Recipe;
use regex::Regex;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| {
            missing.push(var_name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a recipe YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_recipe_str(yaml_str: &str) -> Result<Recipe> {
    let substituted = substitute_env_vars(yaml_str)?;
    let recipe: Recipe =
        serde_yaml::from_str(&substituted).context("Failed to parse recipe YAML")?;
    Ok(recipe)
}

/// Parse a recipe file. A recipe without a `name` is named after the file
/// stem.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_recipe(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;
    let mut recipe = parse_recipe_str(&content)
        .with_context(|| format!("Invalid recipe: {}", path.display()))?;
    if recipe.name.trim().is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            recipe.name = stem.to_string();
        }
    }
    Ok(recipe)
}

/// Read one recipe file, or every `.yml`/`.yaml` file in a directory in
/// name order. Directory entries that fail to parse are skipped with a
/// warning.
///
/// # Errors
///
/// Returns an error if `path` cannot be read, or if it is a single file
/// that fails to parse.
pub fn read_recipes(path: &Path) -> Result<Vec<Recipe>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read recipe path: {}", path.display()))?;
    if !metadata.is_dir() {
        return Ok(vec![parse_recipe(path)?]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read recipe directory: {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_recipe_file(p))
        .collect();
    files.sort();

    let mut recipes = Vec::with_capacity(files.len());
    for file in files {
        match parse_recipe(&file) {
            Ok(recipe) => recipes.push(recipe),
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %format!("{e:#}"), "Skipping invalid recipe");
            }
        }
    }
    Ok(recipes)
}

fn is_recipe_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml")
    )
}
