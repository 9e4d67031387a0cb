//! Agent settings and recipe loading.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_recipe, parse_recipe_str, read_recipes, substitute_env_vars};
pub use types::AgentConfig;
pub use validator::validate_recipe;
