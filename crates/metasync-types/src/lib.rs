//! Shared metasync record, recipe, plugin contract, and error model types.
//!
//! The engine and every plugin implementation depend on this crate; it
//! carries no runtime of its own.

pub mod error;
pub mod plugin;
pub mod recipe;
pub mod record;

pub use error::{
    is_retryable, ConfigError, DuplicatePluginError, InvalidConfigError, NotFoundError,
    RetryableError,
};
pub use plugin::{Emit, Extractor, PluginConfig, PluginKind, Processor, Sink};
pub use recipe::{PluginRecipe, Recipe};
pub use record::Record;
