//! Plugins that ship with the agent.

pub mod console;
pub mod enrich;
pub mod labels;
pub mod static_source;

use metasync_types::DuplicatePluginError;

use crate::registry::Registry;

/// Register every built-in plugin.
///
/// # Errors
///
/// Returns [`DuplicatePluginError`] if `registry` already holds one of the
/// built-in names.
pub fn register(registry: &mut Registry) -> Result<(), DuplicatePluginError> {
    registry.register_extractor(static_source::NAME, || {
        Box::new(static_source::StaticExtractor::default())
    })?;
    registry.register_processor(labels::NAME, || Box::new(labels::LabelsProcessor::default()))?;
    registry.register_processor(enrich::NAME, || Box::new(enrich::EnrichProcessor::default()))?;
    registry.register_sink(console::NAME, || Box::new(console::ConsoleSink::stdout()))?;
    Ok(())
}
