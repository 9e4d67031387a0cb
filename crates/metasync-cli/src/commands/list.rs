use anyhow::Result;

use metasync_engine::Registry;
use metasync_types::PluginKind;

/// Execute the `list` command: print every registered plugin by kind.
pub fn execute() -> Result<()> {
    let registry = Registry::with_builtins()?;

    for (label, kind) in [
        ("Extractors", PluginKind::Extractor),
        ("Processors", PluginKind::Processor),
        ("Sinks", PluginKind::Sink),
    ] {
        println!("{label}:");
        let names = registry.names(kind);
        if names.is_empty() {
            println!("  (none)");
        }
        for name in names {
            println!("  {name}");
        }
    }
    Ok(())
}
