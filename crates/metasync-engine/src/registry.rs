//! Name → factory lookup for extractors, processors and sinks.

use std::collections::HashMap;

use metasync_types::{DuplicatePluginError, Extractor, NotFoundError, PluginKind, Processor, Sink};

type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

struct Catalog<T: ?Sized> {
    kind: PluginKind,
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized> Catalog<T> {
    fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            factories: HashMap::new(),
        }
    }

    fn register(&mut self, name: &str, factory: Factory<T>) -> Result<(), DuplicatePluginError> {
        if self.factories.contains_key(name) {
            return Err(DuplicatePluginError {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    fn build(&self, name: &str) -> Result<Box<T>, NotFoundError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| NotFoundError {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Plugin factories, keyed by kind and name.
///
/// Every lookup builds a fresh instance, so concurrent runs never share
/// plugin state.
pub struct Registry {
    extractors: Catalog<dyn Extractor>,
    processors: Catalog<dyn Processor>,
    sinks: Catalog<dyn Sink>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("extractors", &self.extractors.names())
            .field("processors", &self.processors.names())
            .field("sinks", &self.sinks.names())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Catalog::new(PluginKind::Extractor),
            processors: Catalog::new(PluginKind::Processor),
            sinks: Catalog::new(PluginKind::Sink),
        }
    }

    /// A registry holding the built-in plugins.
    ///
    /// # Errors
    ///
    /// Fails only if two built-ins share a name.
    pub fn with_builtins() -> Result<Self, DuplicatePluginError> {
        let mut registry = Self::new();
        crate::builtin::register(&mut registry)?;
        Ok(registry)
    }

    /// # Errors
    ///
    /// Returns [`DuplicatePluginError`] if `name` is already registered.
    pub fn register_extractor<F>(&mut self, name: &str, factory: F) -> Result<(), DuplicatePluginError>
    where
        F: Fn() -> Box<dyn Extractor> + Send + Sync + 'static,
    {
        self.extractors.register(name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Returns [`DuplicatePluginError`] if `name` is already registered.
    pub fn register_processor<F>(&mut self, name: &str, factory: F) -> Result<(), DuplicatePluginError>
    where
        F: Fn() -> Box<dyn Processor> + Send + Sync + 'static,
    {
        self.processors.register(name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Returns [`DuplicatePluginError`] if `name` is already registered.
    pub fn register_sink<F>(&mut self, name: &str, factory: F) -> Result<(), DuplicatePluginError>
    where
        F: Fn() -> Box<dyn Sink> + Send + Sync + 'static,
    {
        self.sinks.register(name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unregistered name.
    pub fn extractor(&self, name: &str) -> Result<Box<dyn Extractor>, NotFoundError> {
        self.extractors.build(name)
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unregistered name.
    pub fn processor(&self, name: &str) -> Result<Box<dyn Processor>, NotFoundError> {
        self.processors.build(name)
    }

    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unregistered name.
    pub fn sink(&self, name: &str) -> Result<Box<dyn Sink>, NotFoundError> {
        self.sinks.build(name)
    }

    /// Registered names of one kind, sorted.
    #[must_use]
    pub fn names(&self, kind: PluginKind) -> Vec<String> {
        match kind {
            PluginKind::Extractor => self.extractors.names(),
            PluginKind::Processor => self.processors.names(),
            PluginKind::Sink => self.sinks.names(),
        }
    }

    #[must_use]
    pub fn contains(&self, kind: PluginKind, name: &str) -> bool {
        match kind {
            PluginKind::Extractor => self.extractors.factories.contains_key(name),
            PluginKind::Processor => self.processors.factories.contains_key(name),
            PluginKind::Sink => self.sinks.factories.contains_key(name),
        }
    }
}
