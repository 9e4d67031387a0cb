//! Recipe execution: plugin setup, stream wiring, and run bookkeeping.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metasync_types::{
    Extractor, InvalidConfigError, PluginKind, PluginRecipe, Processor, Recipe, Record, Sink,
};
use tokio::sync::Mutex;

use crate::config::AgentConfig;
use crate::errors::PipelineError;
use crate::monitor::{Monitor, NoopMonitor, PluginReport};
use crate::registry::Registry;
use crate::result::Run;
use crate::retry::Retrier;
use crate::stream::{middleware_fn, Middleware, Stream, Subscriber};

/// Runs recipes against a plugin registry.
///
/// Cloning is cheap; clones share the registry and monitors.
#[derive(Clone)]
pub struct Agent {
    registry: Arc<Registry>,
    monitors: Vec<Arc<dyn Monitor>>,
    retrier: Retrier,
    sink_batch_size: usize,
    stop_on_sink_error: bool,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("registry", &self.registry)
            .field("retrier", &self.retrier)
            .field("sink_batch_size", &self.sink_batch_size)
            .field("stop_on_sink_error", &self.stop_on_sink_error)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RunCounters {
    records: Arc<AtomicU64>,
    extractor_retries: Arc<AtomicU32>,
}

impl Agent {
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: AgentConfig) -> Self {
        let monitors = if config.monitors.is_empty() {
            vec![Arc::new(NoopMonitor) as Arc<dyn Monitor>]
        } else {
            config.monitors
        };
        Self {
            registry,
            monitors,
            retrier: Retrier::new(config.max_retries, config.retry_initial_interval),
            sink_batch_size: config.sink_batch_size,
            stop_on_sink_error: config.stop_on_sink_error,
        }
    }

    /// Resolve every plugin in `recipe` and let each check its own config.
    ///
    /// Checks the source, then sinks, then processors, and returns every
    /// failure found. Config rejections carry the plugin kind and name.
    #[must_use]
    pub fn validate(&self, recipe: &Recipe) -> Vec<anyhow::Error> {
        let mut errors = Vec::new();

        let source = &recipe.source;
        match self.registry.extractor(&source.name) {
            Ok(extractor) => {
                if let Err(e) = extractor.validate(&source.plugin_config()) {
                    errors.push(with_plugin(e, PluginKind::Extractor, &source.name));
                }
            }
            Err(e) => errors.push(e.into()),
        }

        for sink in &recipe.sinks {
            match self.registry.sink(&sink.name) {
                Ok(instance) => {
                    if let Err(e) = instance.validate(&sink.plugin_config()) {
                        errors.push(with_plugin(e, PluginKind::Sink, &sink.name));
                    }
                }
                Err(e) => errors.push(e.into()),
            }
        }

        for processor in &recipe.processors {
            match self.registry.processor(&processor.name) {
                Ok(instance) => {
                    if let Err(e) = instance.validate(&processor.plugin_config()) {
                        errors.push(with_plugin(e, PluginKind::Processor, &processor.name));
                    }
                }
                Err(e) => errors.push(e.into()),
            }
        }

        errors
    }

    /// Execute one recipe. Never fails; the outcome is in [`Run::error`].
    pub async fn run(&self, recipe: Recipe) -> Run {
        tracing::info!(recipe = %recipe.name, source = %recipe.source.name, "Running recipe");
        let start = Instant::now();
        let counters = RunCounters::default();

        let mut run = Run::new(recipe);
        run.error = self.execute(&run.recipe, &counters).await.err();
        run.duration_ms = duration_ms(start.elapsed());
        run.record_count = counters.records.load(Ordering::Relaxed);
        run.extractor_retries = counters.extractor_retries.load(Ordering::Relaxed);

        self.record_run(&run);
        run
    }

    /// Execute every recipe concurrently. Runs come back in input order.
    pub async fn run_multiple(&self, recipes: Vec<Recipe>) -> Vec<Run> {
        let handles: Vec<_> = recipes
            .into_iter()
            .map(|recipe| {
                let agent = self.clone();
                let fallback = recipe.clone();
                (fallback, tokio::spawn(async move { agent.run(recipe).await }))
            })
            .collect();

        let mut runs = Vec::with_capacity(handles.len());
        for (recipe, handle) in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(join_err) => {
                    tracing::error!(recipe = %recipe.name, "Recipe task panicked: {join_err}");
                    let mut run = Run::new(recipe);
                    run.error = Some(PipelineError::Execution(anyhow::anyhow!(
                        "recipe task panicked: {join_err}"
                    )));
                    runs.push(run);
                }
            }
        }
        runs
    }

    async fn execute(&self, recipe: &Recipe, counters: &RunCounters) -> Result<(), PipelineError> {
        let extractor = self
            .setup_extractor(&recipe.source)
            .await
            .map_err(PipelineError::Setup)?;

        let mut stream = Stream::new();
        for processor in &recipe.processors {
            let middleware = self
                .setup_processor(processor)
                .await
                .map_err(PipelineError::Setup)?;
            stream.use_middleware(Box::new(middleware));
        }
        for sink in &recipe.sinks {
            let subscriber = self
                .setup_sink(sink, &recipe.name)
                .await
                .map_err(PipelineError::Setup)?;
            stream.subscribe(Box::new(subscriber), self.sink_batch_size);
        }

        let records = Arc::clone(&counters.records);
        let recipe_name = recipe.name.clone();
        stream.use_middleware(Box::new(middleware_fn(move |record: Record| {
            records.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(recipe = %recipe_name, urn = record.urn(), "Extracted record");
            Ok(record)
        })));

        let stream = Arc::new(stream);
        let producer = tokio::spawn(run_extractor(
            extractor,
            recipe.source.name.clone(),
            Arc::clone(&stream),
            self.retrier,
            Arc::clone(&counters.extractor_retries),
        ));

        let broadcast_result = stream.broadcast().await;
        let extract_result = match producer.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::anyhow!("extractor task panicked: {join_err}")
                .context(format!("could not run extractor \"{}\"", recipe.source.name))),
        };

        // The stream's error is the root cause; the extractor usually only
        // saw its pushes rejected.
        broadcast_result.map_err(PipelineError::Execution)?;
        extract_result.map_err(PipelineError::Execution)
    }

    async fn setup_extractor(&self, source: &PluginRecipe) -> Result<Box<dyn Extractor>> {
        let mut extractor = self.registry.extractor(&source.name)?;
        extractor
            .init(&source.plugin_config())
            .await
            .map_err(|e| with_plugin(e, PluginKind::Extractor, &source.name))
            .with_context(|| format!("could not initialize extractor \"{}\"", source.name))?;
        Ok(extractor)
    }

    async fn setup_processor(&self, recipe: &PluginRecipe) -> Result<ProcessorMiddleware> {
        let mut processor = self.registry.processor(&recipe.name)?;
        processor
            .init(&recipe.plugin_config())
            .await
            .map_err(|e| with_plugin(e, PluginKind::Processor, &recipe.name))
            .with_context(|| format!("could not initialize processor \"{}\"", recipe.name))?;
        Ok(ProcessorMiddleware {
            name: recipe.name.clone(),
            processor,
        })
    }

    async fn setup_sink(&self, recipe: &PluginRecipe, recipe_name: &str) -> Result<SinkSubscriber> {
        let mut sink = self.registry.sink(&recipe.name)?;
        sink.init(&recipe.plugin_config())
            .await
            .map_err(|e| with_plugin(e, PluginKind::Sink, &recipe.name))
            .with_context(|| format!("could not initialize sink \"{}\"", recipe.name))?;
        Ok(SinkSubscriber {
            name: recipe.name.clone(),
            recipe_name: recipe_name.to_string(),
            sink: Mutex::new(sink),
            retrier: self.retrier,
            monitors: self.monitors.clone(),
            stop_on_sink_error: self.stop_on_sink_error,
        })
    }

    fn record_run(&self, run: &Run) {
        for monitor in &self.monitors {
            monitor.record_run(&run.recipe, run.duration_ms, run.is_success());
        }

        match &run.error {
            None => tracing::info!(
                recipe = %run.recipe.name,
                duration_ms = run.duration_ms,
                record_count = run.record_count,
                "Recipe finished"
            ),
            Some(err) => tracing::error!(
                recipe = %run.recipe.name,
                duration_ms = run.duration_ms,
                record_count = run.record_count,
                error = %err,
                "Recipe failed"
            ),
        }
    }
}

/// Closes the stream when the producer task ends, including by panic.
struct CloseOnDrop(Arc<Stream>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

async fn run_extractor(
    extractor: Box<dyn Extractor>,
    name: String,
    stream: Arc<Stream>,
    retrier: Retrier,
    retries: Arc<AtomicU32>,
) -> Result<()> {
    let _close = CloseOnDrop(Arc::clone(&stream));
    let extractor = Mutex::new(extractor);
    let extractor = &extractor;
    let emitter: &Stream = &stream;

    retrier
        .retry(
            move || async move { extractor.lock().await.extract(emitter).await },
            |err, delay| {
                retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    extractor = %name,
                    retry_delay_ms = duration_ms(delay),
                    error = %format!("{err:#}"),
                    "Retrying extractor"
                );
            },
        )
        .await
        .with_context(|| format!("could not run extractor \"{name}\""))
}

struct ProcessorMiddleware {
    name: String,
    processor: Box<dyn Processor>,
}

#[async_trait]
impl Middleware for ProcessorMiddleware {
    async fn handle(&self, record: Record) -> Result<Record> {
        self.processor
            .process(record)
            .await
            .with_context(|| format!("could not run processor \"{}\"", self.name))
    }
}

struct SinkSubscriber {
    name: String,
    recipe_name: String,
    sink: Mutex<Box<dyn Sink>>,
    retrier: Retrier,
    monitors: Vec<Arc<dyn Monitor>>,
    stop_on_sink_error: bool,
}

#[async_trait]
impl Subscriber for SinkSubscriber {
    async fn deliver(&mut self, batch: Vec<Record>) -> Result<()> {
        let mut report = PluginReport {
            recipe_name: self.recipe_name.clone(),
            plugin_name: self.name.clone(),
            kind: PluginKind::Sink,
            batch_size: batch.len(),
            success: false,
        };

        let sink = &self.sink;
        let batch = &batch;
        let monitors = &self.monitors;
        let name = &self.name;
        let result = self
            .retrier
            .retry(
                move || async move { sink.lock().await.write(batch).await },
                |err, delay| {
                    for monitor in monitors {
                        monitor.record_sink_retry(&report);
                    }
                    tracing::warn!(
                        sink = %name,
                        retry_delay_ms = duration_ms(delay),
                        error = %format!("{err:#}"),
                        "Retrying sink"
                    );
                },
            )
            .await;

        report.success = result.is_ok();
        for monitor in &self.monitors {
            monitor.record_plugin(&report);
        }

        match result {
            Ok(()) => {
                tracing::debug!(
                    sink = %self.name,
                    recipe = %self.recipe_name,
                    batch_size = batch.len(),
                    "Published batch"
                );
                Ok(())
            }
            Err(err) => {
                let err = err.context(format!("could not run sink \"{}\"", self.name));
                tracing::error!(sink = %self.name, error = %format!("{err:#}"), "Sink write failed");
                if self.stop_on_sink_error {
                    Err(err)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .get_mut()
            .close()
            .await
            .with_context(|| format!("could not close sink \"{}\"", self.name))
    }

    fn label(&self) -> String {
        format!("sink \"{}\"", self.name)
    }
}

/// Attach plugin identity to an [`InvalidConfigError`] anywhere in the chain.
fn with_plugin(err: anyhow::Error, kind: PluginKind, name: &str) -> anyhow::Error {
    match err.downcast::<InvalidConfigError>() {
        Ok(invalid) => invalid.with_plugin(kind, name).into(),
        Err(err) => {
            let nested = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<InvalidConfigError>())
                .cloned();
            match nested {
                Some(invalid) => invalid.with_plugin(kind, name).into(),
                None => err,
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
