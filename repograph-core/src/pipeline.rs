// Ingest pipeline: discover → parse (rayon) → barrier → resolve → validate → store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use rayon::prelude::*;
use repograph_graphs::{
    AdapterRegistry, ParseLimits, ParseStatus, ParsedFile, RepositoryGraph, SourceFile,
    build_graph, validate,
};
use tracing::{debug, info, instrument, warn};

use crate::config::RepographConfig;
use crate::discover::discover_files;
use crate::error::{ConfigError, IngestError, RepographError};
use crate::job::{IngestJob, JobErrorKind, JobHandle};
use crate::progress::ProgressReporter;
use crate::store::GraphStore;

/// Stack for parse workers; syntax walks are depth-capped but recursive.
const PARSE_STACK_BYTES: usize = 8 * 1024 * 1024;

/// Runs ingest jobs. Holds the validated config and the adapter registry
/// shared by every job it runs.
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    config: RepographConfig,
    registry: Arc<AdapterRegistry>,
    limits: ParseLimits,
}

impl IngestPipeline {
    pub fn new(config: RepographConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let languages = config.ingest.languages.resolve()?;
        Ok(Self {
            registry: Arc::new(AdapterRegistry::with_languages(&languages)),
            limits: config.parse_limits(),
            config,
        })
    }

    pub fn config(&self) -> &RepographConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Discover the files under `root` and ingest them.
    ///
    /// Files rejected during discovery are recorded on the job and count as
    /// skipped. A missing root fails the job before anything is parsed.
    #[instrument(skip_all, name = "ingest_directory", fields(root = %root.display()))]
    pub async fn ingest_directory(
        &self,
        root: &Path,
        store: &dyn GraphStore,
        handle: &JobHandle,
        progress: Arc<dyn ProgressReporter>,
    ) -> crate::error::Result<RepositoryGraph> {
        let root_buf: PathBuf = root.to_path_buf();
        let ingest = self.config.ingest.clone();
        let discovered = tokio::task::spawn_blocking(move || discover_files(&root_buf, &ingest))
            .await
            .map_err(|e| IngestError::Worker(e.to_string()));

        let discovery = match discovered {
            Ok(Ok(discovery)) => discovery,
            Ok(Err(err)) => return Err(fail_job(handle, err.into())),
            Err(err) => return Err(fail_job(handle, err.into())),
        };

        info!(
            files = discovery.files.len(),
            skipped = discovery.skipped.len(),
            "Discovery complete"
        );
        handle.update(|job| {
            job.files_total += discovery.skipped.len();
            job.errors.extend(discovery.skipped);
        });

        self.run(discovery.files, store, handle, progress).await
    }

    /// Run one job over already-read files.
    ///
    /// On success the graph has been written and the job is `complete`. On
    /// any error the job is `failed` and the store is left untouched.
    #[instrument(skip_all, name = "ingest", fields(repository = %handle.repository(), files = files.len()))]
    pub async fn run(
        &self,
        files: Vec<SourceFile>,
        store: &dyn GraphStore,
        handle: &JobHandle,
        progress: Arc<dyn ProgressReporter>,
    ) -> crate::error::Result<RepositoryGraph> {
        handle.update(IngestJob::start)?;
        let start = Instant::now();

        match self.execute(files, store, handle, progress).await {
            Ok(graph) => {
                handle.update(IngestJob::complete)?;
                info!(
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    skipped = handle.snapshot().skipped_files().count(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Ingest complete"
                );
                Ok(graph)
            }
            Err(err) => Err(fail_job(handle, err)),
        }
    }

    async fn execute(
        &self,
        files: Vec<SourceFile>,
        store: &dyn GraphStore,
        handle: &JobHandle,
        progress: Arc<dyn ProgressReporter>,
    ) -> crate::error::Result<RepositoryGraph> {
        handle.update(|job| job.files_total += files.len());

        let parsed = self
            .parse_files(files, handle.cancel_flag(), progress)
            .await?;

        // Barrier: every file is drafted before any resolution starts.
        if handle.is_cancelled() {
            return Err(IngestError::Cancelled.into());
        }
        record_outcomes(&parsed, handle);

        let repository = handle.repository();
        let graph = tokio::task::spawn_blocking(move || build_graph(&repository, &parsed))
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))??;

        if handle.is_cancelled() {
            return Err(IngestError::Cancelled.into());
        }
        write_graph(store, &graph).await?;
        Ok(graph)
    }

    #[instrument(skip_all, name = "parse", fields(files = files.len()))]
    async fn parse_files(
        &self,
        files: Vec<SourceFile>,
        cancel: Arc<AtomicBool>,
        progress: Arc<dyn ProgressReporter>,
    ) -> crate::error::Result<Vec<ParsedFile>> {
        let registry = Arc::clone(&self.registry);
        let limits = self.limits;
        let threads = self.config.parse.threads;
        let start = Instant::now();

        progress.parse_started(files.len() as u64);
        let parsed = tokio::task::spawn_blocking(move || {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .stack_size(PARSE_STACK_BYTES)
                .build()
                .map_err(|e| IngestError::Worker(e.to_string()))?;
            let parsed: Vec<ParsedFile> = pool.install(|| {
                files
                    .par_iter()
                    .map(|file| {
                        let result = registry.parse(file, &limits, &cancel);
                        debug!(path = %file.path, status = ?result.status, "Parsed file");
                        progress.file_parsed(&file.path, result.is_ok());
                        result
                    })
                    .collect()
            });
            progress.parse_finished();
            Ok::<_, IngestError>(parsed)
        })
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))??;

        info!(
            files = parsed.len(),
            failed = parsed.iter().filter(|p| !p.is_ok()).count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Parse phase complete"
        );
        Ok(parsed)
    }
}

/// Store Writer: the only path into the store. Validates first and writes
/// nothing when the graph is inconsistent.
pub async fn write_graph(store: &dyn GraphStore, graph: &RepositoryGraph) -> crate::error::Result<()> {
    validate(graph)?;
    store.replace_graph(graph).await?;
    debug!(repository = %graph.repository, nodes = graph.nodes.len(), "Graph stored");
    Ok(())
}

fn record_outcomes(parsed: &[ParsedFile], handle: &JobHandle) {
    handle.update(|job| {
        for file in parsed {
            let message = file.error.clone().unwrap_or_default();
            match file.status {
                ParseStatus::Ok => {
                    job.files_parsed += 1;
                    for diagnostic in &file.diagnostics {
                        job.record_error(
                            &file.path,
                            JobErrorKind::UnsupportedConstruct,
                            format!("line {}: {}", diagnostic.line, diagnostic.message),
                        );
                    }
                }
                ParseStatus::ParseError => {
                    warn!(path = %file.path, %message, "Skipping unparsable file");
                    job.record_error(&file.path, JobErrorKind::FileParseError, message);
                }
                ParseStatus::Unsupported => {
                    warn!(path = %file.path, %message, "Skipping file without adapter");
                    job.record_error(&file.path, JobErrorKind::UnsupportedLanguage, message);
                }
            }
        }
    });
}

/// Mark the job failed and hand the error back.
fn fail_job(handle: &JobHandle, err: RepographError) -> RepographError {
    let message = match &err {
        RepographError::Ingest(inner) => inner.to_string(),
        other => other.to_string(),
    };
    warn!(error = %message, "Ingest failed");
    if let Err(transition) = handle.update(|job| job.fail(message)) {
        warn!(error = %transition, "Job already finished");
    }
    err
}
