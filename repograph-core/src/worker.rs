//! Background ingest workers, one tokio task per job.

use std::path::PathBuf;
use std::sync::Arc;

use repograph_graphs::RepositoryGraph;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

use crate::error::IngestError;
use crate::job::JobHandle;
use crate::pipeline::IngestPipeline;
use crate::progress::ProgressReporter;
use crate::store::GraphStore;

/// A running ingest job.
#[derive(Debug)]
pub struct IngestTask {
    pub handle: JobHandle,
    join: JoinHandle<crate::error::Result<RepositoryGraph>>,
}

impl IngestTask {
    /// Wait for the worker to finish. The job record on `handle` is final
    /// once this returns.
    pub async fn wait(self) -> crate::error::Result<RepositoryGraph> {
        self.join
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))?
    }
}

/// Start ingesting `root` as `repository` on its own task.
///
/// Jobs share the pipeline and store but nothing else; each builds its
/// graph from scratch.
pub fn spawn_ingest(
    pipeline: Arc<IngestPipeline>,
    store: Arc<dyn GraphStore>,
    root: PathBuf,
    repository: impl Into<String>,
    progress: Arc<dyn ProgressReporter>,
) -> IngestTask {
    let handle = JobHandle::new(repository);
    let span = info_span!("job", id = %handle.id(), repository = %handle.repository());
    let worker = handle.clone();
    let join = tokio::spawn(
        async move {
            pipeline
                .ingest_directory(&root, store.as_ref(), &worker, progress)
                .await
        }
        .instrument(span),
    );
    IngestTask { handle, join }
}
