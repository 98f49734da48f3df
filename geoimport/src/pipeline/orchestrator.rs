//! Orchestration d'un import : Source → Window → Batcher → Sink
//!
//! Les batches sont écrits en concurrence bornée. Un batch en échec est mis de
//! côté, puis ses lignes sont réessayées une à une, séquentiellement, une fois
//! le sink drainé (passe de réconciliation). Seule une erreur de source fait
//! échouer le run.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::batcher::Batcher;
use super::sink::{panic_message, BoundedSink, SinkHandler};
use super::types::{Batch, EndReason, ImportOutcome, ProcessResult, RowFailure};
use super::window::{Admission, Window};
use super::writer::RowWriter;
use crate::config::{ImportOptions, ImportRequest};
use crate::error::ImportError;
use crate::source::{FeatureSource, SourceError};

/// Exécute un import et retourne les compteurs
///
/// # Errors
///
/// `ImportError::InvalidRequest` si la requête est hors contrat,
/// `ImportError::Source` si la source échoue (aucun résultat partiel),
/// `ImportError::Finalize` si le callback final échoue.
pub async fn run_import<S, W>(
    source: &mut S,
    writer: Arc<W>,
    request: &ImportRequest,
    options: &ImportOptions,
) -> Result<ProcessResult, ImportError>
where
    S: FeatureSource,
    W: RowWriter<S::Item>,
{
    run_import_detailed(source, writer, request, options)
        .await
        .map(|outcome| outcome.result)
}

/// Comme [`run_import`], avec le détail des lignes en échec
pub async fn run_import_detailed<S, W>(
    source: &mut S,
    writer: Arc<W>,
    request: &ImportRequest,
    options: &ImportOptions,
) -> Result<ImportOutcome<S::Item>, ImportError>
where
    S: FeatureSource,
    W: RowWriter<S::Item>,
{
    request.validate()?;
    options.validate()?;

    let started_at = Instant::now();
    info!(
        offset = request.row_offset,
        limit = ?request.row_limit,
        batch_size = request.batch_size,
        max_concurrency = options.max_concurrency,
        "Starting import"
    );

    let handler = Arc::new(RunHandler::new(Arc::clone(&writer)));
    let mut window = Window::new(request.row_offset, request.row_limit);
    let mut batcher = Batcher::new(request.batch_size);
    let mut sink = BoundedSink::new(options.max_concurrency, Arc::clone(&handler))?;

    let end_reason = match feed(source, &mut window, &mut batcher, &mut sink).await {
        Ok(reason) => reason,
        Err(e) => {
            error!(
                error = %e,
                passed = window.passed(),
                in_flight = sink.in_flight(),
                "Source failed, aborting import"
            );
            sink.abort().await;
            return Err(ImportError::Source(e));
        }
    };

    // Fin naturelle et limite atteinte convergent ici vers une seule fermeture
    if end_reason == EndReason::LimitReached {
        debug!(passed = window.passed(), "Limit reached, closing source");
        source.close().await;
    }
    if let Some(batch) = batcher.flush() {
        sink.push(batch).await;
    }
    sink.close().await;

    writer.finalize().await.map_err(ImportError::Finalize)?;

    let result = handler.result();
    let failures = handler.take_failures();
    let failed_batches = handler.failed_batch_count();

    info!(
        saved = result.saved_row_count,
        failed = result.failed_row_count,
        passed = window.passed(),
        skipped = window.skipped(),
        batches = batcher.batches_emitted(),
        failed_batches = failed_batches,
        end = ?end_reason,
        duration = ?started_at.elapsed(),
        "Import complete"
    );

    Ok(ImportOutcome {
        result,
        failures,
        failed_batches,
        end_reason,
    })
}

/// Boucle producteur : lit, filtre, groupe et pousse dans le sink
async fn feed<S, H>(
    source: &mut S,
    window: &mut Window,
    batcher: &mut Batcher<S::Item>,
    sink: &mut BoundedSink<Batch<S::Item>, H>,
) -> Result<EndReason, SourceError>
where
    S: FeatureSource,
    H: SinkHandler<Batch<S::Item>>,
{
    loop {
        let Some(item) = source.next().await? else {
            return Ok(EndReason::Exhausted);
        };

        match window.admit() {
            Admission::Skip => continue,
            Admission::Limited => return Ok(EndReason::LimitReached),
            Admission::Pass => {
                if let Some(batch) = batcher.push(item) {
                    sink.push(batch).await;
                }
                if window.is_exhausted() {
                    return Ok(EndReason::LimitReached);
                }
            }
        }
    }
}

/// État d'un run, partagé par les écritures concurrentes
struct RunHandler<R, W> {
    writer: Arc<W>,
    saved: AtomicU64,
    failed: AtomicU64,
    failed_batch_count: AtomicUsize,
    failed_batches: Mutex<Vec<Batch<R>>>,
    failures: Mutex<Vec<RowFailure<R>>>,
}

impl<R, W> RunHandler<R, W>
where
    R: Send + Sync + 'static,
    W: RowWriter<R>,
{
    fn new(writer: Arc<W>) -> Self {
        Self {
            writer,
            saved: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failed_batch_count: AtomicUsize::new(0),
            failed_batches: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn result(&self) -> ProcessResult {
        ProcessResult {
            saved_row_count: self.saved.load(Ordering::SeqCst),
            failed_row_count: self.failed.load(Ordering::SeqCst),
        }
    }

    fn failed_batch_count(&self) -> usize {
        self.failed_batch_count.load(Ordering::SeqCst)
    }

    fn take_failures(&self) -> Vec<RowFailure<R>> {
        std::mem::take(&mut *self.failures.lock())
    }

    /// Réessaie ligne à ligne, séquentiellement, chaque batch en échec
    async fn reconcile(&self) {
        let batches = std::mem::take(&mut *self.failed_batches.lock());
        if batches.is_empty() {
            return;
        }

        let rows: usize = batches.iter().map(Batch::len).sum();
        info!(batches = batches.len(), rows, "Retrying failed batches row by row");

        let mut recovered = 0u64;
        for batch in batches {
            let batch_id = batch.id;
            for (position, row) in batch.rows.into_iter().enumerate() {
                // Un panic du writer ne compte que pour la ligne en cours
                let write = self.writer.write_rows(std::slice::from_ref(&row));
                let written = match AssertUnwindSafe(write).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(anyhow!("writer panicked: {}", panic_message(&panic))),
                };
                match written {
                    Ok(()) => {
                        self.saved.fetch_add(1, Ordering::SeqCst);
                        recovered += 1;
                    }
                    Err(error) => {
                        self.failed.fetch_add(1, Ordering::SeqCst);
                        let message = format!("{error:#}");
                        warn!(
                            batch = %batch_id,
                            position,
                            error = %message,
                            "Row write failed after retry"
                        );
                        self.failures.lock().push(RowFailure {
                            batch_id,
                            position,
                            row,
                            error,
                        });
                    }
                }
            }
        }

        info!(
            recovered,
            failed = self.failed.load(Ordering::SeqCst),
            "Reconciliation complete"
        );
    }
}

#[async_trait]
impl<R, W> SinkHandler<Batch<R>> for RunHandler<R, W>
where
    R: Send + Sync + 'static,
    W: RowWriter<R>,
{
    async fn handle(&self, batch: &Batch<R>) -> anyhow::Result<()> {
        self.writer.write_rows(&batch.rows).await?;
        self.saved.fetch_add(batch.len() as u64, Ordering::SeqCst);
        debug!(batch = %batch.id, rows = batch.len(), "Batch saved");
        Ok(())
    }

    fn handle_error(&self, error: anyhow::Error, batch: Batch<R>) {
        let message = format!("{error:#}");
        warn!(
            batch = %batch.id,
            rows = batch.len(),
            error = %message,
            "Batch write failed, rows will be retried individually"
        );
        self.failed_batch_count.fetch_add(1, Ordering::SeqCst);
        self.failed_batches.lock().push(batch);
    }

    async fn finish(&self) {
        self.reconcile().await;
    }
}
