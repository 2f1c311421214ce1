//! `pdfidx scan` — diff every committed source against its last snapshot,
//! then drain the resulting event log through the worker pool into the
//! dual index.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use pdfidx_coordinator::{IndexCoordinator, PoolResultState, ProgressBus, ProgressEvent, TasksPool, spawn_heartbeat};
use pdfidx_state::scanner::Scanner;
use pdfidx_vector::EmbeddingProvider;

use crate::signal::CancelHandle;
use crate::workspace::Workspace;

/// Events are fetched off the log in batches this large at a time so a
/// long-running scan doesn't hold the whole backlog in memory.
const FETCH_BATCH: usize = 256;

/// Per-worker resources. Each worker opens its own connection to every
/// database it touches — the scanner DB (to close events), the coordinator
/// DB, the page-store DB, the lexical DB, and the vector DB — and keeps
/// them for the life of the thread; nothing here is ever shared with
/// another worker.
struct WorkerResources {
    scanner: Scanner,
    coordinator: IndexCoordinator,
    embedder: std::sync::Mutex<Box<dyn EmbeddingProvider + Send>>,
}

pub fn run(workspace: &Workspace, cancel: &CancelHandle) -> anyhow::Result<()> {
    let scanner = workspace.open_scanner()?;

    info!("scanning committed sources");
    scanner.scan_with_cancel(&|| cancel.is_cancelled())?;

    let scope_roots: HashMap<String, PathBuf> = scanner.list_scopes()?.into_iter().collect();

    let progress = Arc::new(ProgressBus::new());
    let heartbeat = spawn_heartbeat(progress.clone());
    progress.publish(ProgressEvent::Scanning);

    let worker_count = workspace.config.worker.count.max(1);
    let pool = build_pool(worker_count, workspace, scope_roots, progress.clone());

    let mut processed = 0usize;
    'drain: loop {
        if cancel.is_cancelled() {
            progress.publish(ProgressEvent::Interrupting);
            break;
        }
        let batch = scanner.next_events(FETCH_BATCH)?;
        if batch.is_empty() {
            break;
        }
        for event in batch {
            processed += 1;
            if !pool.push(event) {
                // Pool stopped accepting work (interrupted or a worker
                // raised); no point fetching further batches.
                break 'drain;
            }
        }
    }

    let state = pool.complete();
    drop(heartbeat);

    match state {
        PoolResultState::Success => {
            progress.publish(ProgressEvent::Completed);
            info!(processed, "scan complete");
        }
        PoolResultState::Interrupted => {
            progress.publish(ProgressEvent::Interrupted);
            warn!(processed, "scan interrupted");
        }
        PoolResultState::RaisedException => {
            progress.publish(ProgressEvent::Failure { message: "a worker failed; see logs".into() });
            anyhow::bail!("scan aborted: a worker raised an error");
        }
    }

    Ok(())
}

/// Builds a pool whose workers each open their own `Scanner`/
/// `IndexCoordinator`/embedder on `on_init`, so that the concurrent
/// parse/embed work the pool exists for never contends on a single
/// connection; `process_event`'s own per-PDF transaction on the `files`
/// table is what keeps two workers from racing on the same path.
fn build_pool(
    worker_count: usize,
    workspace: &Workspace,
    scope_roots: HashMap<String, PathBuf>,
    progress: Arc<ProgressBus>,
) -> TasksPool<pdfidx_core::types::Event> {
    let scanner_db = workspace.scanner_db();
    let page_cache_db = workspace.page_cache_db();
    let page_files_dir = workspace.page_files_dir();
    let lexical_db = workspace.lexical_db();
    let vector_db_dir = workspace.vector_db_dir();
    let coordinator_db = workspace.coordinator_db();
    let dimensions = workspace.config.embedding.dimensions;
    let metric = workspace.config.embedding.distance_metric_typed();
    let model_id = workspace.config.embedding.model_id.clone();

    TasksPool::start(
        worker_count,
        move |index| {
            let scanner = Scanner::open(&scanner_db).expect("worker failed to open its scanner connection");
            let coordinator = IndexCoordinator::open(
                &coordinator_db,
                &page_cache_db,
                &page_files_dir,
                &lexical_db,
                &vector_db_dir,
                dimensions,
                metric,
            )
            .expect("worker failed to open its coordinator connection");
            let embedder = std::sync::Mutex::new(Box::new(pdfidx_vector::DeterministicEmbeddingProvider::new(
                model_id.clone(),
                dimensions,
            )) as Box<dyn EmbeddingProvider + Send>);
            debug!(worker = index, "opened per-worker database connections");
            WorkerResources { scanner, coordinator, embedder }
        },
        move |resources, event, _worker| {
            let Some(root) = scope_roots.get(&event.scope) else {
                return Err(format!("event references unknown scope {}", event.scope));
            };
            progress.publish(ProgressEvent::StartHandlingFile {
                path: event.relative_path.clone(),
                op: event.kind.as_str().to_string(),
            });

            resources
                .coordinator
                .process_event(&event, root, &resources.embedder, &|| pdfidx_coordinator::check_cancel())
                .map_err(|e| e.to_string())?;

            resources.scanner.close_event(event.id).map_err(|e| e.to_string())?;
            progress.publish(ProgressEvent::CompleteHandlingFile { path: event.relative_path.clone() });
            Ok(())
        },
        |resources, index| {
            drop(resources);
            debug!(worker = index, "closed per-worker database connections");
        },
    )
}
