// SPDX-License-Identifier: MIT OR Apache-2.0
//! The asynchronous import pipeline.
//!
//! Four worker roles connected by bounded channels turn an index request
//! into an applied query-database update:
//!
//!   [IndexRequest] -> parse workers -> [DoIdMap] -> id-map workers
//!        -> [OnIdMapped] -> merge workers -> [OnIndexed] -> apply worker
//!
//! Parse workers fan out (80% of hardware threads by default); the apply
//! worker is deliberately single so every database mutation is serialized.
//! Each stage prefers interactive items (the file currently open in the
//! editor) over batch items when popping. Channel disconnection cascades
//! shutdown through the stages, in submission order.

use crate::cache;
use crate::config::IndexerConfig;
use crate::error::Result;
use crate::file_consumer::FileConsumerSharedState;
use crate::frontend::{ParseFrontEnd, ParseRequest};
use crate::index_file::IndexFile;
use crate::indexer;
use crate::perf::{self, PerformanceImportFile};
use crate::query::{IdMap, IndexUpdate, QueryDatabase, UsrTables};
use crate::uri::NormalizedPath;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// One request to (re)index a file.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub path: String,
    pub args: Vec<String>,
    /// The editor is looking at this file right now; jump the queues.
    pub is_interactive: bool,
    /// Unsaved buffer contents, if the editor has them.
    pub contents: Option<String>,
}

struct DoIdMapRequest {
    current: IndexFile,
    perf: PerformanceImportFile,
    is_interactive: bool,
    write_to_disk: bool,
}

struct OnIdMappedRequest {
    current: (IdMap, IndexFile),
    previous: Option<(IdMap, IndexFile)>,
    perf: PerformanceImportFile,
    is_interactive: bool,
    write_to_disk: bool,
}

struct OnIndexedRequest {
    update: IndexUpdate,
    perf: PerformanceImportFile,
}

/// A bounded channel pair with an interactive fast lane. Pop prefers the
/// interactive lane whenever it has an item ready.
fn stage_channel<T>(capacity: usize) -> (StageSender<T>, StageReceiver<T>) {
    let (interactive_tx, interactive_rx) = bounded(capacity);
    let (batch_tx, batch_rx) = bounded(capacity);
    (
        StageSender {
            interactive: interactive_tx,
            batch: batch_tx,
        },
        StageReceiver {
            interactive: interactive_rx,
            batch: batch_rx,
        },
    )
}

pub struct StageSender<T> {
    interactive: Sender<T>,
    batch: Sender<T>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            interactive: self.interactive.clone(),
            batch: self.batch.clone(),
        }
    }
}

impl<T> StageSender<T> {
    /// Blocks while the stage's queue is full (backpressure).
    fn send(&self, item: T, is_interactive: bool) -> bool {
        if is_interactive {
            self.interactive.send(item).is_ok()
        } else {
            self.batch.send(item).is_ok()
        }
    }
}

pub struct StageReceiver<T> {
    interactive: Receiver<T>,
    batch: Receiver<T>,
}

impl<T> Clone for StageReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            interactive: self.interactive.clone(),
            batch: self.batch.clone(),
        }
    }
}

impl<T> StageReceiver<T> {
    /// Block for the next item, interactive lane first. `None` once both
    /// lanes are closed and drained.
    fn pop(&self) -> Option<T> {
        loop {
            match self.interactive.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Disconnected) => return self.batch.recv().ok(),
                Err(TryRecvError::Empty) => {}
            }
            match self.batch.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Disconnected) => return self.interactive.recv().ok(),
                Err(TryRecvError::Empty) => {}
            }

            crossbeam_channel::select! {
                recv(self.interactive) -> item => {
                    if let Ok(item) = item {
                        return Some(item);
                    }
                    // Disconnected: the next loop iteration falls back to
                    // blocking on the surviving lane.
                }
                recv(self.batch) -> item => {
                    if let Ok(item) = item {
                        return Some(item);
                    }
                }
            }
        }
    }
}

/// Counters exposed for logging and the status endpoint.
#[derive(Default)]
pub struct PipelineStats {
    pub parsed_files: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub emitted_indexes: AtomicUsize,
    pub applied_updates: AtomicUsize,
    pub dropped_requests: AtomicUsize,
}

/// Handle to a running pipeline. `shutdown` closes the request queue and
/// joins every worker.
pub struct ImportPipeline {
    request_tx: Option<StageSender<IndexRequest>>,
    threads: Vec<thread::JoinHandle<()>>,
    pub db: Arc<RwLock<QueryDatabase>>,
    pub usr_tables: Arc<UsrTables>,
    pub file_consumer_shared: Arc<FileConsumerSharedState>,
    pub stats: Arc<PipelineStats>,
    applied_version: Arc<(Mutex<u64>, Condvar)>,
}

impl ImportPipeline {
    pub fn start(config: IndexerConfig, front_end: Arc<dyn ParseFrontEnd>) -> Self {
        let db = Arc::new(RwLock::new(QueryDatabase::default()));
        let usr_tables = Arc::new(UsrTables::default());
        let file_consumer_shared = FileConsumerSharedState::new();
        let stats = Arc::new(PipelineStats::default());
        let applied_version = Arc::new((Mutex::new(0u64), Condvar::new()));
        let config = Arc::new(config);

        let parse_workers = config.index_threads.max(1);
        tracing::info!(
            "starting import pipeline: {} parse workers, cache {}",
            parse_workers,
            config
                .cache_directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "disabled".to_string())
        );

        let (request_tx, request_rx) = stage_channel::<IndexRequest>(parse_workers * 8);
        let (do_id_map_tx, do_id_map_rx) = stage_channel::<DoIdMapRequest>(parse_workers * 4);
        let (on_id_mapped_tx, on_id_mapped_rx) = stage_channel::<OnIdMappedRequest>(64);
        let (on_indexed_tx, on_indexed_rx) = stage_channel::<OnIndexedRequest>(64);

        let mut threads = Vec::new();

        // Stage 1: parse workers.
        for worker_id in 0..parse_workers {
            let request_rx = request_rx.clone();
            let do_id_map_tx = do_id_map_tx.clone();
            let config = config.clone();
            let front_end = front_end.clone();
            let file_consumer_shared = file_consumer_shared.clone();
            let stats = stats.clone();

            threads.push(
                thread::Builder::new()
                    .name(format!("indexer-{worker_id}"))
                    .spawn(move || {
                        parse_worker_main(
                            &request_rx,
                            &do_id_map_tx,
                            &config,
                            front_end.as_ref(),
                            &file_consumer_shared,
                            &stats,
                        );
                        tracing::debug!("parse worker {} exiting", worker_id);
                    })
                    .expect("failed to spawn parse worker"),
            );
        }
        drop(do_id_map_tx);

        // Stage 2: id-map worker. Touches only the USR tables' lock.
        {
            let do_id_map_rx = do_id_map_rx.clone();
            let on_id_mapped_tx = on_id_mapped_tx.clone();
            let usr_tables = usr_tables.clone();
            let config = config.clone();

            threads.push(
                thread::Builder::new()
                    .name("id-map".to_string())
                    .spawn(move || {
                        id_map_worker_main(&do_id_map_rx, &on_id_mapped_tx, &usr_tables, &config);
                    })
                    .expect("failed to spawn id-map worker"),
            );
        }
        drop(on_id_mapped_tx);

        // Stage 3: merge worker. Computes deltas and writes cache
        // artifacts; still no database lock.
        {
            let on_id_mapped_rx = on_id_mapped_rx.clone();
            let on_indexed_tx = on_indexed_tx.clone();
            let config = config.clone();

            threads.push(
                thread::Builder::new()
                    .name("merge".to_string())
                    .spawn(move || {
                        merge_worker_main(&on_id_mapped_rx, &on_indexed_tx, &config);
                    })
                    .expect("failed to spawn merge worker"),
            );
        }
        drop(on_indexed_tx);

        // Stage 4: the single apply worker; the only writer the database
        // ever sees.
        {
            let on_indexed_rx = on_indexed_rx.clone();
            let db = db.clone();
            let usr_tables = usr_tables.clone();
            let stats = stats.clone();
            let applied_version = applied_version.clone();

            threads.push(
                thread::Builder::new()
                    .name("querydb-apply".to_string())
                    .spawn(move || {
                        apply_worker_main(&on_indexed_rx, &db, &usr_tables, &stats, &applied_version);
                    })
                    .expect("failed to spawn apply worker"),
            );
        }

        Self {
            request_tx: Some(request_tx),
            threads,
            db,
            usr_tables,
            file_consumer_shared,
            stats,
            applied_version,
        }
    }

    /// Enqueue a request; blocks when the request queue is full.
    pub fn submit(&self, request: IndexRequest) {
        let is_interactive = request.is_interactive;
        if let Some(tx) = &self.request_tx {
            if !tx.send(request, is_interactive) {
                tracing::error!("import pipeline is shut down; request dropped");
            }
        }
    }

    /// Number of updates applied so far.
    pub fn applied_count(&self) -> u64 {
        *self.applied_version.0.lock().unwrap()
    }

    /// Park until at least `count` updates have been applied. Returns
    /// false on timeout.
    pub fn wait_for_applied(&self, count: u64, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.applied_version;
        let deadline = Instant::now() + timeout;
        let mut applied = lock.lock().unwrap();
        while *applied < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, result) = condvar.wait_timeout(applied, remaining).unwrap();
            applied = guard;
            if result.timed_out() && *applied < count {
                return false;
            }
        }
        true
    }

    /// Close the request queue and join every stage, in order.
    pub fn shutdown(mut self) {
        self.request_tx = None;
        for handle in self.threads.drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("pipeline worker panicked: {:?}", e);
            }
        }
    }
}

fn parse_worker_main(
    request_rx: &StageReceiver<IndexRequest>,
    do_id_map_tx: &StageSender<DoIdMapRequest>,
    config: &IndexerConfig,
    front_end: &dyn ParseFrontEnd,
    file_consumer_shared: &Arc<FileConsumerSharedState>,
    stats: &PipelineStats,
) {
    while let Some(request) = request_rx.pop() {
        if !config.enable_indexing {
            stats.dropped_requests.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let path = NormalizedPath::new(&request.path).into_string();
        let mut perf = PerformanceImportFile::default();

        // Fast path: a valid on-disk artifact replaces the parse entirely.
        if config.enable_cache_read && request.contents.is_none() {
            if let Some(cache_dir) = &config.cache_directory {
                let load_start = Instant::now();
                if let Some(index) = cache::try_load_valid(cache_dir, &path, &request.args) {
                    perf.cache_load_us = load_start.elapsed().as_micros() as u64;
                    stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    stats.emitted_indexes.fetch_add(1, Ordering::Relaxed);
                    do_id_map_tx.send(
                        DoIdMapRequest {
                            current: index,
                            perf,
                            is_interactive: request.is_interactive,
                            write_to_disk: false,
                        },
                        request.is_interactive,
                    );
                    continue;
                }
            }
        }

        // Reclaim ownership of the file for this round; headers it pulled
        // in keep their existing owners.
        file_consumer_shared.reset(&path);

        let parse_request = ParseRequest {
            path: path.clone(),
            args: request.args.clone(),
            unsaved: request
                .contents
                .as_ref()
                .map(|contents| vec![(path.clone(), contents.clone())])
                .unwrap_or_default(),
        };

        let parse_start = Instant::now();
        let indexes =
            indexer::parse_and_index(front_end, file_consumer_shared, &parse_request, &mut perf);
        stats.parsed_files.fetch_add(1, Ordering::Relaxed);

        let parse_time = parse_start.elapsed();
        if parse_time > Duration::from_secs(1) {
            tracing::warn!("slow parse: {} took {:.1}s", path, parse_time.as_secs_f64());
        }

        for index in indexes {
            stats.emitted_indexes.fetch_add(1, Ordering::Relaxed);
            do_id_map_tx.send(
                DoIdMapRequest {
                    current: index,
                    perf,
                    is_interactive: request.is_interactive,
                    write_to_disk: true,
                },
                request.is_interactive,
            );
        }
    }
}

fn id_map_worker_main(
    do_id_map_rx: &StageReceiver<DoIdMapRequest>,
    on_id_mapped_tx: &StageSender<OnIdMappedRequest>,
    usr_tables: &UsrTables,
    config: &IndexerConfig,
) {
    while let Some(mut request) = do_id_map_rx.pop() {
        let start = Instant::now();

        // The previous version of this file (what the database currently
        // holds) comes from the cache; its id map is built the same way so
        // the merge can compute removals.
        let previous = config
            .cache_directory
            .as_ref()
            .filter(|_| config.enable_cache_read && request.write_to_disk)
            .and_then(|cache_dir| cache::try_load_previous(cache_dir, &request.current.path))
            .map(|index| (IdMap::build(usr_tables, &index), index));

        let current_map = IdMap::build(usr_tables, &request.current);
        request.perf.querydb_id_map_us = start.elapsed().as_micros() as u64;

        on_id_mapped_tx.send(
            OnIdMappedRequest {
                current: (current_map, request.current),
                previous,
                perf: request.perf,
                is_interactive: request.is_interactive,
                write_to_disk: request.write_to_disk,
            },
            request.is_interactive,
        );
    }
}

fn merge_worker_main(
    on_id_mapped_rx: &StageReceiver<OnIdMappedRequest>,
    on_indexed_tx: &StageSender<OnIndexedRequest>,
    config: &IndexerConfig,
) {
    while let Some(request) = on_id_mapped_rx.pop() {
        let (current_map, current_index) = &request.current;
        let update = IndexUpdate::create(
            request.previous.as_ref().map(|(map, index)| (map, index)),
            (current_map, current_index),
        );

        if request.write_to_disk && config.enable_cache_write {
            if let Some(cache_dir) = &config.cache_directory {
                if let Err(e) = cache::write_artifact(cache_dir, current_index) {
                    tracing::warn!(
                        "failed to write cache artifact for {}: {}",
                        current_index.path,
                        e
                    );
                }
            }
        }

        on_indexed_tx.send(
            OnIndexedRequest {
                update,
                perf: request.perf,
            },
            request.is_interactive,
        );
    }
}

fn apply_worker_main(
    on_indexed_rx: &StageReceiver<OnIndexedRequest>,
    db: &RwLock<QueryDatabase>,
    usr_tables: &UsrTables,
    stats: &PipelineStats,
    applied_version: &(Mutex<u64>, Condvar),
) {
    while let Some(mut request) = on_indexed_rx.pop() {
        let start = Instant::now();
        {
            let mut db = db.write().unwrap();
            db.apply_index_update(usr_tables, request.update);
        }
        request.perf.querydb_apply_us = start.elapsed().as_micros() as u64;

        if perf::is_performance_monitoring_enabled() {
            if let Ok(mut perf_stats) = perf::PERF_STATS.lock() {
                perf_stats.record_import(&request.perf);
            }
        }

        stats.applied_updates.fetch_add(1, Ordering::Relaxed);
        let (lock, condvar) = applied_version;
        *lock.lock().unwrap() += 1;
        condvar.notify_all();
    }
}

/// Feed messages from the IPC queue into the pipeline. Returns the number
/// of requests enqueued.
pub fn pump_ipc_messages(
    pipeline: &ImportPipeline,
    queue: &crate::ipc::IpcMessageQueue,
) -> Result<usize> {
    let mut enqueued = 0;
    for message in queue.drain()? {
        match message {
            crate::ipc::IpcMessage::IsAlive => {}
            crate::ipc::IpcMessage::ImportIndex { path } => {
                pipeline.submit(IndexRequest {
                    path,
                    args: Vec::new(),
                    is_interactive: false,
                    contents: None,
                });
                enqueued += 1;
            }
            crate::ipc::IpcMessage::CreateIndex { path, args } => {
                pipeline.submit(IndexRequest {
                    path,
                    args,
                    is_interactive: false,
                    contents: None,
                });
                enqueued += 1;
            }
        }
    }
    Ok(enqueued)
}
