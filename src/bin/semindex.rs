// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::Result;
use clap::Parser;
use semindex::perf::PERF_STATS;
use semindex::pipeline::{pump_ipc_messages, ImportPipeline, IndexRequest};
use semindex::{jsonrpc, IndexerConfig, IpcMessageQueue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "semindex")]
#[command(about = "Incremental C/C++/Objective-C indexer daemon", long_about = None)]
struct Args {
    /// Files to index up front (compiler args come from the request
    /// messages in daemon modes)
    paths: Vec<PathBuf>,

    /// Directory for on-disk index artifacts; omit to disable the cache
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Number of indexer threads (default: 80% of hardware threads)
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Attach to the named shared IPC queue and service its messages
    #[arg(long, value_name = "NAME")]
    queue: Option<String>,

    /// Read JSON-RPC index requests from stdin until EOF
    #[arg(long)]
    listen: bool,

    /// Enable performance monitoring and display timing statistics
    #[arg(long)]
    perf: bool,
}

fn build_config(args: &Args) -> IndexerConfig {
    let mut config = IndexerConfig {
        cache_directory: args.cache_dir.clone(),
        ..IndexerConfig::default()
    };
    if let Some(jobs) = args.jobs {
        config.index_threads = jobs.max(1);
    }
    if config.cache_directory.is_none() {
        config.enable_cache_read = false;
        config.enable_cache_write = false;
    }
    config
}

/// Wait until the pipeline stops making progress, then return the number
/// of applied updates.
fn wait_until_settled(pipeline: &ImportPipeline) -> u64 {
    let mut last = pipeline.applied_count();
    loop {
        if pipeline.wait_for_applied(last + 1, Duration::from_millis(500)) {
            last = pipeline.applied_count();
        } else {
            return last;
        }
    }
}

/// Service the stdin JSON-RPC channel. Unknown methods are dropped with a
/// protocol warning; broken framing is fatal because the editor on the
/// other side is gone and nobody will resend.
fn listen_on_stdin(pipeline: &ImportPipeline) {
    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    loop {
        let message = match jsonrpc::read_message(&mut reader) {
            Ok(message) => message,
            Err(e) => {
                error!("stdin framing broken, exiting: {}", e);
                std::process::exit(1);
            }
        };

        match message.method.as_str() {
            "exit" => {
                info!("exit requested over stdin");
                return;
            }
            "semindex/createIndex" => {
                #[derive(serde::Deserialize)]
                struct CreateIndexParams {
                    path: String,
                    #[serde(default)]
                    args: Vec<String>,
                    #[serde(default)]
                    contents: Option<String>,
                }
                match message
                    .params
                    .map(serde_json::from_value::<CreateIndexParams>)
                {
                    Some(Ok(params)) => pipeline.submit(IndexRequest {
                        path: params.path,
                        args: params.args,
                        is_interactive: true,
                        contents: params.contents,
                    }),
                    _ => warn!("semindex/createIndex with unusable params"),
                }
            }
            other => {
                // Protocol error: log and drop, never fatal.
                warn!("unknown method {:?} dropped", other);
            }
        }
    }
}

fn main() -> Result<()> {
    semindex::logging::init_tracing();
    let args = Args::parse();

    if args.perf {
        semindex::perf::enable_performance_monitoring();
    }

    let config = build_config(&args);
    info!(
        "semindex starting: {} threads, cache {:?}",
        config.index_threads, config.cache_directory
    );

    let pipeline = ImportPipeline::start(config.clone(), Arc::new(semindex::frontend::ReplayFrontEnd));

    for path in &args.paths {
        pipeline.submit(IndexRequest {
            path: path.to_string_lossy().to_string(),
            args: Vec::new(),
            is_interactive: false,
            contents: None,
        });
    }

    if let Some(queue_name) = &args.queue {
        info!("servicing ipc queue {:?}", queue_name);
        let queue = IpcMessageQueue::open(queue_name, config.ipc_region_size);
        // The queue loop is infinite; process exit is the only
        // cancellation.
        loop {
            match pump_ipc_messages(&pipeline, &queue) {
                Ok(0) => std::thread::sleep(Duration::from_millis(16)),
                Ok(enqueued) => info!("enqueued {} ipc requests", enqueued),
                Err(e) => {
                    error!("ipc drain failed: {}", e);
                    std::thread::sleep(Duration::from_millis(16));
                }
            }
        }
    }

    if args.listen {
        listen_on_stdin(&pipeline);
    }

    let applied = wait_until_settled(&pipeline);
    let stats = &pipeline.stats;
    info!(
        "indexing settled: {} parsed, {} cache hits, {} indexes emitted, {} updates applied",
        stats
            .parsed_files
            .load(std::sync::atomic::Ordering::Relaxed),
        stats.cache_hits.load(std::sync::atomic::Ordering::Relaxed),
        stats
            .emitted_indexes
            .load(std::sync::atomic::Ordering::Relaxed),
        applied
    );

    pipeline.shutdown();

    if args.perf {
        if let Ok(perf_stats) = PERF_STATS.lock() {
            perf_stats.print_summary();
        }
    }

    Ok(())
}
