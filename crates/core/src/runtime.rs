//! Runtime plumbing: cooperative I/O contexts and the blocking worker pool.
//!
//! Two schedulers cooperate. RPC framing, transactions and cursor traffic
//! run as tasks on single-threaded I/O contexts; EVM execution occupies a
//! worker thread for its whole synchronous body and blocks on state reads
//! posted back to the owning context.

use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use tokio::{runtime::Handle, sync::oneshot};
use tracing::error;

/// A fixed set of single-threaded I/O contexts.
///
/// Each context is one OS thread driving one current-thread runtime.
/// Handles are dealt round-robin so connections spread across contexts.
#[derive(Debug)]
pub struct ContextPool {
    contexts: Vec<IoContext>,
    next: AtomicUsize,
}

#[derive(Debug)]
struct IoContext {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ContextPool {
    /// Spawns `contexts` I/O context threads; at least one is always
    /// created.
    pub fn new(contexts: usize) -> io::Result<Self> {
        let mut pool = Vec::with_capacity(contexts.max(1));
        for index in 0..contexts.max(1) {
            pool.push(IoContext::spawn(index)?);
        }
        Ok(Self { contexts: pool, next: AtomicUsize::new(0) })
    }

    /// The next context handle, round-robin.
    pub fn handle(&self) -> Handle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        self.contexts[index].handle.clone()
    }

    /// Number of contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the pool has no contexts; never true for a built pool.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl IoContext {
    fn spawn(index: usize) -> io::Result<Self> {
        let (shutdown, on_shutdown) = oneshot::channel::<()>();
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let thread = thread::Builder::new().name(format!("remora-io-{index}")).spawn(move || {
            let runtime =
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = handle_tx.send(Err(err));
                        return;
                    }
                };
            let _ = handle_tx.send(Ok(runtime.handle().clone()));
            // Parks until the pool drops the shutdown sender, driving every
            // task spawned onto this context in the meantime.
            runtime.block_on(async {
                let _ = on_shutdown.await;
            });
        })?;
        let handle = match handle_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "io context thread died during startup",
                ))
            }
        };
        Ok(Self { handle, shutdown: Some(shutdown), thread: Some(thread) })
    }
}

impl Drop for ContextPool {
    fn drop(&mut self) {
        for context in &mut self.contexts {
            context.shutdown.take();
            if let Some(thread) = context.thread.take() {
                if thread.join().is_err() {
                    error!(target: "rpc::eth", "io context thread panicked");
                }
            }
        }
    }
}

/// Fixed-size pool hosting the synchronous EVM work.
///
/// Jobs run FIFO; the returned receiver resolves once the worker finishes.
/// Dropping the receiver does not cancel the job, its result is simply
/// discarded.
#[derive(Clone, Debug)]
pub struct BlockingTaskPool {
    pool: Arc<rayon::ThreadPool>,
}

impl BlockingTaskPool {
    /// Builds a pool of `workers` threads; at least one is always created.
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("remora-worker-{index}"))
            .build()?;
        Ok(Self { pool: Arc::new(pool) })
    }

    /// Runs `func` on a worker, delivering its result over a oneshot.
    pub fn spawn<F, T>(&self, func: F) -> oneshot::Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.pool.spawn_fifo(move || {
            let _ = result_tx.send(func());
        });
        result_rx
    }
}
