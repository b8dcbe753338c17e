//! SQLite-backed usage store.
//!
//! One writable connection, owned by a dedicated worker thread. Callers hand
//! the worker a closure over a channel and await the reply on a oneshot,
//! which serializes every read-modify-write sequence through a single writer
//! without holding an async lock across SQL.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod migrations;
pub mod usage;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMessage {
    Run(Job),
    Quit,
}

/// Handle to the store. Cloning shares the same worker; the thread exits
/// once the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
    path: Arc<PathBuf>,
}

struct Shared {
    jobs: mpsc::Sender<WorkerMessage>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(handle) = handle else { return };
        if self.jobs.send(WorkerMessage::Quit).is_err() {
            error!("database worker already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("database worker panicked");
        }
    }
}

impl Database {
    /// Open (or create) the store at `path`, enable WAL, and bring the
    /// schema up to date before returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs, inbox) = mpsc::channel::<WorkerMessage>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let worker_path = path.clone();

        let worker = thread::Builder::new()
            .name("homedock-db".into())
            .spawn(move || worker_loop(worker_path, inbox, ready_tx))
            .context("failed to spawn database worker thread")?;

        // Surface open/migration failures to the caller instead of leaving
        // a handle to a dead thread.
        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("usage store ready at {}", path.display());

        Ok(Self {
            shared: Arc::new(Shared {
                jobs,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Run a closure against the connection on the worker thread and await
    /// its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = WorkerMessage::Run(Box::new(move |conn| {
            if reply_tx.send(job(conn)).is_err() {
                error!("store caller dropped before the result arrived");
            }
        }));

        self.shared
            .jobs
            .send(message)
            .map_err(|_| anyhow!("database worker is not accepting jobs"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker terminated mid-job"))?
    }
}

fn worker_loop(
    path: PathBuf,
    inbox: mpsc::Receiver<WorkerMessage>,
    ready: mpsc::Sender<Result<()>>,
) {
    let init = (|| -> Result<Connection> {
        let mut conn = Connection::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL mode")?;
        migrations::run_migrations(&mut conn).context("failed to run schema migrations")?;
        Ok(conn)
    })();

    let mut conn = match init {
        Ok(conn) => {
            if ready.send(Ok(())).is_err() {
                return;
            }
            conn
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while let Ok(message) = inbox.recv() {
        match message {
            WorkerMessage::Run(job) => job(&mut conn),
            WorkerMessage::Quit => break,
        }
    }

    info!("usage store worker shutting down");
}
