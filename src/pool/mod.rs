//! Worker pool
//!
//! A fixed set of browser sessions plus an unbounded job queue. The crawl
//! loop is the sole producer and paces itself via the discovery interval, so
//! the queue needs no backpressure; the number of concurrently executing
//! jobs is bounded by a semaphore sized to the session count, and each job
//! borrows exactly one idle session for its duration.

use crate::crawler::Item;
use crate::driver::SessionDriver;
use crate::fetch::{self, FetchContext};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A pending or in-flight fetch task for one item
#[derive(Debug, Clone)]
pub struct Job {
    pub item: Item,
}

impl Job {
    pub fn new(item: Item) -> Self {
        Self { item }
    }
}

/// Holds worker sessions not currently executing a job
struct SessionBay {
    idle: Mutex<Vec<Arc<dyn SessionDriver>>>,
}

impl SessionBay {
    fn take(&self) -> Option<Arc<dyn SessionDriver>> {
        self.idle.lock().unwrap().pop()
    }

    fn put(&self, session: Arc<dyn SessionDriver>) {
        self.idle.lock().unwrap().push(session);
    }
}

/// Bounded pool of worker sessions executing fetch jobs
pub struct WorkerPool {
    queue: VecDeque<Job>,
    inflight: JoinSet<()>,
    bay: Arc<SessionBay>,
    all_sessions: Vec<Arc<dyn SessionDriver>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    ctx: Arc<FetchContext>,
    /// Ids currently queued or executing; keeps one fetch per item at a time
    tracked: Arc<Mutex<HashSet<String>>>,
    shutting_down: bool,
}

impl WorkerPool {
    /// Creates a pool over the given worker sessions
    ///
    /// `max_concurrent` caps simultaneously executing jobs; zero means one
    /// job per session. The effective capacity never exceeds the session
    /// count.
    pub fn new(
        sessions: Vec<Arc<dyn SessionDriver>>,
        max_concurrent: usize,
        ctx: Arc<FetchContext>,
    ) -> Self {
        let capacity = match max_concurrent {
            0 => sessions.len(),
            n => n.min(sessions.len()),
        };

        Self {
            queue: VecDeque::new(),
            inflight: JoinSet::new(),
            bay: Arc::new(SessionBay {
                idle: Mutex::new(sessions.clone()),
            }),
            all_sessions: sessions,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            ctx,
            tracked: Arc::new(Mutex::new(HashSet::new())),
            shutting_down: false,
        }
    }

    /// Effective concurrency bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of jobs waiting for a session
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// True while the item is queued or executing
    pub fn is_tracked(&self, id: &str) -> bool {
        self.tracked.lock().unwrap().contains(id)
    }

    /// Enqueues a fetch job (non-blocking)
    ///
    /// Returns false when the job was not accepted: the pool is shutting
    /// down, or a job for the same item is already queued or in flight.
    pub fn submit(&mut self, job: Job) -> bool {
        if self.shutting_down {
            tracing::debug!("Pool shutting down, dropping job for {}", job.item.id);
            return false;
        }

        if !self.tracked.lock().unwrap().insert(job.item.id.clone()) {
            return false;
        }

        self.queue.push_back(job);
        true
    }

    /// Assigns queued jobs to idle sessions up to capacity and returns
    /// without waiting for completion
    ///
    /// Completed jobs are reaped on the way in, so each call also clears the
    /// in-flight set of anything already finished.
    pub fn check_and_work(&mut self) {
        self.reap_finished();

        while !self.queue.is_empty() {
            let permit = match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let Some(job) = self.queue.pop_front() else {
                break;
            };

            let bay = self.bay.clone();
            let ctx = self.ctx.clone();
            let tracked = self.tracked.clone();

            self.inflight.spawn(async move {
                let _permit = permit;

                let Some(session) = bay.take() else {
                    // A permit is only issued when a session is idle.
                    tracing::error!("No idle session despite free permit, dropping job");
                    tracked.lock().unwrap().remove(&job.item.id);
                    return;
                };

                let result = fetch::run_job(&*session, &job.item, &ctx).await;
                bay.put(session);
                tracked.lock().unwrap().remove(&job.item.id);

                if let Err(e) = result {
                    tracing::warn!("Fetch job for {} failed: {}", job.item.id, e);
                }
            });
        }
    }

    /// Removes finished jobs from the in-flight set without blocking
    pub fn reap_finished(&mut self) {
        while let Some(joined) = self.inflight.try_join_next() {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!("Fetch task panicked");
                }
            }
        }
    }

    /// True when no job is queued or in flight
    pub fn is_idle(&mut self) -> bool {
        self.reap_finished();
        self.queue.is_empty() && self.inflight.is_empty()
    }

    /// Stops accepting jobs, aborts in-flight fetches, and closes all
    /// worker sessions (best-effort)
    pub async fn shutdown(&mut self) {
        self.shutting_down = true;
        self.queue.clear();
        self.tracked.lock().unwrap().clear();

        self.inflight.abort_all();
        while self.inflight.join_next().await.is_some() {}

        for session in &self.all_sessions {
            if let Err(e) = session.close().await {
                tracing::warn!("Failed to close worker session: {}", e);
            }
        }
        tracing::info!("Worker pool shut down ({} sessions)", self.all_sessions.len());
    }
}
