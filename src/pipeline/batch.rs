use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::pipeline::cancel::CancellationFlag;
use crate::pipeline::project::{ProjectState, ProjectStatus};
use crate::pipeline::scheduler::{FrameJobScheduler, ProgressSink, RunEvent, RunOutcome};

/// Projects shared between the batch scheduler and whoever observes it
pub type ProjectStore = Arc<RwLock<Vec<ProjectState>>>;

pub fn new_store(projects: Vec<ProjectState>) -> ProjectStore {
    Arc::new(RwLock::new(projects))
}

/// Tally of one `run_all` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    /// The batch ended because of `stop()`
    pub stopped: bool,
}

/// A project picked for the next run, copied out of the store
struct PickedProject {
    id: Uuid,
    name: String,
    run: ProjectState,
}

/// Clears the in-flight state when a `run_all` call ends, however it ends
struct InFlight<'a> {
    batch: &'a ProjectBatchScheduler,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.batch.current.lock() = None;
        self.batch.running.store(false, Ordering::SeqCst);
    }
}

/// Runs the Idle projects of a store one after another
///
/// Only one `run_all` is in flight at a time, including one still winding
/// down its cancelled project after `stop()`.
pub struct ProjectBatchScheduler {
    scheduler: Arc<FrameJobScheduler>,
    running: AtomicBool,
    /// Bumped by every `stop()`; a batch is stopped once it differs from the value it started with
    generation: AtomicU64,
    current: Mutex<Option<CancellationFlag>>,
}

impl ProjectBatchScheduler {
    pub fn new(scheduler: Arc<FrameJobScheduler>) -> Self {
        Self {
            scheduler,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// True while a `run_all` call has not returned yet
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Process every Idle project in list order until none remain or `stop()` is called
    pub async fn run_all(&self, store: &ProjectStore) -> Result<BatchSummary> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::BatchAlreadyRunning.into());
        }
        let _in_flight = InFlight { batch: self };
        let generation = self.generation.load(Ordering::SeqCst);

        let summary = self.drain(store, generation).await;

        info!(
            "Batch finished: {} completed, {} failed{}",
            summary.completed,
            summary.failed,
            if summary.stopped { " (stopped)" } else { "" }
        );
        Ok(summary)
    }

    /// Stop the batch and cancel the project currently running
    ///
    /// Projects that already completed keep their results. The batch stays
    /// active until its cancelled project has been written back.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = self.current.lock().as_ref() {
            info!("Stopping batch");
            cancel.cancel();
        }
    }

    fn stopped_since(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    async fn drain(&self, store: &ProjectStore, generation: u64) -> BatchSummary {
        let mut summary = BatchSummary::default();

        loop {
            if self.stopped_since(generation) {
                summary.stopped = true;
                break;
            }

            let Some(picked) = Self::pick_next(store) else {
                break;
            };

            let cancel = CancellationFlag::new();
            *self.current.lock() = Some(cancel.clone());
            // stop() may have run between the check above and publishing the flag
            if self.stopped_since(generation) {
                cancel.cancel();
            }

            info!("Starting project '{}' ({} frames)", picked.name, picked.run.frames().len());
            let outcome = self
                .scheduler
                .run_project(
                    picked.run.frames(),
                    &picked.run.settings,
                    picked.run.use_remote,
                    &cancel,
                    Some(Self::progress_sink(store.clone(), picked.id)),
                )
                .await;
            *self.current.lock() = None;

            let mut projects = store.write();
            let Some(project) = projects.iter_mut().find(|p| p.id == picked.id) else {
                warn!("Project '{}' left the store while running", picked.name);
                continue;
            };

            let written = match outcome {
                Ok(RunOutcome::Completed(report)) => {
                    summary.completed += 1;
                    info!(
                        "Project '{}' completed ({} bytes, {} remote frames)",
                        picked.name,
                        report.animation.file_size(),
                        report.remote_frames
                    );
                    project.complete(report.animation)
                }
                Ok(RunOutcome::Cancelled { completed }) => {
                    info!("Project '{}' cancelled after {} frames", picked.name, completed);
                    project.cancel_run()
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!("Project '{}' failed: {}", picked.name, err);
                    project.fail(err.user_message())
                }
            };

            if let Err(err) = written {
                warn!("Could not record outcome of '{}': {}", picked.name, err);
            }
        }

        summary
    }

    /// Move the first Idle project to Processing and copy out what the run needs
    ///
    /// Nothing is picked while any project in the store is mid-run.
    fn pick_next(store: &ProjectStore) -> Option<PickedProject> {
        let mut projects = store.write();
        if let Some(busy) = projects.iter().find(|p| p.status().is_running()) {
            warn!("Project '{}' is still {}; not starting another", busy.name, busy.status());
            return None;
        }

        let project = projects
            .iter_mut()
            .find(|p| p.status() == ProjectStatus::Idle)?;

        if let Err(err) = project.begin_processing() {
            warn!("Could not start project '{}': {}", project.name, err);
            return None;
        }

        Some(PickedProject {
            id: project.id,
            name: project.name.clone(),
            run: project.clone(),
        })
    }

    fn progress_sink(store: ProjectStore, id: Uuid) -> ProgressSink {
        Arc::new(move |event: RunEvent| {
            let mut projects = store.write();
            let Some(project) = projects.iter_mut().find(|p| p.id == id) else {
                return;
            };
            match event {
                RunEvent::Progress { percent, .. } => project.set_progress(percent),
                RunEvent::Encoding => {
                    if let Err(err) = project.begin_encoding() {
                        warn!("Project '{}': {}", project.name, err);
                    }
                }
            }
        })
    }
}
