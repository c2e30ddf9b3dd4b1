use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::color::{Color, CHROMA_KEY};
use crate::config::ProcessingConfig;
use crate::effects::{EditSettings, LocalFrameProcessor};
use crate::error::{ConfigError, EditorError, PipelineError, RemoteError, Result};
use crate::frames::{AnimationEncoder, EncodedAnimation, Frame};
use crate::pipeline::cancel::CancellationFlag;
use crate::remote::RemoteEditClient;

/// Observable milestones of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunEvent {
    /// Emitted after every finished frame job
    Progress { completed: usize, total: usize, percent: f32 },
    /// All frames are done and the encoder is running
    Encoding,
}

pub type ProgressSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub animation: EncodedAnimation,
    pub remote_frames: usize,
    pub local_frames: usize,
    pub quota_exhausted: bool,
}

/// How a run ended, when it did not fail
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    Cancelled { completed: usize },
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled { .. })
    }
}

struct FrameJob {
    index: usize,
    frame: Frame,
}

enum RemoteAttempt {
    Edited(Frame),
    Fallback,
    Cancelled,
}

/// State shared by the workers of one run and dropped with it
#[derive(Default)]
struct RunContext {
    quota_exhausted: AtomicBool,
    completed: AtomicUsize,
    remote_frames: AtomicUsize,
    failed: AtomicBool,
    cancel: CancellationFlag,
}

impl RunContext {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.failed.load(Ordering::SeqCst)
    }
}

struct RunShared {
    ctx: RunContext,
    total: usize,
    queue: Mutex<VecDeque<FrameJob>>,
    slots: Mutex<Vec<Option<Frame>>>,
    failure: Mutex<Option<(usize, EditorError)>>,
    settings: Arc<EditSettings>,
    instruction: String,
    local: Arc<LocalFrameProcessor>,
    remote: Option<Arc<RemoteEditClient>>,
    stagger: Duration,
    progress: Option<ProgressSink>,
}

impl RunShared {
    async fn worker_loop(self: Arc<Self>, worker: usize) {
        loop {
            if self.ctx.should_stop() {
                break;
            }

            let Some(job) = self.queue.lock().pop_front() else {
                break;
            };

            if self.ctx.should_stop() {
                debug!("Worker {} stopping before frame {}", worker, job.index);
                break;
            }

            let index = job.index;
            match self.process_job(job).await {
                Ok(Some(frame)) => {
                    self.slots.lock()[index] = Some(frame);
                }
                Ok(None) => {
                    debug!("Worker {} dropped frame {} after cancellation", worker, index);
                    break;
                }
                Err(err) => {
                    error!("Frame {} failed on worker {}: {}", index, worker, err);
                    self.ctx.failed.store(true, Ordering::SeqCst);
                    self.failure.lock().get_or_insert((index, err));
                    break;
                }
            }

            let completed = self.ctx.completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(sink) = &self.progress {
                sink(RunEvent::Progress {
                    completed,
                    total: self.total,
                    percent: completed as f32 * 100.0 / self.total as f32,
                });
            }
        }
    }

    /// `None` when the run was cancelled before the frame was worked on
    async fn process_job(&self, job: FrameJob) -> Result<Option<Frame>> {
        match self.try_remote(&job).await {
            RemoteAttempt::Edited(frame) => {
                self.ctx.remote_frames.fetch_add(1, Ordering::SeqCst);
                return Ok(Some(frame));
            }
            RemoteAttempt::Cancelled => return Ok(None),
            RemoteAttempt::Fallback => {}
        }

        let local = self.local.clone();
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || local.process(&job.frame, &settings))
            .await
            .map_err(|e| EditorError::generic(format!("local processing task failed: {}", e)))?
            .map(Some)
    }

    async fn try_remote(&self, job: &FrameJob) -> RemoteAttempt {
        let Some(remote) = self.remote.as_ref() else {
            return RemoteAttempt::Fallback;
        };
        if self.ctx.quota_exhausted.load(Ordering::SeqCst) {
            return RemoteAttempt::Fallback;
        }

        let stagger = self.stagger.saturating_mul(job.index as u32);
        if !self.ctx.cancel.sleep(stagger).await {
            debug!("Frame {} cancelled during stagger", job.index);
            return RemoteAttempt::Cancelled;
        }
        if self.ctx.quota_exhausted.load(Ordering::SeqCst) {
            debug!("Frame {} skips remote: quota exhausted during stagger", job.index);
            return RemoteAttempt::Fallback;
        }

        let edited = remote
            .edit_until_cancelled(&job.frame, &self.instruction, &self.settings.modes, &self.ctx.cancel)
            .await;
        match edited {
            Ok(image) => match self.finish_remote(&job.frame, image).await {
                Ok(frame) => RemoteAttempt::Edited(frame),
                Err(err) => {
                    warn!("Frame {}: remote image unusable, processing locally: {}", job.index, err);
                    RemoteAttempt::Fallback
                }
            },
            Err(RemoteError::Cancelled) => {
                debug!("Frame {} cancelled during remote backoff", job.index);
                RemoteAttempt::Cancelled
            }
            Err(err) if err.is_quota() => {
                if !self.ctx.quota_exhausted.swap(true, Ordering::SeqCst) {
                    warn!(
                        "Remote quota exhausted at frame {}; remaining frames use local processing",
                        job.index
                    );
                }
                RemoteAttempt::Fallback
            }
            Err(err) => {
                warn!("Frame {}: remote edit failed, processing locally: {}", job.index, err);
                RemoteAttempt::Fallback
            }
        }
    }

    /// Fit a remote image to the frame and apply a requested solid background
    async fn finish_remote(&self, original: &Frame, image: image::RgbaImage) -> Result<Frame> {
        let local = self.local.clone();
        let settings = self.settings.clone();
        let original = original.clone();

        tokio::task::spawn_blocking(move || {
            let conformed = local.conform(image, original.width(), original.height())?;
            let edited = original.with_buffer(conformed);

            if !settings.wants_solid_background() {
                return Ok(edited);
            }

            // The service paints backgrounds with the chroma key, not the caller's fill
            let mut keyed = settings.as_ref().clone();
            keyed.removal.key_color = CHROMA_KEY;
            local.remove_background(&edited, &keyed)
        })
        .await
        .map_err(|e| EditorError::generic(format!("remote post-processing task failed: {}", e)))?
    }
}

/// Runs one project's frames through a bounded pool of workers
///
/// Each frame tries the remote service first (when enabled and the quota
/// breaker has not tripped) and falls back to local processing. Results are
/// reassembled in frame order and handed to the encoder.
pub struct FrameJobScheduler {
    config: ProcessingConfig,
    local: Arc<LocalFrameProcessor>,
    remote: Option<Arc<RemoteEditClient>>,
    encoder: Arc<dyn AnimationEncoder>,
}

impl FrameJobScheduler {
    pub fn new(
        config: ProcessingConfig,
        local: Arc<LocalFrameProcessor>,
        encoder: Arc<dyn AnimationEncoder>,
    ) -> Self {
        Self {
            config,
            local,
            remote: None,
            encoder,
        }
    }

    pub fn with_remote(mut self, client: Arc<RemoteEditClient>) -> Self {
        self.remote = Some(client);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count.max(1)
    }

    /// Process and encode one frame sequence
    ///
    /// Returns `RunOutcome::Cancelled` when `cancel` is raised before the
    /// pool drains. Jobs already running are allowed to finish.
    pub async fn run_project(
        &self,
        frames: &[Frame],
        settings: &EditSettings,
        use_remote: bool,
        cancel: &CancellationFlag,
        progress: Option<ProgressSink>,
    ) -> Result<RunOutcome> {
        if frames.is_empty() {
            return Err(ConfigError::NoFrames.into());
        }
        settings.validate()?;

        let remote = match (use_remote, &self.remote) {
            (true, Some(client)) => Some(client.clone()),
            (true, None) => {
                warn!("Remote editing requested but no remote client is configured; using local processing");
                None
            }
            (false, _) => None,
        };
        let remote_used = remote.is_some();

        let total = frames.len();
        let queue: VecDeque<FrameJob> = frames
            .iter()
            .enumerate()
            .map(|(index, frame)| FrameJob {
                index,
                frame: frame.clone(),
            })
            .collect();

        let shared = Arc::new(RunShared {
            ctx: RunContext {
                cancel: cancel.clone(),
                ..RunContext::default()
            },
            total,
            queue: Mutex::new(queue),
            slots: Mutex::new(vec![None; total]),
            failure: Mutex::new(None),
            settings: Arc::new(settings.clone()),
            instruction: settings.instruction(),
            local: self.local.clone(),
            remote,
            stagger: Duration::from_millis(self.config.stagger_ms),
            progress,
        });

        let worker_count = self.worker_count().min(total);
        info!(
            "Processing {} frames with {} workers (remote: {})",
            total, worker_count, remote_used
        );

        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            workers.spawn(shared.clone().worker_loop(worker));
        }

        let mut panicked = false;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Frame worker crashed: {}", e);
                panicked = true;
            }
        }

        let failure = shared.failure.lock().take();
        if let Some((index, err)) = failure {
            return Err(PipelineError::FrameFailed {
                index,
                source: Box::new(err),
            }
            .into());
        }
        if panicked {
            return Err(EditorError::generic("a frame worker crashed"));
        }

        let completed = shared.ctx.completed.load(Ordering::SeqCst);
        if cancel.is_cancelled() {
            info!("Run cancelled after {}/{} frames", completed, total);
            return Ok(RunOutcome::Cancelled { completed });
        }

        let edited: Vec<Frame> = std::mem::take(&mut *shared.slots.lock())
            .into_iter()
            .flatten()
            .collect();
        if edited.len() < total {
            warn!("Dropping {} frames that produced no result", total - edited.len());
        }

        let quota_exhausted = shared.ctx.quota_exhausted.load(Ordering::SeqCst);
        let transparent_key = Self::transparent_key(settings, remote_used, quota_exhausted);

        if let Some(sink) = &shared.progress {
            sink(RunEvent::Encoding);
        }

        let encoder = self.encoder.clone();
        let frame_count = edited.len();
        let animation = tokio::task::spawn_blocking(move || encoder.encode(&edited, transparent_key))
            .await
            .map_err(|e| EditorError::generic(format!("encoder task failed: {}", e)))??;

        let remote_frames = shared.ctx.remote_frames.load(Ordering::SeqCst);
        info!(
            "Run complete: {} frames ({} remote, {} local)",
            frame_count,
            remote_frames,
            frame_count.saturating_sub(remote_frames)
        );

        Ok(RunOutcome::Completed(RunReport {
            animation,
            remote_frames,
            local_frames: frame_count.saturating_sub(remote_frames),
            quota_exhausted,
        }))
    }

    /// The chroma key is only trusted when every frame could have come from the service
    ///
    /// Local transparency is already baked into pixel alpha.
    fn transparent_key(settings: &EditSettings, remote_used: bool, quota_exhausted: bool) -> Option<Color> {
        if settings.wants_transparency() && remote_used && !quota_exhausted {
            Some(CHROMA_KEY)
        } else {
            None
        }
    }
}
