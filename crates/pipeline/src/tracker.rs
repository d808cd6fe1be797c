//! Completion tracking by queue polling.
//!
//! A job counts as finished as soon as it is absent from both the running
//! and the pending queue lists. [`CompletionTracker::wait`] polls the
//! engine at a fixed interval until that happens, the wait budget runs
//! out, or the caller's [`CancellationToken`] fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use fluxgen_comfyui::messages::{QueuePosition, QueueSnapshot};
use fluxgen_comfyui::{ExecutionEngine, JobHandle};

use crate::config::TrackerConfig;

/// Emit a progress line every this many polls.
const PROGRESS_LOG_EVERY: u32 = 5;

/// Lifecycle of a submitted job as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Still listed in the queue.
    Pending(QueuePosition),
    /// Gone from the queue.
    Completed,
    /// The wait budget ran out first.
    TimedOut,
    /// The caller stopped waiting.
    Cancelled,
}

impl JobState {
    /// State of `job` according to one queue snapshot.
    pub fn observe(snapshot: &QueueSnapshot, job: &JobHandle) -> Self {
        match snapshot.position(job) {
            Some(position) => Self::Pending(position),
            None => Self::Completed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }
}

/// Final result of one [`CompletionTracker::wait`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitReport {
    /// Terminal state: `Completed`, `TimedOut` or `Cancelled`.
    pub state: JobState,
    /// Queue inspections issued, including failed ones.
    pub polls: u32,
    pub waited: Duration,
    /// Last queue position observed while the job was pending.
    pub last_seen: Option<QueuePosition>,
}

/// Polls the engine queue until a job leaves it.
pub struct CompletionTracker<E> {
    engine: Arc<E>,
    config: TrackerConfig,
}

impl<E: ExecutionEngine> CompletionTracker<E> {
    pub fn new(engine: Arc<E>, config: TrackerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Wait for `job` to leave the queue.
    ///
    /// The first poll happens immediately; later polls follow at
    /// `poll_interval`, with the last sleep shortened so the loop wakes
    /// exactly at the deadline. A failed poll is logged and treated as
    /// inconclusive. A poll still in flight at the deadline is abandoned.
    /// `TimedOut` is only reported once the full budget has elapsed.
    pub async fn wait(&self, job: &JobHandle, cancel: &CancellationToken) -> WaitReport {
        let started = Instant::now();
        let deadline = started + self.config.budget;
        let mut polls = 0u32;
        let mut last_seen = None;

        let finish = |state: JobState, polls: u32, last_seen: Option<QueuePosition>| WaitReport {
            state,
            polls,
            waited: started.elapsed(),
            last_seen,
        };

        loop {
            polls += 1;

            let poll = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job = %job, polls, "Wait cancelled");
                    return finish(JobState::Cancelled, polls, last_seen);
                }
                result = tokio::time::timeout_at(deadline, self.engine.queue()) => result,
            };

            match poll {
                Err(_) => {
                    tracing::warn!(job = %job, polls, "Queue poll still in flight at deadline");
                }
                Ok(Err(e)) => {
                    tracing::warn!(job = %job, polls, error = %e, "Queue poll failed");
                }
                Ok(Ok(snapshot)) => match JobState::observe(&snapshot, job) {
                    JobState::Pending(position) => {
                        last_seen = Some(position);
                        if polls % PROGRESS_LOG_EVERY == 0 {
                            tracing::info!(
                                job = %job,
                                polls,
                                position = ?position,
                                elapsed_secs = started.elapsed().as_secs(),
                                "Still waiting for job",
                            );
                        } else {
                            tracing::debug!(job = %job, polls, position = ?position, "Job queued");
                        }
                    }
                    state => {
                        tracing::info!(
                            job = %job,
                            polls,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Job left the queue",
                        );
                        return finish(state, polls, last_seen);
                    }
                },
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            // Wait before the next poll, respecting cancellation.
            let wake = (now + self.config.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job = %job, polls, "Wait cancelled");
                    return finish(JobState::Cancelled, polls, last_seen);
                }
                _ = tokio::time::sleep_until(wake) => {}
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        tracing::warn!(
            job = %job,
            polls,
            budget_secs = self.config.budget.as_secs(),
            last_seen = ?last_seen,
            "Job did not leave the queue in time",
        );
        finish(JobState::TimedOut, polls, last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use fluxgen_comfyui::messages::{ArtifactDescriptor, HistoryEntry, QueueEntry};
    use fluxgen_comfyui::EngineError;

    const JOB: &str = "job-1";

    /// Keeps `JOB` running for the first `present_for` polls; polls listed
    /// in `failing` return an error instead.
    #[derive(Default)]
    struct ScriptedQueue {
        present_for: u32,
        failing: Vec<u32>,
        hang: bool,
        polls: AtomicU32,
    }

    impl ScriptedQueue {
        fn present_for(n: u32) -> Self {
            Self {
                present_for: n,
                ..Default::default()
            }
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExecutionEngine for ScriptedQueue {
        async fn submit(&self, _: &serde_json::Value) -> Result<JobHandle, EngineError> {
            unreachable!("tracker never submits")
        }

        async fn queue(&self) -> Result<QueueSnapshot, EngineError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(&n) {
                return Err(EngineError::Malformed("connection reset".into()));
            }
            let mut snapshot = QueueSnapshot::default();
            if n <= self.present_for {
                snapshot.queue_running.push(QueueEntry::new(1, JOB));
            }
            Ok(snapshot)
        }

        async fn history(&self, _: &JobHandle) -> Result<Option<HistoryEntry>, EngineError> {
            unreachable!("tracker never reads history")
        }

        async fn view(&self, _: &ArtifactDescriptor) -> Result<Vec<u8>, EngineError> {
            unreachable!("tracker never downloads")
        }
    }

    fn tracker(
        engine: &Arc<ScriptedQueue>,
        interval_secs: u64,
        budget_secs: u64,
    ) -> CompletionTracker<ScriptedQueue> {
        CompletionTracker::new(
            Arc::clone(engine),
            TrackerConfig {
                poll_interval: Duration::from_secs(interval_secs),
                budget: Duration::from_secs(budget_secs),
            },
        )
    }

    // -----------------------------------------------------------------------
    // Test: completion after exactly N polls
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn completes_on_first_poll_when_already_gone() {
        let engine = Arc::new(ScriptedQueue::present_for(0));
        let report = tracker(&engine, 2, 300)
            .wait(&JobHandle::new(JOB), &CancellationToken::new())
            .await;

        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.polls, 1);
        assert_eq!(report.waited, Duration::ZERO);
        assert_eq!(report.last_seen, None);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_exactly_n_polls() {
        let engine = Arc::new(ScriptedQueue::present_for(3));
        let report = tracker(&engine, 2, 300)
            .wait(&JobHandle::new(JOB), &CancellationToken::new())
            .await;

        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.polls, 4);
        assert_eq!(engine.polls(), 4);
        assert_eq!(report.waited, Duration::from_secs(6));
        assert_eq!(report.last_seen, Some(QueuePosition::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_are_inconclusive() {
        let engine = Arc::new(ScriptedQueue {
            present_for: 1,
            failing: vec![2, 3],
            ..Default::default()
        });
        let report = tracker(&engine, 2, 300)
            .wait(&JobHandle::new(JOB), &CancellationToken::new())
            .await;

        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.polls, 4);
    }

    // -----------------------------------------------------------------------
    // Test: timeout
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn times_out_at_budget_and_not_before() {
        let engine = Arc::new(ScriptedQueue::present_for(u32::MAX));
        let report = tracker(&engine, 2, 10)
            .wait(&JobHandle::new(JOB), &CancellationToken::new())
            .await;

        assert_eq!(report.state, JobState::TimedOut);
        assert_eq!(report.waited, Duration::from_secs(10));
        // Polls at t = 0, 2, 4, 6, 8; the wake-up at t = 10 is the deadline.
        assert_eq!(report.polls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn last_sleep_is_clamped_to_deadline() {
        let engine = Arc::new(ScriptedQueue::present_for(u32::MAX));
        let report = tracker(&engine, 4, 10)
            .wait(&JobHandle::new(JOB), &CancellationToken::new())
            .await;

        assert_eq!(report.state, JobState::TimedOut);
        assert_eq!(report.waited, Duration::from_secs(10));
        assert_eq!(report.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_poll_is_abandoned_at_deadline() {
        let engine = Arc::new(ScriptedQueue {
            hang: true,
            ..Default::default()
        });
        let report = tracker(&engine, 2, 30)
            .wait(&JobHandle::new(JOB), &CancellationToken::new())
            .await;

        assert_eq!(report.state, JobState::TimedOut);
        assert_eq!(report.polls, 1);
        assert_eq!(report.waited, Duration::from_secs(30));
    }

    // -----------------------------------------------------------------------
    // Test: cancellation
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_waiting() {
        let engine = Arc::new(ScriptedQueue::present_for(u32::MAX));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = tracker(&engine, 2, 300)
            .wait(&JobHandle::new(JOB), &cancel)
            .await;

        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(report.waited, Duration::from_secs(5));
        assert_eq!(report.polls, 3);
    }

    #[test]
    fn observe_maps_queue_position() {
        let job = JobHandle::new(JOB);
        let mut snapshot = QueueSnapshot::default();
        assert_eq!(JobState::observe(&snapshot, &job), JobState::Completed);

        snapshot.queue_pending.push(QueueEntry::new(2, JOB));
        let state = JobState::observe(&snapshot, &job);
        assert_eq!(state, JobState::Pending(QueuePosition::Pending(0)));
        assert!(!state.is_terminal());
    }
}
