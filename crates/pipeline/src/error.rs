use std::time::Duration;

use fluxgen_comfyui::messages::QueuePosition;
use fluxgen_comfyui::JobHandle;

/// Why a generation request produced no image.
///
/// Every variant carries the wall-clock time spent on the request, and all
/// variants after submission carry the engine's job handle so the failure
/// can be traced on the engine side.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The engine never accepted the job (unreachable, rejected graph, ...).
    #[error("Submission failed after {elapsed:.1?}: {reason}")]
    SubmitFailed { reason: String, elapsed: Duration },

    /// The job was still queued or running when the wait budget ran out.
    ///
    /// The job is not cancelled on the engine and may still finish later.
    #[error(
        "Job {job} did not finish within {budget:?} \
         (waited {elapsed:.1?}, {polls} polls, last seen {last_seen:?})"
    )]
    TimedOut {
        job: JobHandle,
        elapsed: Duration,
        budget: Duration,
        polls: u32,
        last_seen: Option<QueuePosition>,
    },

    /// The job left the queue but the engine recorded no artifact for it.
    #[error("Job {job} produced no artifact after {elapsed:.1?}: {reason}")]
    NotFound {
        job: JobHandle,
        elapsed: Duration,
        reason: String,
    },

    /// The artifact exists but could not be downloaded or stored.
    #[error("Retrieving the artifact of job {job} failed after {elapsed:.1?}: {reason}")]
    RetrievalFailed {
        job: JobHandle,
        elapsed: Duration,
        reason: String,
    },

    /// The caller stopped waiting before the job finished.
    #[error("Waiting for job {job} was cancelled after {elapsed:.1?}")]
    Cancelled { job: JobHandle, elapsed: Duration },
}

impl GenerationError {
    /// Engine handle of the job, if it got as far as being submitted.
    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            Self::SubmitFailed { .. } => None,
            Self::TimedOut { job, .. }
            | Self::NotFound { job, .. }
            | Self::RetrievalFailed { job, .. }
            | Self::Cancelled { job, .. } => Some(job),
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::SubmitFailed { elapsed, .. }
            | Self::TimedOut { elapsed, .. }
            | Self::NotFound { elapsed, .. }
            | Self::RetrievalFailed { elapsed, .. }
            | Self::Cancelled { elapsed, .. } => *elapsed,
        }
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubmitFailed { .. } => "submit_failed",
            Self::TimedOut { .. } => "timed_out",
            Self::NotFound { .. } => "not_found",
            Self::RetrievalFailed { .. } => "retrieval_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_failure_has_no_job() {
        let err = GenerationError::SubmitFailed {
            reason: "connection refused".into(),
            elapsed: Duration::from_millis(40),
        };
        assert!(err.job().is_none());
        assert_eq!(err.kind(), "submit_failed");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn timeout_message_names_job_and_budget() {
        let err = GenerationError::TimedOut {
            job: JobHandle::new("p-7"),
            elapsed: Duration::from_secs(300),
            budget: Duration::from_secs(300),
            polls: 150,
            last_seen: Some(QueuePosition::Running),
        };
        let message = err.to_string();
        assert!(message.contains("p-7"));
        assert!(message.contains("300s"));
        assert!(message.contains("Running"));
        assert_eq!(err.job(), Some(&JobHandle::new("p-7")));
        assert_eq!(err.elapsed(), Duration::from_secs(300));
    }
}
