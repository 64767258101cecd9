//! Transition events raised after a commit succeeds.
//!
//! Emission is best-effort: a failing sink is logged and never unwinds the committed state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::domain::{Application, Job, Role};

#[derive(Debug, Clone, PartialEq)]
pub enum MarketplaceEvent {
    JobPosted {
        job: Job,
    },
    ApplicationSubmitted {
        job: Job,
        application: Application,
    },
    ApplicantSelected {
        job: Job,
        application: Application,
        rejected: Vec<Application>,
    },
    JobCompleted {
        job: Job,
        application: Application,
        completed_by: Role,
    },
}

impl MarketplaceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MarketplaceEvent::JobPosted { .. } => "job_posted",
            MarketplaceEvent::ApplicationSubmitted { .. } => "application_submitted",
            MarketplaceEvent::ApplicantSelected { .. } => "applicant_selected",
            MarketplaceEvent::JobCompleted { .. } => "job_completed",
        }
    }
}

/// Consumer of transition events (notification emitter, queue, test recorder).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MarketplaceEvent) -> Result<(), EmitError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("event dispatcher has shut down")]
    Closed,
    #[error("failed to record {failed} notification(s): {reason}")]
    Delivery { failed: usize, reason: String },
}

pub(crate) fn emit_best_effort<E>(sink: &E, event: MarketplaceEvent)
where
    E: EventSink + ?Sized,
{
    let name = event.name();
    if let Err(error) = sink.emit(event) {
        warn!(event = name, %error, "notification side effect dropped");
    }
}

/// Sink that queues events for a background dispatcher task.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<MarketplaceEvent>,
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: MarketplaceEvent) -> Result<(), EmitError> {
        self.sender.send(event).map_err(|_| EmitError::Closed)
    }
}

/// Spawns a task draining queued events into `downstream`.
///
/// Must be called from within a tokio runtime. The task ends once every
/// [`ChannelEventSink`] clone has been dropped.
pub fn spawn_dispatcher<D>(downstream: Arc<D>) -> (ChannelEventSink, JoinHandle<()>)
where
    D: EventSink + 'static,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<MarketplaceEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            emit_best_effort(downstream.as_ref(), event);
        }
    });
    (ChannelEventSink { sender }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{JobId, JobStatus, UserId};
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        names: Mutex<Vec<&'static str>>,
    }

    impl EventSink for Recorder {
        fn emit(&self, event: MarketplaceEvent) -> Result<(), EmitError> {
            self.names.lock().expect("recorder lock").push(event.name());
            Ok(())
        }
    }

    struct Failing;

    impl EventSink for Failing {
        fn emit(&self, _event: MarketplaceEvent) -> Result<(), EmitError> {
            Err(EmitError::Delivery {
                failed: 1,
                reason: "offline".to_string(),
            })
        }
    }

    fn posted() -> MarketplaceEvent {
        MarketplaceEvent::JobPosted {
            job: Job {
                id: JobId::new("job-1"),
                provider_id: UserId::new("p-1"),
                provider_name: "Farmer John".to_string(),
                title: "Harvest Help Needed".to_string(),
                description: String::new(),
                location: "North Village".to_string(),
                category: "Farming".to_string(),
                required_skills: BTreeSet::new(),
                payment: String::new(),
                duration: String::new(),
                status: JobStatus::Open,
                applicant_count: 0,
                assigned_seeker_id: None,
                created_at: Utc::now(),
                completed_at: None,
                version: 1,
            },
        }
    }

    #[test]
    fn best_effort_swallows_sink_failures() {
        emit_best_effort(&Failing, posted());
    }

    #[tokio::test]
    async fn dispatcher_forwards_events_until_senders_drop() {
        let recorder = Arc::new(Recorder::default());
        let (sink, handle) = spawn_dispatcher(recorder.clone());

        sink.emit(posted()).expect("queued");
        sink.emit(posted()).expect("queued");
        drop(sink);

        handle.await.expect("dispatcher exits cleanly");
        assert_eq!(
            *recorder.names.lock().expect("recorder lock"),
            vec!["job_posted", "job_posted"]
        );
    }

    #[tokio::test]
    async fn closed_dispatcher_reports_closed() {
        let recorder = Arc::new(Recorder::default());
        let (sink, handle) = spawn_dispatcher(recorder);
        handle.abort();
        let _ = handle.await;

        assert!(matches!(sink.emit(posted()), Err(EmitError::Closed)));
    }
}
