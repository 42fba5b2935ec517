//! Failure reporting for remote quiz operations.
//!
//! Sinks only observe; nothing they do feeds back into the controller.

use crate::error::{RemoteError, RemoteOperation};
use crate::models::QuizId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    pub operation: RemoteOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<QuizId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FailureEvent {
    pub fn from_error(err: &RemoteError, quiz_id: Option<&QuizId>) -> Self {
        Self {
            operation: err.operation,
            quiz_id: quiz_id.cloned(),
            status: err.status(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

pub trait FailureSink: Send + Sync {
    fn report(&self, event: &FailureEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn report(&self, event: &FailureEvent) {
        error!(
            operation = %event.operation,
            quiz_id = event.quiz_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unsaved"),
            status = event.status,
            "{}",
            event.message
        );
    }
}

/// Keeps every reported event in memory. Useful for tests and for surfacing the
/// last failure in a status line.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<FailureEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<FailureEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<FailureEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl FailureSink for RecordingSink {
    fn report(&self, event: &FailureEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteCause;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::default();
        let first = RemoteError::new(RemoteOperation::Create, anyhow::anyhow!("offline"));
        let second = RemoteError::new(RemoteOperation::Publish, RemoteCause::MissingIdentifier);
        sink.report(&FailureEvent::from_error(&first, None));
        sink.report(&FailureEvent::from_error(&second, Some(&QuizId::from("Q1"))));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, RemoteOperation::Create);
        assert_eq!(events[0].quiz_id, None);
        assert_eq!(events[1].quiz_id, Some(QuizId::from("Q1")));
        assert_eq!(sink.last().unwrap().operation, RemoteOperation::Publish);
    }
}
