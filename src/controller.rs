//! In-memory owner of a quiz being authored.
//!
//! All edits go through [`QuizDraftController`]; the remote quiz service is only
//! touched by [`QuizDraftController::save_draft`] and
//! [`QuizDraftController::publish`]. Remote failures are reported to the
//! configured [`FailureSink`] and leave local state as it was.

use crate::error::{ControllerError, RemoteCause, RemoteError, RemoteOperation};
use crate::flight::{FlightGuard, InFlight};
use crate::models::{
    DraftField, PublishReceipt, Question, QuizDraft, QuizId, Readiness, SettingField, StudentRef,
};
use crate::service::QuizService;
use crate::telemetry::{FailureEvent, FailureSink, TracingSink};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Insert,
    Replace(usize),
}

/// The question currently open in the editor, and where it goes on commit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub question: Question,
    pub target: EditTarget,
}

impl EditSession {
    pub fn editing_index(&self) -> Option<usize> {
        match self.target {
            EditTarget::Replace(index) => Some(index),
            EditTarget::Insert => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub draft: QuizDraft,
    pub edit: Option<EditSession>,
    pub audience: BTreeSet<StudentRef>,
    pub saving: bool,
    pub publishing: bool,
    pub publish_dialog_open: bool,
}

struct Inner {
    state: ControllerState,
    // bumped on every author edit to the draft
    revision: u64,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
enum Busy {
    Saving,
    Publishing,
}

impl Busy {
    fn action(self) -> &'static str {
        match self {
            Busy::Saving => "save",
            Busy::Publishing => "publish",
        }
    }
}

/// Raises `saving`/`publishing` for its lifetime and holds the single-flight claim.
struct BusyFlag<'a> {
    inner: &'a Mutex<Inner>,
    which: Busy,
    _flight: FlightGuard,
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        match self.which {
            Busy::Saving => inner.state.saving = false,
            Busy::Publishing => inner.state.publishing = false,
        }
    }
}

struct Started {
    draft: QuizDraft,
    revision: u64,
    audience: Vec<StudentRef>,
}

pub struct QuizDraftController {
    service: Arc<dyn QuizService>,
    sink: Arc<dyn FailureSink>,
    flights: InFlight,
    session_key: String,
    inner: Mutex<Inner>,
}

impl QuizDraftController {
    pub fn new(service: Arc<dyn QuizService>) -> Self {
        Self::with_parts(service, Arc::new(TracingSink), InFlight::new())
    }

    pub fn with_parts(service: Arc<dyn QuizService>, sink: Arc<dyn FailureSink>, flights: InFlight) -> Self {
        Self {
            service,
            sink,
            flights,
            session_key: format!("session:{}", uuid::Uuid::new_v4()),
            inner: Mutex::new(Inner {
                state: ControllerState::default(),
                revision: 0,
            }),
        }
    }

    /// Starts from an existing draft, e.g. one loaded from the service for editing.
    pub fn with_draft(self, draft: QuizDraft) -> Self {
        lock(&self.inner).state.draft = draft;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    pub fn snapshot(&self) -> ControllerState {
        self.lock().state.clone()
    }

    pub fn draft(&self) -> QuizDraft {
        self.lock().state.draft.clone()
    }

    pub fn edit_session(&self) -> Option<EditSession> {
        self.lock().state.edit.clone()
    }

    pub fn audience(&self) -> BTreeSet<StudentRef> {
        self.lock().state.audience.clone()
    }

    pub fn is_saving(&self) -> bool {
        self.lock().state.saving
    }

    pub fn is_publishing(&self) -> bool {
        self.lock().state.publishing
    }

    pub fn is_publish_dialog_open(&self) -> bool {
        self.lock().state.publish_dialog_open
    }

    pub fn readiness(&self) -> Readiness {
        self.lock().state.draft.readiness()
    }

    fn replace_draft(&self, edit: impl FnOnce(QuizDraft) -> QuizDraft) {
        let mut inner = self.lock();
        let next = edit(inner.state.draft.clone());
        inner.state.draft = next;
        inner.revision += 1;
    }

    pub fn set_field(&self, field: DraftField) {
        debug!(?field, "draft field set");
        self.replace_draft(|draft| draft.with_field(field));
    }

    pub fn set_setting_field(&self, field: SettingField) {
        debug!(?field, "draft setting set");
        self.replace_draft(|draft| draft.with_setting(field));
    }

    pub fn begin_add_question(&self) {
        self.lock().state.edit = Some(EditSession {
            question: Question::blank(),
            target: EditTarget::Insert,
        });
    }

    pub fn begin_edit_question(&self, index: usize) -> Result<(), ControllerError> {
        let mut inner = self.lock();
        let len = inner.state.draft.questions.len();
        let question = inner
            .state
            .draft
            .questions
            .get(index)
            .cloned()
            .ok_or(ControllerError::IndexOutOfRange { index, len })?;
        inner.state.edit = Some(EditSession {
            question,
            target: EditTarget::Replace(index),
        });
        Ok(())
    }

    /// Stores the editor's result and ends the edit session. Returns the
    /// position the question now occupies. A rejected commit leaves the
    /// session open so the editor's work can be retried or cancelled.
    pub fn commit_question(&self, question: Question) -> Result<usize, ControllerError> {
        let mut inner = self.lock();
        let target = inner
            .state
            .edit
            .as_ref()
            .map(|session| session.target)
            .unwrap_or(EditTarget::Insert);
        let draft = inner.state.draft.clone();
        let (next, index) = match target {
            EditTarget::Insert => {
                let index = draft.questions.len();
                (draft.with_question_appended(question), index)
            }
            EditTarget::Replace(index) => (draft.with_question_replaced(index, question)?, index),
        };
        inner.state.edit = None;
        inner.state.draft = next;
        inner.revision += 1;
        Ok(index)
    }

    pub fn cancel_question_edit(&self) {
        self.lock().state.edit = None;
    }

    pub fn delete_question(&self, index: usize) -> Result<Question, ControllerError> {
        let mut inner = self.lock();
        let len = inner.state.draft.questions.len();
        let removed = inner
            .state
            .draft
            .questions
            .get(index)
            .cloned()
            .ok_or(ControllerError::IndexOutOfRange { index, len })?;
        let next = inner.state.draft.clone().with_question_removed(index)?;
        inner.state.draft = next;
        inner.revision += 1;

        // An open editor keeps pointing at the same question.
        let stale = match inner.state.edit.as_mut() {
            Some(EditSession {
                target: EditTarget::Replace(open),
                ..
            }) if *open == index => true,
            Some(EditSession {
                target: EditTarget::Replace(open),
                ..
            }) if *open > index => {
                *open -= 1;
                false
            }
            _ => false,
        };
        if stale {
            warn!(index, "question under edit was deleted, closing the editor");
            inner.state.edit = None;
        }
        Ok(removed)
    }

    pub fn open_publish_dialog(&self) {
        self.lock().state.publish_dialog_open = true;
    }

    pub fn close_publish_dialog(&self) {
        let mut inner = self.lock();
        inner.state.publish_dialog_open = false;
        inner.state.audience.clear();
    }

    pub fn set_audience(&self, students: impl IntoIterator<Item = StudentRef>) {
        self.lock().state.audience = students.into_iter().collect();
    }

    fn start(&self, which: Busy) -> Result<(BusyFlag<'_>, Started), ControllerError> {
        let mut inner = self.lock();
        let gate = match which {
            Busy::Saving => inner.state.draft.check_saveable(),
            Busy::Publishing => inner.state.draft.check_publishable(),
        };
        if let Err(issues) = gate {
            return Err(ControllerError::NotReady {
                action: which.action(),
                issues,
            });
        }

        let mut keys = vec![self.session_key.clone()];
        if let Some(id) = &inner.state.draft.identifier {
            keys.push(format!("quiz:{id}"));
        }
        let operation = match (which, &inner.state.draft.identifier) {
            (Busy::Saving, None) => RemoteOperation::Create,
            (Busy::Saving, Some(_)) => RemoteOperation::Update,
            (Busy::Publishing, _) => RemoteOperation::Publish,
        };
        let flight = self
            .flights
            .try_acquire(&keys, operation)
            .map_err(|key| ControllerError::Busy { key })?;

        match which {
            Busy::Saving => inner.state.saving = true,
            Busy::Publishing => inner.state.publishing = true,
        }
        let started = Started {
            draft: inner.state.draft.clone(),
            revision: inner.revision,
            audience: inner.state.audience.iter().cloned().collect(),
        };
        drop(inner);

        let flag = BusyFlag {
            inner: &self.inner,
            which,
            _flight: flight,
        };
        Ok((flag, started))
    }

    fn report(&self, err: &RemoteError, quiz_id: Option<&QuizId>) {
        self.sink.report(&FailureEvent::from_error(err, quiz_id));
    }

    /// Creates the quiz remotely when it has no identifier yet, updates it
    /// otherwise, and adopts the server's copy.
    pub async fn save_draft(&self) -> Result<QuizId, ControllerError> {
        let (_busy, started) = self.start(Busy::Saving)?;
        let known = started.draft.identifier.clone();

        let result = match known.clone() {
            None => self
                .service
                .create_quiz(started.draft)
                .await
                .and_then(|saved| confirm_identity(RemoteOperation::Create, None, saved)),
            Some(id) => self
                .service
                .update_quiz(id.clone(), started.draft)
                .await
                .and_then(|saved| confirm_identity(RemoteOperation::Update, Some(&id), saved)),
        };
        let (id, saved) = match result {
            Ok(saved) => saved,
            Err(err) => {
                self.report(&err, known.as_ref());
                return Err(err.into());
            }
        };

        {
            let mut inner = self.lock();
            if inner.revision == started.revision {
                let mut saved = saved;
                saved.is_published |= inner.state.draft.is_published;
                inner.state.draft = saved;
            } else {
                warn!(quiz_id = %id, "draft changed while saving, keeping local edits");
                inner.state.draft.identifier = Some(id.clone());
            }
        }
        info!(quiz_id = %id, created = known.is_none(), "quiz draft saved");
        Ok(id)
    }

    /// Publishes to the selected audience, creating the quiz first if it has
    /// never been saved. The publish call only ever sees a confirmed identifier.
    pub async fn publish(&self) -> Result<PublishReceipt, ControllerError> {
        let (_busy, started) = self.start(Busy::Publishing)?;

        let quiz_id = match started.draft.identifier.clone() {
            Some(id) => id,
            None => self.create_for_publish(started.draft).await?,
        };

        let receipt = self
            .service
            .publish_quiz(quiz_id.clone(), started.audience)
            .await
            .and_then(|receipt| {
                if receipt.published {
                    Ok(receipt)
                } else {
                    Err(RemoteError::new(
                        RemoteOperation::Publish,
                        anyhow::anyhow!("service did not confirm publication of {quiz_id}"),
                    ))
                }
            });
        let receipt = match receipt {
            Ok(receipt) => receipt,
            Err(err) => {
                self.report(&err, Some(&quiz_id));
                return Err(err.into());
            }
        };

        {
            let mut inner = self.lock();
            inner.state.draft.is_published = true;
            inner.state.publish_dialog_open = false;
            inner.state.audience.clear();
        }
        info!(quiz_id = %quiz_id, audience = receipt.audience_size, "quiz published");
        Ok(receipt)
    }

    async fn create_for_publish(&self, draft: QuizDraft) -> Result<QuizId, ControllerError> {
        let created = self
            .service
            .create_quiz(draft)
            .await
            .and_then(|saved| confirm_identity(RemoteOperation::Create, None, saved));
        match created {
            Ok((id, _)) => {
                self.lock().state.draft.identifier = Some(id.clone());
                debug!(quiz_id = %id, "created quiz ahead of publishing");
                Ok(id)
            }
            Err(err) => {
                self.report(&err, None);
                Err(err.into())
            }
        }
    }
}

fn confirm_identity(
    operation: RemoteOperation,
    expected: Option<&QuizId>,
    mut saved: QuizDraft,
) -> Result<(QuizId, QuizDraft), RemoteError> {
    let id = match (expected, saved.identifier.take()) {
        (None, None) => return Err(RemoteError::new(operation, RemoteCause::MissingIdentifier)),
        (Some(expected), None) => expected.clone(),
        (Some(expected), Some(returned)) if *expected != returned => {
            return Err(RemoteError::new(
                operation,
                RemoteCause::IdentityMismatch {
                    expected: expected.clone(),
                    returned,
                },
            ))
        }
        (_, Some(returned)) => returned,
    };
    saved.identifier = Some(id.clone());
    Ok((id, saved))
}
